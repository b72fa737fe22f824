//! Tilestream - raster map tiles on demand
//!
//! This library resolves raster map tiles for a rendering surface while
//! hiding network latency behind a layered cache: an in-memory LRU, a
//! path-per-tile disk store and a failed-fetch suppressor sit in front of
//! a concurrent HTTP fetcher. It also provides the Web Mercator math that
//! maps geographic coordinates to tile and pixel space and back.
//!
//! The embedding surface interacts with two small contracts:
//!
//! - [`pipeline::TilePipeline::get_tile`] plus a periodic call to
//!   [`pipeline::TilePipeline::poll`] on the owning thread, and
//! - the conversion functions in [`coord`].
//!
//! ```no_run
//! use tilestream::{PipelineConfig, TilePipeline};
//!
//! let pipeline = TilePipeline::new(PipelineConfig::default())?;
//! pipeline.get_tile(10, 511, 340, |outcome, id| {
//!     println!("{}: {:?}", id, outcome.is_image());
//! });
//! // ...from the event loop, on a fixed interval:
//! pipeline.poll();
//! # Ok::<(), tilestream::pipeline::PipelineError>(())
//! ```

pub mod cache;
pub mod coord;
pub mod executor;
pub mod logging;
pub mod pipeline;
pub mod provider;
pub mod tile;

pub use coord::{LonLat, PixelPoint, Projection, TileCoord, TileId, WebMercator};
pub use pipeline::{PipelineConfig, TilePipeline};
pub use tile::{FetchOutcome, TileCallback, TileError, TileFetch, TileImage};
