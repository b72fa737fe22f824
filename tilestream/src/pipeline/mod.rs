//! Tile resolution pipeline.
//!
//! [`TilePipeline`] wires the cache chain together (memory in front of
//! disk, disk in front of the failure suppressor, the remote HTTP fetcher
//! at the end), validates tile indices at the entry point, and owns the
//! pipeline lifecycle: polling the worker pool, switching tile sources and
//! shutting down.
//!
//! The pipeline is single-owner: construct it, call [`TilePipeline::get_tile`]
//! and drive [`TilePipeline::poll`] on a fixed interval from the same
//! thread (typically the embedding surface's event loop).

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::cache::{
    Chained, DiskTileCache, ErrorCacheLoader, ErrorSet, MemoryTileCache, DEFAULT_MEMORY_TILES,
};
use crate::coord::{TileId, TILE_SIZE};
use crate::executor::{PoolError, WorkerPool};
use crate::provider::{HttpClient, RemoteTileLoader, ReqwestClient, TileUrlTemplate, OSM_TILE_URL};
use crate::tile::{FetchOutcome, TileError, TileFetch};

/// Default number of fetch worker threads.
pub const DEFAULT_WORKERS: usize = 4;

/// Default result-polling interval for the embedding event loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors from pipeline construction.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The HTTP client could not be created.
    #[error("failed to create HTTP client: {0}")]
    HttpClient(TileError),

    /// The worker pool could not be started.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Configuration surface of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Tile source URL template with `{z}`, `{x}`, `{y}` placeholders.
    pub url_template: String,

    /// Root directory for the disk cache; each source gets its own
    /// subdirectory underneath.
    pub cache_root: PathBuf,

    /// Fetch worker thread count.
    pub workers: usize,

    /// Memory cache capacity in tiles.
    pub memory_tiles: usize,

    /// Tile edge length in pixels.
    pub tile_size: u32,

    /// Interval at which the owner should call [`TilePipeline::poll`].
    pub poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            url_template: OSM_TILE_URL.to_string(),
            cache_root: PathBuf::from(".tile_cache"),
            workers: DEFAULT_WORKERS,
            memory_tiles: DEFAULT_MEMORY_TILES,
            tile_size: TILE_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PipelineConfig {
    /// Set the tile source URL template.
    pub fn with_url_template(mut self, url: impl Into<String>) -> Self {
        self.url_template = url.into();
        self
    }

    /// Set the disk cache root directory.
    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = root.into();
        self
    }

    /// Set the fetch worker thread count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the memory cache capacity in tiles.
    pub fn with_memory_tiles(mut self, tiles: usize) -> Self {
        self.memory_tiles = tiles;
        self
    }

    /// Set the polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// The composed tile loader: Memory → Disk → ErrorCache → Remote.
pub struct TilePipeline {
    chain: Box<dyn TileFetch>,
    memory: MemoryTileCache,
    disk: DiskTileCache,
    errors: ErrorSet,
    remote: RemoteTileLoader,
    template: Rc<RefCell<TileUrlTemplate>>,
    pool: WorkerPool<FetchOutcome>,
    cache_root: PathBuf,
    tile_size: u32,
    poll_interval: Duration,
}

impl TilePipeline {
    /// Builds the pipeline with a real HTTP client.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let http = ReqwestClient::new().map_err(PipelineError::HttpClient)?;
        Self::with_http_client(config, Arc::new(http))
    }

    /// Builds the pipeline around a caller-supplied HTTP client. Used for
    /// dependency injection in tests and by embedders with their own
    /// transport needs.
    pub fn with_http_client(
        config: PipelineConfig,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, PipelineError> {
        let template = Rc::new(RefCell::new(TileUrlTemplate::new(&config.url_template)));
        let pool = WorkerPool::new(config.workers)?;

        let remote = RemoteTileLoader::new(http, Rc::clone(&template), pool.clone());
        let errors = ErrorSet::default();
        let error_layer = ErrorCacheLoader::new(errors.clone(), Box::new(remote.clone()));

        let source_dir = config.cache_root.join(template.borrow().source_key());
        let disk = DiskTileCache::new(source_dir);
        let disk_layer = Chained::new(disk.clone(), Box::new(error_layer));

        let memory = MemoryTileCache::new(config.memory_tiles);
        let chain = Chained::new(memory.clone(), Box::new(disk_layer));

        info!(
            url = %template.borrow(),
            workers = config.workers,
            memory_tiles = config.memory_tiles,
            "tile pipeline started"
        );

        Ok(Self {
            chain: Box::new(chain),
            memory,
            disk,
            errors,
            remote,
            template,
            pool,
            cache_root: config.cache_root,
            tile_size: config.tile_size,
            poll_interval: config.poll_interval,
        })
    }

    /// Requests a tile. The callback fires on the owner context, either
    /// synchronously (cache hit, bounds violation) or during a later
    /// [`poll`](Self::poll).
    ///
    /// Indices are validated here and nowhere else: an out-of-range
    /// request fails immediately without touching any cache layer. A
    /// request for a tile whose remote fetch is already in flight is
    /// deduplicated and gets no callback of its own.
    pub fn get_tile<F>(&self, z: u8, x: i32, y: i32, callback: F)
    where
        F: FnOnce(FetchOutcome, TileId) + 'static,
    {
        let id = TileId::new(z, x, y);
        if !id.in_bounds() {
            warn!(key = %id, "tile request out of bounds");
            callback(FetchOutcome::Failed(TileError::OutOfBounds { z, x, y }), id);
            return;
        }
        self.chain.get(id, Box::new(callback));
    }

    /// Drains completed fetches and invokes their callbacks. Call this on
    /// a fixed interval (see [`PipelineConfig::poll_interval`]) from the
    /// owner context. Returns the number of callbacks invoked.
    pub fn poll(&self) -> usize {
        self.pool.poll()
    }

    /// Switches the tile source.
    ///
    /// Clears the error set and the memory cache (both are specific to
    /// the old source) and repoints the disk cache at the new source's
    /// directory. Fetches already in flight are not disturbed but their
    /// results land in the caches of the new source's chain.
    pub fn set_url(&self, url: impl Into<String>) {
        let template = TileUrlTemplate::new(url);
        info!(url = %template, "switching tile source");
        let source_dir = self.cache_root.join(template.source_key());
        *self.template.borrow_mut() = template;
        self.errors.clear();
        self.memory.clear();
        self.disk.set_dir(source_dir);
    }

    /// The current URL template.
    pub fn url(&self) -> String {
        self.template.borrow().as_str().to_string()
    }

    /// The directory tiles of the current source are cached under.
    pub fn cache_dir(&self) -> PathBuf {
        self.disk.dir()
    }

    /// Clears the memory cache and the error set. Disk contents are kept.
    pub fn clear_caches(&self) {
        self.memory.clear();
        self.errors.clear();
    }

    /// Number of tiles currently held in memory.
    pub fn cached_in_memory(&self) -> usize {
        self.memory.len()
    }

    /// Number of remote fetches currently in flight.
    pub fn pending_fetches(&self) -> usize {
        self.remote.pending().len()
    }

    /// Tile edge length in pixels.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Interval the owner should drive [`poll`](Self::poll) at.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Tears down the worker pool. New fetches are rejected, queued work
    /// is discarded, and with `wait` the call blocks until the worker
    /// threads have exited.
    pub fn shutdown(&self, wait: bool) {
        info!("shutting down tile pipeline");
        self.pool.shutdown(wait);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockHttpClient;
    use crate::tile::TileImage;
    use image::{Rgba, RgbaImage};
    use std::cell::RefCell;
    use std::time::Instant;

    fn png_bytes() -> Vec<u8> {
        TileImage::from_rgba(RgbaImage::from_pixel(1, 1, Rgba([0, 128, 0, 255])))
            .encode_png()
            .unwrap()
    }

    fn pipeline_with(
        response: Result<Vec<u8>, TileError>,
        cache_root: &std::path::Path,
    ) -> TilePipeline {
        let config = PipelineConfig::default()
            .with_cache_root(cache_root)
            .with_workers(2);
        TilePipeline::with_http_client(config, Arc::new(MockHttpClient { response })).unwrap()
    }

    fn drive(pipeline: &TilePipeline, done: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !done() {
            assert!(Instant::now() < deadline, "pipeline did not complete");
            pipeline.poll();
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_out_of_bounds_fails_synchronously() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(Ok(png_bytes()), tmp.path());

        let got = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&got);
        // 4 >= 2^2, outside the zoom-2 grid.
        pipeline.get_tile(2, 4, 0, move |outcome, _| *sink.borrow_mut() = Some(outcome));

        let outcome = got.borrow_mut().take().expect("bounds failure is immediate");
        assert!(matches!(
            outcome,
            FetchOutcome::Failed(TileError::OutOfBounds { z: 2, x: 4, y: 0 })
        ));
        assert_eq!(pipeline.pending_fetches(), 0);
        assert_eq!(pipeline.cached_in_memory(), 0);
        pipeline.shutdown(true);
    }

    #[test]
    fn test_negative_index_fails_synchronously() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(Ok(png_bytes()), tmp.path());

        let got = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&got);
        pipeline.get_tile(3, -1, 0, move |outcome, _| *sink.borrow_mut() = Some(outcome));

        assert!(got.borrow().as_ref().unwrap().is_failed());
        pipeline.shutdown(true);
    }

    #[test]
    fn test_fetch_populates_memory_and_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(Ok(png_bytes()), tmp.path());

        let got = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&got);
        pipeline.get_tile(5, 9, 11, move |outcome, _| *sink.borrow_mut() = Some(outcome));

        drive(&pipeline, || got.borrow().is_some());
        assert!(got.borrow().as_ref().unwrap().is_image());
        assert_eq!(pipeline.cached_in_memory(), 1);
        assert!(pipeline
            .cache_dir()
            .join("5")
            .join("9")
            .join("11.png")
            .is_file());
        pipeline.shutdown(true);
    }

    #[test]
    fn test_second_request_is_a_synchronous_memory_hit() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(Ok(png_bytes()), tmp.path());

        let got = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&got);
        pipeline.get_tile(1, 0, 0, move |outcome, _| *sink.borrow_mut() = Some(outcome));
        drive(&pipeline, || got.borrow().is_some());

        // No polling needed this time.
        let hit = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&hit);
        pipeline.get_tile(1, 0, 0, move |outcome, _| *sink.borrow_mut() = Some(outcome));
        assert!(hit.borrow().as_ref().unwrap().is_image());
        pipeline.shutdown(true);
    }

    #[test]
    fn test_cache_dir_is_namespaced_by_source() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(Ok(png_bytes()), tmp.path());

        assert_eq!(
            pipeline.cache_dir(),
            tmp.path().join("tile.openstreetmap.org")
        );

        pipeline.set_url("https://maps.example.net/{z}/{x}/{y}.png");
        assert_eq!(pipeline.cache_dir(), tmp.path().join("maps.example.net"));
        assert_eq!(pipeline.url(), "https://maps.example.net/{z}/{x}/{y}.png");
        pipeline.shutdown(true);
    }

    #[test]
    fn test_set_url_clears_memory_and_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(
            Err(TileError::Transport("unreachable".to_string())),
            tmp.path(),
        );

        let got = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&got);
        pipeline.get_tile(1, 0, 0, move |outcome, _| *sink.borrow_mut() = Some(outcome));
        drive(&pipeline, || got.borrow().is_some());

        // The failure is now suppressed...
        let suppressed = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&suppressed);
        pipeline.get_tile(1, 0, 0, move |outcome, _| *sink.borrow_mut() = Some(outcome));
        assert!(matches!(
            suppressed.borrow_mut().take(),
            Some(FetchOutcome::Failed(TileError::PreviouslyFailed))
        ));

        // ...until the source changes, which earns the tile a fresh try.
        pipeline.set_url("https://other.example.org/{z}/{x}/{y}.png");
        let retried = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&retried);
        pipeline.get_tile(1, 0, 0, move |outcome, _| *sink.borrow_mut() = Some(outcome));
        drive(&pipeline, || retried.borrow().is_some());
        assert!(matches!(
            retried.borrow_mut().take(),
            Some(FetchOutcome::Failed(TileError::Transport(_)))
        ));
        pipeline.shutdown(true);
    }

    #[test]
    fn test_clear_caches_forces_refetch() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(Ok(png_bytes()), tmp.path());

        let got = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&got);
        pipeline.get_tile(2, 1, 1, move |outcome, _| *sink.borrow_mut() = Some(outcome));
        drive(&pipeline, || got.borrow().is_some());
        assert_eq!(pipeline.cached_in_memory(), 1);

        pipeline.clear_caches();
        assert_eq!(pipeline.cached_in_memory(), 0);

        // Still on disk, so the next request is a synchronous disk hit.
        let hit = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&hit);
        pipeline.get_tile(2, 1, 1, move |outcome, _| *sink.borrow_mut() = Some(outcome));
        assert!(hit.borrow().as_ref().unwrap().is_image());
        pipeline.shutdown(true);
    }

    #[test]
    fn test_shutdown_rejects_new_fetches() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(Ok(png_bytes()), tmp.path());
        pipeline.shutdown(true);

        let got = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&got);
        pipeline.get_tile(1, 0, 0, move |outcome, _| *sink.borrow_mut() = Some(outcome));

        let outcome = got.borrow_mut().take().expect("rejection is immediate");
        assert!(matches!(outcome, FetchOutcome::Failed(TileError::Task(_))));
    }

    #[test]
    fn test_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.url_template, OSM_TILE_URL);
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.memory_tiles, DEFAULT_MEMORY_TILES);
        assert_eq!(config.tile_size, TILE_SIZE);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
    }
}
