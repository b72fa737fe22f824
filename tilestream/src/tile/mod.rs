//! Tile data types and the asynchronous fetch contract.
//!
//! Every layer of the resolution pipeline speaks the same narrow protocol:
//! a [`TileFetch`] takes a [`TileId`] and a [`TileCallback`], and later
//! invokes the callback with a [`FetchOutcome`]. Failures travel through
//! the same channel as successes and never escape as panics.

use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, RgbaImage};
use thiserror::Error;

use crate::coord::TileId;

/// Errors that can surface from a tile request.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Tile index outside the valid range for its zoom level. Fatal to the
    /// single request; never retried.
    #[error("tile index out of bounds for zoom {z}: x={x}, y={y}")]
    OutOfBounds { z: u8, x: i32, y: i32 },

    /// Network or HTTP-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Response or stored bytes could not be decoded into an image.
    #[error("decode error: {0}")]
    Decode(String),

    /// Synthesized for a tile whose most recent remote fetch failed;
    /// short-circuits further retries until the error cache is cleared.
    #[error("tile previously failed to load")]
    PreviouslyFailed,

    /// Filesystem failure while persisting a tile. Never delivered to a
    /// request callback; persistence is best-effort.
    #[error("storage error: {0}")]
    Storage(String),

    /// The background task machinery failed (panic, pool shut down).
    #[error("background task failed: {0}")]
    Task(String),
}

/// An immutable decoded RGBA bitmap.
///
/// Once produced, a tile image is never mutated; layers share it by
/// `Arc` reference.
#[derive(Clone, PartialEq)]
pub struct TileImage {
    pixels: RgbaImage,
}

impl TileImage {
    /// Decodes encoded image bytes (PNG, JPEG, ...) into an RGBA bitmap.
    pub fn decode(bytes: &[u8]) -> Result<Self, TileError> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| TileError::Decode(e.to_string()))?;
        Ok(Self {
            pixels: decoded.to_rgba8(),
        })
    }

    /// Reads and decodes an image file from disk.
    pub fn open(path: &Path) -> Result<Self, TileError> {
        let decoded = image::open(path).map_err(|e| TileError::Decode(e.to_string()))?;
        Ok(Self {
            pixels: decoded.to_rgba8(),
        })
    }

    /// Wraps an already-decoded RGBA buffer.
    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    /// Writes the bitmap to `path` as PNG.
    pub fn save_png(&self, path: &Path) -> Result<(), TileError> {
        self.pixels
            .save(path)
            .map_err(|e| TileError::Storage(e.to_string()))
    }

    /// Encodes the bitmap as PNG bytes.
    pub fn encode_png(&self) -> Result<Vec<u8>, TileError> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(self.pixels.clone())
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| TileError::Decode(e.to_string()))?;
        Ok(bytes)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Raw RGBA bytes, row-major.
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }
}

impl fmt::Debug for TileImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Result of asking a layer for a tile.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The tile's decoded image.
    Image(Arc<TileImage>),

    /// The request failed; see [`TileError`] for the taxonomy.
    Failed(TileError),

    /// Not cached at this layer. Distinct from a failure: the next layer
    /// may still produce the tile.
    Absent,
}

impl FetchOutcome {
    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// The image, if this outcome carries one.
    pub fn image(&self) -> Option<&Arc<TileImage>> {
        match self {
            Self::Image(img) => Some(img),
            _ => None,
        }
    }
}

/// Callback invoked with the outcome of a tile request.
///
/// Always runs on the owner context (the thread driving the pipeline),
/// so it may capture non-`Send` state.
pub type TileCallback = Box<dyn FnOnce(FetchOutcome, TileId)>;

/// Anything that can resolve a tile asynchronously.
///
/// Implementations must invoke the callback at most once. The remote
/// layer's request deduplication means a caller is not guaranteed a
/// callback when an identical request is already in flight.
pub trait TileFetch {
    fn get(&self, id: TileId, callback: TileCallback);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn tiny_image() -> TileImage {
        TileImage::from_rgba(RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255])))
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let original = tiny_image();
        let bytes = original.encode_png().unwrap();
        let decoded = TileImage::decode(&bytes).unwrap();

        assert_eq!(decoded.width(), 2);
        assert_eq!(decoded.height(), 2);
        assert_eq!(decoded.as_raw(), original.as_raw());
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = TileImage::decode(b"definitely not an image");
        assert!(matches!(result, Err(TileError::Decode(_))));
    }

    #[test]
    fn test_debug_omits_pixels() {
        let debug = format!("{:?}", tiny_image());
        assert!(debug.contains("width"));
        assert!(!debug.contains("255"));
    }

    #[test]
    fn test_outcome_predicates() {
        let img = FetchOutcome::Image(Arc::new(tiny_image()));
        assert!(img.is_image());
        assert!(img.image().is_some());

        let failed = FetchOutcome::Failed(TileError::PreviouslyFailed);
        assert!(failed.is_failed());
        assert!(failed.image().is_none());

        assert!(FetchOutcome::Absent.is_absent());
    }

    #[test]
    fn test_error_display() {
        let err = TileError::OutOfBounds { z: 2, x: 4, y: 0 };
        assert_eq!(
            err.to_string(),
            "tile index out of bounds for zoom 2: x=4, y=0"
        );
        assert_eq!(
            TileError::PreviouslyFailed.to_string(),
            "tile previously failed to load"
        );
    }
}
