//! Disk-backed tile cache.
//!
//! One PNG file per tile at `<dir>/<z>/<x>/<y>.png`. Reads decode on the
//! owner context; writes are best-effort: a failed write is logged and the
//! tile simply stays uncached.

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{info, warn};

use crate::coord::TileId;
use crate::tile::{FetchOutcome, TileCallback, TileImage};

use super::CacheLayer;

/// Filesystem tile cache handle. Clones share the same directory cell, so
/// repointing the cache (e.g. after a tile source change) affects every
/// holder at once.
#[derive(Clone)]
pub struct DiskTileCache {
    dir: Rc<RefCell<PathBuf>>,
}

impl DiskTileCache {
    /// Creates a cache rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let cache = Self {
            dir: Rc::new(RefCell::new(PathBuf::new())),
        };
        cache.set_dir(dir.into());
        cache
    }

    /// Current cache directory.
    pub fn dir(&self) -> PathBuf {
        self.dir.borrow().clone()
    }

    /// Repoints the cache at a new directory, creating it if needed.
    /// Tiles already stored under the old directory stay on disk.
    pub fn set_dir(&self, dir: PathBuf) {
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %e, "could not create tile cache directory");
        } else {
            info!(dir = %dir.display(), "tile cache directory set");
        }
        *self.dir.borrow_mut() = dir;
    }

    fn tile_path(&self, id: TileId) -> PathBuf {
        self.dir
            .borrow()
            .join(id.z.to_string())
            .join(id.x.to_string())
            .join(format!("{}.png", id.y))
    }
}

impl CacheLayer for DiskTileCache {
    fn has(&self, id: TileId) -> bool {
        self.tile_path(id).is_file()
    }

    fn fetch(&self, id: TileId, callback: TileCallback) {
        let path = self.tile_path(id);
        if !path.is_file() {
            callback(FetchOutcome::Absent, id);
            return;
        }
        match TileImage::open(&path) {
            Ok(image) => callback(FetchOutcome::Image(Arc::new(image)), id),
            // A corrupt file surfaces as a failure, not a crash.
            Err(e) => callback(FetchOutcome::Failed(e), id),
        }
    }

    fn save(&self, id: TileId, image: &Arc<TileImage>) {
        let path = self.tile_path(id);
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(key = %id, error = %e, "could not create tile directory");
                return;
            }
        }
        if let Err(e) = image.save_png(&path) {
            warn!(key = %id, error = %e, "could not write tile to disk");
        }
    }
}
