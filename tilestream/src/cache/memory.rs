//! In-memory tile cache with LRU eviction.

use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::rc::Rc;
use std::sync::Arc;

use lru::LruCache;
use tracing::debug;

use crate::coord::TileId;
use crate::tile::{FetchOutcome, TileCallback, TileImage};

use super::CacheLayer;

/// Default capacity in tiles.
pub const DEFAULT_MEMORY_TILES: usize = 256;

/// Bounded LRU cache of decoded tiles, keyed by [`TileId`].
///
/// A fetch hit counts as a use: the key moves to the most-recently-used
/// position, so tiles the map surface keeps asking for survive eviction.
/// The handle is cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct MemoryTileCache {
    inner: Rc<RefCell<LruCache<TileId, Arc<TileImage>>>>,
}

impl MemoryTileCache {
    /// Creates a cache holding at most `capacity` tiles (minimum one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Rc::new(RefCell::new(LruCache::new(capacity))),
        }
    }

    /// Number of tiles currently cached.
    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    /// Configured capacity in tiles.
    pub fn capacity(&self) -> usize {
        self.inner.borrow().cap().get()
    }

    /// Drops every cached tile.
    pub fn clear(&self) {
        debug!("clearing memory tile cache");
        self.inner.borrow_mut().clear();
    }
}

impl Default for MemoryTileCache {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_TILES)
    }
}

impl CacheLayer for MemoryTileCache {
    fn has(&self, id: TileId) -> bool {
        self.inner.borrow().contains(&id)
    }

    fn fetch(&self, id: TileId, callback: TileCallback) {
        let cached = self.inner.borrow_mut().get(&id).cloned();
        match cached {
            Some(image) => callback(FetchOutcome::Image(image), id),
            None => callback(FetchOutcome::Absent, id),
        }
    }

    fn save(&self, id: TileId, image: &Arc<TileImage>) {
        self.inner.borrow_mut().put(id, Arc::clone(image));
    }
}
