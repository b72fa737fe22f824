//! Cache layers for the tile resolution chain.
//!
//! A chain link is a [`CacheLayer`] (what `has`/`fetch`/`save` mean for a
//! particular backing store) driven by the generic [`Chained`] wrapper:
//! serve locally when present, otherwise delegate to the next loader and
//! persist its successful result on the way back up. The layers differ
//! only in their store; the traversal logic lives here once.

mod disk;
mod error;
mod memory;

pub use disk::DiskTileCache;
pub use error::{ErrorCacheLoader, ErrorSet};
pub use memory::{MemoryTileCache, DEFAULT_MEMORY_TILES};

use std::sync::Arc;

use tracing::debug;

use crate::coord::TileId;
use crate::tile::{FetchOutcome, TileCallback, TileFetch, TileImage};

/// Backing-store operations of one cache link.
///
/// Implementations are cheap-clone handles over shared interior state, so
/// the chain driver can carry one into the delegation callback. All three
/// operations run synchronously on the owner context and must not block
/// on anything slower than local disk.
pub trait CacheLayer {
    /// Whether the tile is present in this layer's store.
    fn has(&self, id: TileId) -> bool;

    /// Serves strictly from local state, calling back with
    /// [`FetchOutcome::Absent`] when the tile is not stored here.
    fn fetch(&self, id: TileId, callback: TileCallback);

    /// Persists a tile without blocking the caller's control flow.
    /// Failures degrade to "not cached" and are logged, never surfaced.
    fn save(&self, id: TileId, image: &Arc<TileImage>);
}

/// Chain-of-responsibility driver wrapping one [`CacheLayer`].
pub struct Chained<L> {
    layer: L,
    next: Box<dyn TileFetch>,
}

impl<L: CacheLayer> Chained<L> {
    pub fn new(layer: L, next: Box<dyn TileFetch>) -> Self {
        Self { layer, next }
    }

    /// The wrapped layer.
    pub fn layer(&self) -> &L {
        &self.layer
    }
}

impl<L: CacheLayer + Clone + 'static> TileFetch for Chained<L> {
    fn get(&self, id: TileId, callback: TileCallback) {
        if self.layer.has(id) {
            self.layer.fetch(id, callback);
            return;
        }

        let layer = self.layer.clone();
        self.next.get(
            id,
            Box::new(move |outcome, id| {
                match &outcome {
                    FetchOutcome::Image(image) => layer.save(id, image),
                    // Failures and absence pass through unsaved; the error
                    // cache layer owns failure bookkeeping.
                    FetchOutcome::Failed(e) => {
                        debug!(key = %id, error = %e, "delegated fetch failed")
                    }
                    FetchOutcome::Absent => {}
                }
                callback(outcome, id);
            }),
        );
    }
}
