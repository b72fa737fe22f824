//! Failed-fetch suppression.
//!
//! Repeated requests for a tile whose last remote fetch failed would
//! otherwise hammer the server every time the map surface redraws. This
//! layer records failed keys and answers them with a synthesized failure
//! until the set is cleared, which happens when the tile source changes
//! (failures are source-specific).

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::coord::TileId;
use crate::tile::{FetchOutcome, TileCallback, TileError, TileFetch};

/// Keys whose most recent remote fetch failed. Cheap-clone handle.
#[derive(Clone, Default)]
pub struct ErrorSet {
    inner: Rc<RefCell<HashSet<TileId>>>,
}

impl ErrorSet {
    pub fn contains(&self, id: TileId) -> bool {
        self.inner.borrow().contains(&id)
    }

    pub fn insert(&self, id: TileId) {
        self.inner.borrow_mut().insert(id);
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    /// Forgets every recorded failure.
    pub fn clear(&self) {
        debug!("clearing tile error cache");
        self.inner.borrow_mut().clear();
    }
}

/// Chain link that short-circuits requests for known-failed tiles.
///
/// Unlike the storage layers this is not a [`CacheLayer`]: it has to
/// observe failures flowing back from the next loader, so it implements
/// the fetch contract directly.
pub struct ErrorCacheLoader {
    errors: ErrorSet,
    next: Box<dyn TileFetch>,
}

impl ErrorCacheLoader {
    pub fn new(errors: ErrorSet, next: Box<dyn TileFetch>) -> Self {
        Self { errors, next }
    }

    /// The shared failure set.
    pub fn errors(&self) -> &ErrorSet {
        &self.errors
    }
}

impl TileFetch for ErrorCacheLoader {
    fn get(&self, id: TileId, callback: TileCallback) {
        if self.errors.contains(id) {
            debug!(key = %id, "suppressing fetch for previously failed tile");
            callback(FetchOutcome::Failed(TileError::PreviouslyFailed), id);
            return;
        }

        let errors = self.errors.clone();
        self.next.get(
            id,
            Box::new(move |outcome, id| {
                if let FetchOutcome::Failed(e) = &outcome {
                    // The one place the root cause is recorded.
                    warn!(key = %id, error = %e, "tile fetch failed, suppressing retries");
                    errors.insert(id);
                }
                callback(outcome, id);
            }),
        );
    }
}
