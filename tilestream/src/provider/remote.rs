//! Remote tile fetching over HTTP.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::coord::TileId;
use crate::executor::WorkerPool;
use crate::tile::{FetchOutcome, TileCallback, TileError, TileFetch, TileImage};

use super::http::HttpClient;
use super::url::TileUrlTemplate;

/// Keys with a fetch currently in flight.
///
/// Membership means a fetch for the key has already been submitted to the
/// worker pool and another must not be.
#[derive(Clone, Default)]
pub struct PendingSet {
    inner: Rc<RefCell<HashSet<TileId>>>,
}

impl PendingSet {
    pub fn contains(&self, id: TileId) -> bool {
        self.inner.borrow().contains(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    fn insert(&self, id: TileId) -> bool {
        self.inner.borrow_mut().insert(id)
    }

    fn remove(&self, id: TileId) {
        self.inner.borrow_mut().remove(&id);
    }
}

/// Fetches tile images from a remote server through the worker pool.
///
/// Requests for a key that is already in flight are dropped without
/// registering a callback: the earlier request's callback is the only one
/// that fires for that key.
#[derive(Clone)]
pub struct RemoteTileLoader {
    http: Arc<dyn HttpClient>,
    template: Rc<RefCell<TileUrlTemplate>>,
    pending: PendingSet,
    pool: WorkerPool<FetchOutcome>,
}

impl RemoteTileLoader {
    /// Creates a remote loader sharing `template` with its owner, so URL
    /// changes take effect for subsequently submitted fetches without
    /// disturbing those already in flight.
    pub fn new(
        http: Arc<dyn HttpClient>,
        template: Rc<RefCell<TileUrlTemplate>>,
        pool: WorkerPool<FetchOutcome>,
    ) -> Self {
        Self {
            http,
            template,
            pending: PendingSet::default(),
            pool,
        }
    }

    /// The current URL template.
    pub fn url(&self) -> String {
        self.template.borrow().as_str().to_string()
    }

    /// Keys currently being fetched.
    pub fn pending(&self) -> &PendingSet {
        &self.pending
    }
}

impl TileFetch for RemoteTileLoader {
    fn get(&self, id: TileId, callback: TileCallback) {
        if self.pending.contains(id) {
            debug!(key = %id, "fetch already in flight, dropping duplicate request");
            return;
        }
        if self.pool.is_shut_down() {
            warn!(key = %id, "worker pool is shut down, rejecting tile fetch");
            callback(
                FetchOutcome::Failed(TileError::Task("worker pool has been shut down".into())),
                id,
            );
            return;
        }
        self.pending.insert(id);

        // The URL is resolved now; later template changes do not affect
        // this fetch.
        let url = self.template.borrow().url_for(id);
        let http = Arc::clone(&self.http);
        let work = move || {
            debug!(key = %id, %url, "fetching tile");
            match http.get(&url).and_then(|bytes| TileImage::decode(&bytes)) {
                Ok(image) => FetchOutcome::Image(Arc::new(image)),
                Err(e) => FetchOutcome::Failed(e),
            }
        };

        let pending = self.pending.clone();
        let on_done = move |result: crate::executor::TaskResult<FetchOutcome>| {
            pending.remove(id);
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => FetchOutcome::Failed(TileError::Task(e.to_string())),
            };
            callback(outcome, id);
        };

        if let Err(e) = self.pool.submit(work, on_done) {
            warn!(key = %id, error = %e, "could not submit tile fetch");
            self.pending.remove(id);
        }
    }
}
