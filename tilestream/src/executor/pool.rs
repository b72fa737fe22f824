//! Fixed-size worker pool with owner-context result delivery.
//!
//! Work submitted to the pool executes on one of a fixed set of worker
//! threads; completions accumulate on a result queue until the owning
//! context drains them with [`WorkerPool::poll`], which invokes each
//! submission's callback exactly once. Callbacks therefore always run on
//! the thread that polls, never on a worker, so they may touch state that
//! is not `Send`.
//!
//! The pool handle is cheaply cloneable and single-owner by construction
//! (`Rc` internals): `submit`, `poll` and `shutdown` must all happen on
//! the thread that created the pool. Only the task and result queues are
//! shared with the workers.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::task::{panic_message, PoolError, TaskError, TaskId, TaskResult};

type Callback<T> = Box<dyn FnOnce(TaskResult<T>)>;

struct QueuedWork<T> {
    id: TaskId,
    work: Box<dyn FnOnce() -> T + Send>,
}

/// State shared between the owner handle and the worker threads.
struct Shared<T> {
    /// Workers take turns blocking on the receiver; the guard is held only
    /// for the duration of a single `recv`, so tasks execute unlocked.
    queue: Mutex<mpsc::Receiver<QueuedWork<T>>>,
    shutdown: AtomicBool,
}

struct PoolInner<T> {
    shared: Arc<Shared<T>>,
    task_tx: RefCell<Option<mpsc::Sender<QueuedWork<T>>>>,
    result_rx: mpsc::Receiver<(TaskId, TaskResult<T>)>,
    callbacks: RefCell<HashMap<TaskId, Callback<T>>>,
    workers: RefCell<Vec<JoinHandle<()>>>,
    next_id: Cell<u64>,
    down: Cell<bool>,
}

/// Handle to a fixed-size pool of worker threads.
///
/// Cloning the handle is cheap and shares the same pool.
pub struct WorkerPool<T> {
    inner: Rc<PoolInner<T>>,
}

impl<T> Clone for WorkerPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Starts `size` worker threads (at least one).
    pub fn new(size: usize) -> Result<Self, PoolError> {
        let (task_tx, task_rx) = mpsc::channel();
        let (result_tx, result_rx) = mpsc::channel();

        let shared = Arc::new(Shared {
            queue: Mutex::new(task_rx),
            shutdown: AtomicBool::new(false),
        });

        let mut workers = Vec::new();
        for i in 0..size.max(1) {
            let shared = Arc::clone(&shared);
            let result_tx = result_tx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("tile-worker-{}", i))
                .spawn(move || worker_loop(shared, result_tx))
                .map_err(|e| PoolError::Spawn(e.to_string()))?;
            workers.push(handle);
        }

        Ok(Self {
            inner: Rc::new(PoolInner {
                shared,
                task_tx: RefCell::new(Some(task_tx)),
                result_rx,
                callbacks: RefCell::new(HashMap::new()),
                workers: RefCell::new(workers),
                next_id: Cell::new(0),
                down: Cell::new(false),
            }),
        })
    }

    /// Enqueues `work` for background execution and registers `on_done`
    /// to receive its result during a later [`poll`](Self::poll).
    ///
    /// Returns immediately; never blocks the caller. After
    /// [`shutdown`](Self::shutdown) all submissions are rejected.
    pub fn submit<W, F>(&self, work: W, on_done: F) -> Result<TaskId, PoolError>
    where
        W: FnOnce() -> T + Send + 'static,
        F: FnOnce(TaskResult<T>) + 'static,
    {
        if self.inner.down.get() {
            return Err(PoolError::ShutDown);
        }

        let id = TaskId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);

        self.inner
            .callbacks
            .borrow_mut()
            .insert(id, Box::new(on_done));

        let sent = match &*self.inner.task_tx.borrow() {
            Some(tx) => tx
                .send(QueuedWork {
                    id,
                    work: Box::new(work),
                })
                .is_ok(),
            None => false,
        };
        if !sent {
            self.inner.callbacks.borrow_mut().remove(&id);
            return Err(PoolError::ShutDown);
        }

        trace!(%id, "task submitted");
        Ok(id)
    }

    /// Drains all currently-available results, invoking each task's
    /// callback exactly once. Returns the number of callbacks invoked.
    ///
    /// Callbacks fire in completion order, which is unrelated to
    /// submission order.
    pub fn poll(&self) -> usize {
        let mut invoked = 0;
        while let Ok((id, result)) = self.inner.result_rx.try_recv() {
            let callback = self.inner.callbacks.borrow_mut().remove(&id);
            match callback {
                Some(callback) => {
                    callback(result);
                    invoked += 1;
                }
                // Results that outlive shutdown have no callback left.
                None => trace!(%id, "discarding result with no registered callback"),
            }
        }
        invoked
    }

    /// Number of submissions whose callbacks have not fired yet.
    pub fn pending(&self) -> usize {
        self.inner.callbacks.borrow().len()
    }

    /// Stops the pool: rejects new submissions, discards queued-but-not-
    /// started work and all registered callbacks, and optionally joins the
    /// worker threads.
    ///
    /// Work already executing runs to completion; its result is discarded
    /// on the next [`poll`](Self::poll).
    pub fn shutdown(&self, wait: bool) {
        if self.inner.down.replace(true) {
            return;
        }

        // Workers observe the flag after their next dequeue and discard
        // the task instead of running it.
        self.inner.shared.shutdown.store(true, Ordering::Release);

        let dropped = self.inner.callbacks.borrow_mut().len();
        self.inner.callbacks.borrow_mut().clear();
        if dropped > 0 {
            debug!(dropped, "shutdown dropped registered callbacks");
        }

        // Dropping the sender wakes any worker blocked on an empty queue.
        *self.inner.task_tx.borrow_mut() = None;

        if wait {
            for handle in self.inner.workers.borrow_mut().drain(..) {
                let _ = handle.join();
            }
        }
    }

    /// Whether the pool has been shut down.
    pub fn is_shut_down(&self) -> bool {
        self.inner.down.get()
    }
}

impl<T> Drop for PoolInner<T> {
    fn drop(&mut self) {
        // Detached workers exit once the sender is gone and the queue is
        // drained; nothing to join here.
        self.shared.shutdown.store(true, Ordering::Release);
        *self.task_tx.borrow_mut() = None;
    }
}

fn worker_loop<T: Send + 'static>(
    shared: Arc<Shared<T>>,
    result_tx: mpsc::Sender<(TaskId, TaskResult<T>)>,
) {
    loop {
        let next = {
            let queue = shared.queue.lock();
            queue.recv()
        };
        let Ok(QueuedWork { id, work }) = next else {
            break;
        };

        if shared.shutdown.load(Ordering::Acquire) {
            trace!(%id, "discarding queued task after shutdown");
            continue;
        }

        let result = catch_unwind(AssertUnwindSafe(work))
            .map_err(|payload| TaskError::Panicked(panic_message(payload.as_ref())));

        if result_tx.send((id, result)).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::{Duration, Instant};

    /// Polls until `done` reports true or two seconds elapse.
    fn poll_until(pool: &WorkerPool<i32>, done: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting for results");
            pool.poll();
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_submit_and_poll_delivers_result() {
        let pool = WorkerPool::new(2).unwrap();
        let got = Rc::new(RefCell::new(None));

        let sink = Rc::clone(&got);
        pool.submit(|| 41 + 1, move |r| *sink.borrow_mut() = Some(r))
            .unwrap();

        poll_until(&pool, || got.borrow().is_some());
        assert!(matches!(*got.borrow(), Some(Ok(42))));
        pool.shutdown(true);
    }

    #[test]
    fn test_each_callback_fires_exactly_once() {
        let pool = WorkerPool::new(4).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for i in 0..20 {
            let sink = Rc::clone(&seen);
            pool.submit(move || i, move |r| sink.borrow_mut().push(r.unwrap()))
                .unwrap();
        }

        poll_until(&pool, || seen.borrow().len() == 20);
        // Extra polls do not re-deliver anything.
        assert_eq!(pool.poll(), 0);

        let mut values = seen.borrow().clone();
        values.sort_unstable();
        assert_eq!(values, (0..20).collect::<Vec<_>>());
        pool.shutdown(true);
    }

    #[test]
    fn test_panic_is_caught_and_typed() {
        let pool = WorkerPool::new(1).unwrap();
        let got = Rc::new(RefCell::new(None));

        let sink = Rc::clone(&got);
        pool.submit(
            || -> i32 { panic!("tile decode exploded") },
            move |r| *sink.borrow_mut() = Some(r),
        )
        .unwrap();

        poll_until(&pool, || got.borrow().is_some());
        let result = got.borrow_mut().take().unwrap();
        match result {
            Err(TaskError::Panicked(msg)) => assert!(msg.contains("tile decode exploded")),
            other => panic!("expected panic error, got {:?}", other),
        }

        // The worker survived the panic and keeps serving tasks.
        let sink = Rc::clone(&got);
        pool.submit(|| 7, move |r| *sink.borrow_mut() = Some(r))
            .unwrap();
        poll_until(&pool, || matches!(*got.borrow(), Some(Ok(7))));
        pool.shutdown(true);
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let pool: WorkerPool<i32> = WorkerPool::new(1).unwrap();
        pool.shutdown(true);
        assert!(pool.is_shut_down());

        let result = pool.submit(|| 1, |_| {});
        assert!(matches!(result, Err(PoolError::ShutDown)));
    }

    #[test]
    fn test_shutdown_discards_queued_work_and_callbacks() {
        let pool: WorkerPool<i32> = WorkerPool::new(1).unwrap();

        // One slow task occupies the single worker; the rest stay queued.
        pool.submit(
            || {
                std::thread::sleep(Duration::from_millis(50));
                0
            },
            |_| {},
        )
        .unwrap();
        for i in 0..5 {
            pool.submit(move || i, |_| panic!("queued callback must not fire"))
                .unwrap();
        }

        pool.shutdown(true);
        assert_eq!(pool.pending(), 0);

        // Whatever results trickled in have no callbacks left to invoke.
        assert_eq!(pool.poll(), 0);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let pool: WorkerPool<i32> = WorkerPool::new(2).unwrap();
        pool.shutdown(true);
        pool.shutdown(true);
        pool.shutdown(false);
    }

    #[test]
    fn test_zero_size_pool_still_has_a_worker() {
        let pool = WorkerPool::new(0).unwrap();
        let got = Rc::new(RefCell::new(None));

        let sink = Rc::clone(&got);
        pool.submit(|| 5, move |r| *sink.borrow_mut() = Some(r))
            .unwrap();
        poll_until(&pool, || got.borrow().is_some());
        pool.shutdown(true);
    }

    #[test]
    fn test_callback_may_resubmit() {
        let pool = WorkerPool::new(1).unwrap();
        let got = Rc::new(RefCell::new(None));

        let pool2 = pool.clone();
        let sink = Rc::clone(&got);
        pool.submit(
            || 1,
            move |_| {
                // Re-entrant submission from inside a poll callback.
                let sink = Rc::clone(&sink);
                pool2
                    .submit(|| 2, move |r| *sink.borrow_mut() = Some(r))
                    .unwrap();
            },
        )
        .unwrap();

        poll_until(&pool, || matches!(*got.borrow(), Some(Ok(2))));
        pool.shutdown(true);
    }
}
