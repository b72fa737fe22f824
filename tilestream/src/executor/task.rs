//! Task identity and result types for the worker pool.

use std::fmt;

use thiserror::Error;

/// Unique identifier for a submitted task.
///
/// Identifiers are allocated sequentially by the owning pool and are never
/// reused within a pool's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub(crate) u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Failure of a background task that did not produce a value.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// The task panicked; the worker thread survived and the panic payload
    /// is carried here as text.
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// What a completed task delivers to its callback.
pub type TaskResult<T> = Result<T, TaskError>;

/// Errors from pool lifecycle operations.
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    /// The pool has been shut down; no further submissions are accepted.
    #[error("worker pool has been shut down")]
    ShutDown,

    /// A worker thread could not be spawned at construction.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
