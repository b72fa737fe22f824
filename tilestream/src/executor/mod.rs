//! Background execution for the tile pipeline.
//!
//! A [`WorkerPool`] runs submitted closures on a fixed set of worker
//! threads and hands each result back to the owning context through
//! [`WorkerPool::poll`], keeping all callback execution on one thread.

mod pool;
mod task;

pub use pool::WorkerPool;
pub use task::{PoolError, TaskError, TaskId, TaskResult};
