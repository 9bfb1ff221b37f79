//! Typed task channels between the orchestrator and the worker pools.
//!
//! A channel binds one task type `T`, one result type `R` and one error type `E`. It consists of
//! three queues: an unbounded outbound task queue that workers block on, and two inbound queues
//! (results and errors) that the single orchestrator drains without blocking.
//!
//! Two decorators compose onto any channel:
//! - [`ReplayingTaskChannel`] serves items loaded from persistence before the wrapped channel's own.
//! - [`SpyingTaskChannel`] tees everything that is sent into a second, listening channel.

pub mod replaying;
pub mod simple;
pub mod spying;

pub use replaying::ReplayingTaskChannel;
pub use simple::SimpleTaskChannel;
pub use spying::SpyingTaskChannel;

use crate::core::errors::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

/// Communication for a single kind of task
#[async_trait]
pub trait TaskChannel<T, R, E>: Send + Sync
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    /// Human readable name of the task, used in logs
    fn task_name(&self) -> &str;

    /// Number of tasks sent but not yet taken by a worker
    fn waiting_tasks(&self) -> usize;

    /// Enqueue a task; never blocks
    fn send_task(&self, task: T) -> Result<()>;

    /// Wait until a task is available and take it.
    ///
    /// Fails once the channel is closed and no task is left.
    async fn get_task(&self) -> Result<T>;

    /// Remove and return every waiting task
    fn drain_tasks(&self) -> Vec<T>;

    /// Report a result; waits while a bounded result queue is full
    async fn send_result(&self, result: R) -> Result<()>;

    /// Remove and return every queued result; never blocks
    fn drain_results(&self) -> Vec<R>;

    /// Report an error; waits while a bounded error queue is full
    async fn send_error(&self, error: E) -> Result<()>;

    /// Remove and return every queued error; never blocks
    fn drain_errors(&self) -> Vec<E>;

    /// Stop handing out tasks and wake every waiting worker
    fn close(&self);
}

/// A channel shared between the orchestrator and its workers
pub type SharedChannel<T, R, E> = Arc<dyn TaskChannel<T, R, E>>;

/// Decorator constructors for shared channels
pub trait TaskChannelExt<T, R, E>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    /// A channel that replays the given tasks, results and errors before querying this one
    fn replaying(self, tasks: Vec<T>, results: Vec<R>, errors: Vec<E>) -> SharedChannel<T, R, E>;

    /// A channel that sends everything to this one and to `listening`; only this one is queried
    fn spy(self, listening: SharedChannel<T, R, E>) -> SharedChannel<T, R, E>;
}

impl<T, R, E> TaskChannelExt<T, R, E> for SharedChannel<T, R, E>
where
    T: Clone + Send + 'static,
    R: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn replaying(self, tasks: Vec<T>, results: Vec<R>, errors: Vec<E>) -> SharedChannel<T, R, E> {
        Arc::new(ReplayingTaskChannel::new(self, tasks, results, errors))
    }

    fn spy(self, listening: SharedChannel<T, R, E>) -> SharedChannel<T, R, E> {
        Arc::new(SpyingTaskChannel::new(self, listening))
    }
}

/// Queues only hold plain data, so a panic while holding the lock cannot leave them inconsistent
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
