use super::{lock, SharedChannel, TaskChannel};
use crate::core::errors::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::mem;
use std::sync::Mutex;
use tracing::debug;

/// Serves items loaded from persistence before those of the wrapped channel.
///
/// Every replay buffer is handed out exactly once: tasks one at a time through `get_task`,
/// results and errors as a whole on the first drain.
pub struct ReplayingTaskChannel<T, R, E> {
    inner: SharedChannel<T, R, E>,
    tasks: Mutex<VecDeque<T>>,
    results: Mutex<Vec<R>>,
    errors: Mutex<Vec<E>>,
}

impl<T, R, E> ReplayingTaskChannel<T, R, E>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    pub fn new(inner: SharedChannel<T, R, E>, tasks: Vec<T>, results: Vec<R>, errors: Vec<E>) -> Self {
        debug!(
            channel = %inner.task_name(),
            tasks = tasks.len(),
            results = results.len(),
            errors = errors.len(),
            "Replaying persisted items"
        );
        Self {
            inner,
            tasks: Mutex::new(tasks.into()),
            results: Mutex::new(results),
            errors: Mutex::new(errors),
        }
    }

    fn take_replayed<V>(buffer: &Mutex<Vec<V>>, drained: Vec<V>) -> Vec<V> {
        let mut replayed = mem::take(&mut *lock(buffer));
        replayed.extend(drained);
        replayed
    }
}

#[async_trait]
impl<T, R, E> TaskChannel<T, R, E> for ReplayingTaskChannel<T, R, E>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    fn task_name(&self) -> &str {
        self.inner.task_name()
    }

    fn waiting_tasks(&self) -> usize {
        lock(&self.tasks).len() + self.inner.waiting_tasks()
    }

    fn send_task(&self, task: T) -> Result<()> {
        self.inner.send_task(task)
    }

    async fn get_task(&self) -> Result<T> {
        // The guard must be gone before awaiting the wrapped channel
        let replayed = lock(&self.tasks).pop_front();
        match replayed {
            Some(task) => Ok(task),
            None => self.inner.get_task().await,
        }
    }

    fn drain_tasks(&self) -> Vec<T> {
        let mut tasks: Vec<T> = lock(&self.tasks).drain(..).collect();
        tasks.extend(self.inner.drain_tasks());
        tasks
    }

    async fn send_result(&self, result: R) -> Result<()> {
        self.inner.send_result(result).await
    }

    fn drain_results(&self) -> Vec<R> {
        Self::take_replayed(&self.results, self.inner.drain_results())
    }

    async fn send_error(&self, error: E) -> Result<()> {
        self.inner.send_error(error).await
    }

    fn drain_errors(&self) -> Vec<E> {
        Self::take_replayed(&self.errors, self.inner.drain_errors())
    }

    fn close(&self) {
        self.inner.close()
    }
}
