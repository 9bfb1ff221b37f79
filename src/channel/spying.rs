use super::{SharedChannel, TaskChannel};
use crate::core::errors::Result;
use async_trait::async_trait;

/// Tees every send into a listening channel; queries only ever see the wrapped channel.
pub struct SpyingTaskChannel<T, R, E> {
    inner: SharedChannel<T, R, E>,
    listening: SharedChannel<T, R, E>,
}

impl<T, R, E> SpyingTaskChannel<T, R, E>
where
    T: Clone + Send + 'static,
    R: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn new(inner: SharedChannel<T, R, E>, listening: SharedChannel<T, R, E>) -> Self {
        Self { inner, listening }
    }
}

#[async_trait]
impl<T, R, E> TaskChannel<T, R, E> for SpyingTaskChannel<T, R, E>
where
    T: Clone + Send + 'static,
    R: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn task_name(&self) -> &str {
        self.inner.task_name()
    }

    fn waiting_tasks(&self) -> usize {
        self.inner.waiting_tasks()
    }

    fn send_task(&self, task: T) -> Result<()> {
        self.listening.send_task(task.clone())?;
        self.inner.send_task(task)
    }

    async fn get_task(&self) -> Result<T> {
        self.inner.get_task().await
    }

    fn drain_tasks(&self) -> Vec<T> {
        self.inner.drain_tasks()
    }

    async fn send_result(&self, result: R) -> Result<()> {
        self.listening.send_result(result.clone()).await?;
        self.inner.send_result(result).await
    }

    fn drain_results(&self) -> Vec<R> {
        self.inner.drain_results()
    }

    async fn send_error(&self, error: E) -> Result<()> {
        self.listening.send_error(error.clone()).await?;
        self.inner.send_error(error).await
    }

    fn drain_errors(&self) -> Vec<E> {
        self.inner.drain_errors()
    }

    /// Closes only the wrapped channel; the listener is closed by whoever owns it
    fn close(&self) {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{SimpleTaskChannel, TaskChannelExt};
    use std::sync::Arc;

    type Shared = SharedChannel<u32, String, String>;

    fn pair() -> (Shared, Shared) {
        (
            Arc::new(SimpleTaskChannel::unbounded("primary")),
            Arc::new(SimpleTaskChannel::unbounded("listening")),
        )
    }

    #[tokio::test]
    async fn test_sends_are_mirrored() {
        let (inner, listening) = pair();
        let spy = inner.clone().spy(listening.clone());

        spy.send_task(1).unwrap();
        spy.send_result("ok".into()).await.unwrap();
        spy.send_error("bad".into()).await.unwrap();

        assert_eq!(listening.drain_tasks(), vec![1]);
        assert_eq!(listening.drain_results(), vec!["ok".to_string()]);
        assert_eq!(listening.drain_errors(), vec!["bad".to_string()]);

        assert_eq!(spy.get_task().await.unwrap(), 1);
        assert_eq!(spy.drain_results(), vec!["ok".to_string()]);
        assert_eq!(spy.drain_errors(), vec!["bad".to_string()]);
    }

    #[tokio::test]
    async fn test_queries_do_not_touch_listener() {
        let (inner, listening) = pair();
        let spy = inner.clone().spy(listening.clone());

        spy.send_result("once".into()).await.unwrap();
        assert_eq!(spy.drain_results(), vec!["once".to_string()]);
        // Draining the primary side leaves the mirrored copy for persistence
        assert_eq!(listening.drain_results(), vec!["once".to_string()]);

        listening.send_task(7).unwrap();
        assert_eq!(spy.waiting_tasks(), 0);
    }

    #[tokio::test]
    async fn test_replaying_spy_composition() {
        let (inner, listening) = pair();
        let channel = inner.replaying(vec![], vec!["persisted".into()], vec![]).spy(listening.clone());

        channel.send_result("fresh".into()).await.unwrap();
        assert_eq!(
            channel.drain_results(),
            vec!["persisted".to_string(), "fresh".to_string()]
        );
        // Replayed items were already persisted and are not mirrored again
        assert_eq!(listening.drain_results(), vec!["fresh".to_string()]);
    }
}
