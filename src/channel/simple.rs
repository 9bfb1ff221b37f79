use super::{lock, TaskChannel};
use crate::core::errors::{DepwallError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

/// Inbound queue that is either bounded (send waits while full) or unbounded
enum Inbound<V> {
    Bounded {
        tx: mpsc::Sender<V>,
        rx: Mutex<mpsc::Receiver<V>>,
    },
    Unbounded {
        tx: mpsc::UnboundedSender<V>,
        rx: Mutex<mpsc::UnboundedReceiver<V>>,
    },
}

impl<V: Send> Inbound<V> {
    /// Capacity 0 means unbounded
    fn with_capacity(capacity: usize) -> Self {
        if capacity == 0 {
            let (tx, rx) = mpsc::unbounded_channel();
            Inbound::Unbounded {
                tx,
                rx: Mutex::new(rx),
            }
        } else {
            let (tx, rx) = mpsc::channel(capacity);
            Inbound::Bounded {
                tx,
                rx: Mutex::new(rx),
            }
        }
    }

    async fn send(&self, value: V) -> std::result::Result<(), ()> {
        match self {
            Inbound::Bounded { tx, .. } => tx.send(value).await.map_err(|_| ()),
            Inbound::Unbounded { tx, .. } => tx.send(value).map_err(|_| ()),
        }
    }

    fn drain(&self) -> Vec<V> {
        let mut drained = Vec::new();
        match self {
            Inbound::Bounded { rx, .. } => {
                let mut rx = lock(rx);
                while let Ok(value) = rx.try_recv() {
                    drained.push(value);
                }
            }
            Inbound::Unbounded { rx, .. } => {
                let mut rx = lock(rx);
                while let Ok(value) = rx.try_recv() {
                    drained.push(value);
                }
            }
        }
        drained
    }
}

/// The basic channel: a multi-consumer FIFO task queue plus result and error queues
pub struct SimpleTaskChannel<T, R, E> {
    task_name: String,
    tasks: Mutex<VecDeque<T>>,
    task_available: Notify,
    closed: AtomicBool,
    results: Inbound<R>,
    errors: Inbound<E>,
}

impl<T, R, E> SimpleTaskChannel<T, R, E>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    /// Unbounded capacities for results and errors
    pub fn unbounded(task_name: impl Into<String>) -> Self {
        Self::bounded(task_name, 0, 0)
    }

    /// The given capacities for results and errors, where 0 means unbounded
    pub fn bounded(task_name: impl Into<String>, result_capacity: usize, error_capacity: usize) -> Self {
        Self {
            task_name: task_name.into(),
            tasks: Mutex::new(VecDeque::new()),
            task_available: Notify::new(),
            closed: AtomicBool::new(false),
            results: Inbound::with_capacity(result_capacity),
            errors: Inbound::with_capacity(error_capacity),
        }
    }

    fn closed_error(&self, operation: &str) -> DepwallError {
        DepwallError::channel(
            self.task_name.clone(),
            format!("cannot {}: channel is closed", operation),
        )
    }
}

#[async_trait]
impl<T, R, E> TaskChannel<T, R, E> for SimpleTaskChannel<T, R, E>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    fn task_name(&self) -> &str {
        &self.task_name
    }

    fn waiting_tasks(&self) -> usize {
        lock(&self.tasks).len()
    }

    fn send_task(&self, task: T) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.closed_error("send task"));
        }
        lock(&self.tasks).push_back(task);
        self.task_available.notify_one();
        Ok(())
    }

    async fn get_task(&self) -> Result<T> {
        loop {
            // Register interest before looking at the queue so a concurrent send cannot be missed
            let notified = self.task_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(task) = lock(&self.tasks).pop_front() {
                return Ok(task);
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(self.closed_error("get task"));
            }
            notified.await;
        }
    }

    fn drain_tasks(&self) -> Vec<T> {
        lock(&self.tasks).drain(..).collect()
    }

    async fn send_result(&self, result: R) -> Result<()> {
        self.results
            .send(result)
            .await
            .map_err(|_| self.closed_error("send result"))
    }

    fn drain_results(&self) -> Vec<R> {
        self.results.drain()
    }

    async fn send_error(&self, error: E) -> Result<()> {
        self.errors
            .send(error)
            .await
            .map_err(|_| self.closed_error("send error"))
    }

    fn drain_errors(&self) -> Vec<E> {
        self.errors.drain()
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(channel = %self.task_name, "Closing channel");
        }
        self.task_available.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    type TestChannel = SimpleTaskChannel<u32, String, String>;

    #[tokio::test]
    async fn test_tasks_are_fifo() {
        let channel = TestChannel::unbounded("test");
        channel.send_task(1).unwrap();
        channel.send_task(2).unwrap();
        assert_eq!(channel.waiting_tasks(), 2);
        assert_eq!(channel.get_task().await.unwrap(), 1);
        assert_eq!(channel.get_task().await.unwrap(), 2);
        assert_eq!(channel.waiting_tasks(), 0);
    }

    #[tokio::test]
    async fn test_get_task_waits_for_send() {
        let channel = Arc::new(TestChannel::unbounded("test"));
        let worker = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.get_task().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!worker.is_finished());

        channel.send_task(9).unwrap();
        let task = tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(task, 9);
    }

    #[tokio::test]
    async fn test_each_task_goes_to_one_worker() {
        let channel = Arc::new(TestChannel::unbounded("test"));
        let mut workers = Vec::new();
        for _ in 0..4 {
            let channel = channel.clone();
            workers.push(tokio::spawn(async move {
                let mut taken = Vec::new();
                while let Ok(task) = channel.get_task().await {
                    taken.push(task);
                }
                taken
            }));
        }
        for task in 0..100 {
            channel.send_task(task).unwrap();
        }
        while channel.waiting_tasks() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        channel.close();

        let mut all = Vec::new();
        for worker in workers {
            all.extend(worker.await.unwrap());
        }
        all.sort();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_worker() {
        let channel = Arc::new(TestChannel::unbounded("download"));
        let worker = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.get_task().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        channel.close();

        let result = tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(DepwallError::Channel { ref channel, .. }) if channel == "download"));
        assert!(channel.send_task(1).is_err());
    }

    #[tokio::test]
    async fn test_drain_is_destructive_and_non_blocking() {
        let channel = TestChannel::unbounded("test");
        assert!(channel.drain_results().is_empty());

        channel.send_result("a".into()).await.unwrap();
        channel.send_result("b".into()).await.unwrap();
        channel.send_error("e".into()).await.unwrap();

        assert_eq!(channel.drain_results(), vec!["a".to_string(), "b".to_string()]);
        assert!(channel.drain_results().is_empty());
        assert_eq!(channel.drain_errors(), vec!["e".to_string()]);
        assert!(channel.drain_errors().is_empty());
    }

    #[tokio::test]
    async fn test_bounded_results_block_until_drained() {
        let channel = Arc::new(TestChannel::bounded("test", 1, 0));
        channel.send_result("first".into()).await.unwrap();

        let producer = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.send_result("second".into()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        assert_eq!(channel.drain_results(), vec!["first".to_string()]);
        tokio::time::timeout(Duration::from_secs(1), producer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(channel.drain_results(), vec!["second".to_string()]);
    }

    #[test]
    fn test_drain_tasks() {
        let channel = TestChannel::unbounded("test");
        channel.send_task(3).unwrap();
        channel.send_task(4).unwrap();
        assert_eq!(channel.drain_tasks(), vec![3, 4]);
        assert_eq!(channel.waiting_tasks(), 0);
    }
}
