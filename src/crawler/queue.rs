//! Bounded task queue with an idle barrier
//!
//! Tasks run on the tokio runtime as soon as one of `max_parallel` permits
//! is free. The queue tracks every task from the moment it is added until it
//! finishes, so [`TaskQueue::on_idle`] resolves only once nothing is pending
//! or running, including tasks added by other tasks.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};

/// Concurrency-limited FIFO of asynchronous tasks
#[derive(Debug, Clone)]
pub struct TaskQueue {
    permits: Arc<Semaphore>,
    in_flight: Arc<watch::Sender<usize>>,
    max_parallel: usize,
}

impl TaskQueue {
    /// Creates a queue running at most `max_parallel` tasks at once
    pub fn new(max_parallel: usize) -> Self {
        let max_parallel = max_parallel.max(1);
        let (in_flight, _) = watch::channel(0usize);

        Self {
            permits: Arc::new(Semaphore::new(max_parallel)),
            in_flight: Arc::new(in_flight),
            max_parallel,
        }
    }

    /// Maximum number of concurrently running tasks
    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Number of tasks that are queued or running
    pub fn pending(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Enqueues a task
    ///
    /// The task is counted as pending before this returns. Start order
    /// follows submission order only loosely: each task is spawned before
    /// it queues for a slot, so on a multi-threaded runtime two tasks added
    /// back to back may start in either order.
    pub fn add<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.in_flight.send_modify(|n| *n += 1);

        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        };
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            let _guard = guard;
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            task.await;
        });
    }

    /// Resolves once no task is queued or running
    pub async fn on_idle(&self) {
        let mut rx = self.in_flight.subscribe();
        // The sender lives in self, so the channel cannot close while waiting
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

/// Decrements the pending count when a task ends, even by panic
struct InFlightGuard {
    in_flight: Arc<watch::Sender<usize>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}
