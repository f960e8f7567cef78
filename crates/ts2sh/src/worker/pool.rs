//! Bounded execution of pipeline tasks.
//!
//! Every submitted task is spawned immediately and waits on a semaphore
//! permit, so admission past the bound queues instead of failing.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::debug;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    capacity: usize,
}

/// Counts a task as in flight from submission until it finishes or panics.
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl WorkerPool {
    /// A `capacity` of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        debug!("Worker pool allows {} concurrent pipelines", capacity);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tasks submitted and not yet finished, queued ones included.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Schedules `task` to run once a permit is free.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            idle: Arc::clone(&self.idle),
        };
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            let _guard = guard;
            let Ok(_permit) = permits.acquire_owned().await else {
                // Only happens if the semaphore is closed, which the pool never does.
                return;
            };
            task.await;
        })
    }

    /// Resolves once no task is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking the counter so a wakeup in between is not lost.
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}
