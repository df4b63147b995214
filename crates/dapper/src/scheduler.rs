//! Single cooperative event loop.
//!
//! Work submitted via [`Scheduler::spawn`] runs on one loop, in submission
//! order, one task at a time — no two queued tasks ever interleave, so
//! handlers that mutate session state don't need their own locking.
//! Work submitted via [`Scheduler::spawn_threadsafe`] instead runs
//! concurrently on the Tokio runtime (for IO-bound background work like
//! proxying a child process's stdout) and is tracked in `_bg_tasks` purely
//! so shutdown can wait for or abort it.

use crate::error::DapperError;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Drives the cooperative queue and tracks detached background tasks.
pub struct Scheduler {
    queue_tx: tokio::sync::Mutex<Option<mpsc::UnboundedSender<BoxedTask>>>,
    queue_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<BoxedTask>>>,
    bg_tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    shutdown_notify: Arc<Notify>,
    shutting_down: AtomicBool,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            queue_tx: tokio::sync::Mutex::new(Some(queue_tx)),
            queue_rx: tokio::sync::Mutex::new(Some(queue_rx)),
            bg_tasks: tokio::sync::Mutex::new(Vec::new()),
            shutdown_notify: Arc::new(Notify::new()),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Queues `fut` to run on the cooperative loop, after every task queued
    /// before it and before every task queued after it. Returns immediately;
    /// the caller does not await completion.
    pub async fn spawn<F>(&self, fut: F) -> Result<(), DapperError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(DapperError::SessionShuttingDown);
        }
        let guard = self.queue_tx.lock().await;
        match guard.as_ref() {
            Some(tx) => tx.send(Box::pin(fut)).map_err(|_| DapperError::SessionShuttingDown),
            None => Err(DapperError::SessionShuttingDown),
        }
    }

    /// Dispatches `fut` onto the Tokio runtime directly, independent of the
    /// cooperative queue's ordering. Safe to call from any task or thread
    /// that holds a `&Scheduler`.
    pub async fn spawn_threadsafe<F>(&self, fut: F) -> Result<(), DapperError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(DapperError::SessionShuttingDown);
        }
        let handle = tokio::spawn(fut);
        self.bg_tasks.lock().await.push(handle);
        Ok(())
    }

    /// Runs a future with a deadline, mapping a timeout into a
    /// [`DapperError::BackendTimeout`] for the named operation.
    pub async fn with_timeout<F, T>(operation: &str, timeout: Duration, fut: F) -> Result<T, DapperError>
    where
        F: Future<Output = T>,
    {
        let start = tokio::time::Instant::now();
        tokio::time::timeout(timeout, fut).await.map_err(|_| DapperError::BackendTimeout {
            operation: operation.to_string(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// A future that resolves once [`Self::shutdown`] has been called. Long
    /// running background tasks can race this to stop promptly.
    pub fn shutdown_signal(&self) -> impl Future<Output = ()> + '_ {
        self.shutdown_notify.notified()
    }

    /// Drains the cooperative queue, running each task to completion before
    /// pulling the next, until [`Self::shutdown`] closes the queue.
    pub async fn run(&self) {
        let mut rx = match self.queue_rx.lock().await.take() {
            Some(rx) => rx,
            None => return, // `run` already called and consumed the receiver
        };
        while let Some(task) = rx.recv().await {
            task.await;
        }
    }

    /// Signals shutdown: closes the cooperative queue (so [`Self::run`]
    /// returns once drained), wakes anyone waiting on
    /// [`Self::shutdown_signal`], and aborts every still-running background
    /// task.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.queue_tx.lock().await.take(); // drop the sender, closing the queue
        self.shutdown_notify.notify_waiters();
        let mut bg_tasks = self.bg_tasks.lock().await;
        for handle in bg_tasks.drain(..) {
            handle.abort();
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn queued_tasks_run_in_submission_order() {
        let scheduler = Arc::new(Scheduler::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = order.clone();
            scheduler.spawn(async move { order.lock().unwrap().push(i) }).await.unwrap();
        }

        let sched = scheduler.clone();
        let run_handle = tokio::spawn(async move { sched.run().await });
        scheduler.shutdown().await;
        run_handle.await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn spawn_after_shutdown_is_rejected() {
        let scheduler = Scheduler::new();
        scheduler.shutdown().await;
        assert!(scheduler.spawn(async {}).await.is_err());
    }

    #[tokio::test]
    async fn with_timeout_reports_backend_timeout() {
        let result = Scheduler::with_timeout(
            "evaluate",
            Duration::from_millis(10),
            tokio::time::sleep(Duration::from_secs(10)),
        )
        .await;

        assert!(matches!(result, Err(DapperError::BackendTimeout { .. })));
    }

    #[tokio::test]
    async fn with_timeout_passes_through_fast_results() {
        let result = Scheduler::with_timeout("noop", Duration::from_secs(1), async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn spawn_threadsafe_tracks_background_task() {
        let scheduler = Scheduler::new();
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        scheduler.spawn_threadsafe(async move { ran2.store(true, Ordering::SeqCst) }).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
