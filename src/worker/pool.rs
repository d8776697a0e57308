//! Bounded worker pool for parameter operations
//!
//! - Fixed set of worker tasks pulling from one bounded queue
//! - Each job runs on the blocking thread pool (SQLite is synchronous)
//! - Callers get a `TaskHandle` and wait on it with a deadline
//!
//! A job whose caller gave up is skipped if it has not started yet. If it
//! is already running, the deadline it carries makes the enclosing
//! transaction roll back instead of committing late.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use super::deadline;
use crate::config::Config;
use crate::error::{ParamError, Result};

type Job = Box<dyn FnOnce(Instant) + Send + 'static>;

/// Request sent to the worker pool
struct PoolRequest {
    /// Operation name, for logs
    label: &'static str,
    deadline: Instant,
    job: Job,
}

/// Configuration for the worker pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker tasks
    pub worker_count: usize,
    /// Per-operation timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Maximum queued (and running) operations
    pub max_queue_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 10,
            request_timeout_ms: 30000,
            max_queue_size: 256,
        }
    }
}

impl From<&Config> for PoolConfig {
    fn from(config: &Config) -> Self {
        Self {
            worker_count: config.effective_workers(),
            request_timeout_ms: config.request_timeout_ms,
            max_queue_size: config.max_queue_size.max(1),
        }
    }
}

/// Pending result of a submitted operation
pub struct TaskHandle<T> {
    label: &'static str,
    deadline: Instant,
    response_rx: oneshot::Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Wait for the result, failing with `Timeout` at the deadline
    pub async fn join(self) -> Result<T> {
        match tokio::time::timeout_at(self.deadline.into(), self.response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ParamError::Internal(format!(
                "{}: response channel closed",
                self.label
            ))),
            Err(_) => {
                warn!(operation = self.label, "Operation timed out");
                Err(ParamError::Timeout(format!("{} did not finish in time", self.label)))
            }
        }
    }
}

/// In-process pool executing one operation per job
pub struct WorkerPool {
    request_tx: mpsc::Sender<PoolRequest>,
    /// Limits queued plus running jobs
    semaphore: Arc<Semaphore>,
    timeout: Duration,
    busy_workers: Arc<AtomicUsize>,
    worker_count: usize,
}

impl WorkerPool {
    /// Create and start a new worker pool; must be called inside a runtime
    pub fn new(config: PoolConfig) -> Self {
        let worker_count = config.worker_count.max(1);
        let max_queue_size = config.max_queue_size.max(1);

        let (request_tx, request_rx) = mpsc::channel::<PoolRequest>(max_queue_size);
        let request_rx = Arc::new(tokio::sync::Mutex::new(request_rx));
        let busy_workers = Arc::new(AtomicUsize::new(0));

        for i in 0..worker_count {
            let request_rx = Arc::clone(&request_rx);
            let busy_workers = Arc::clone(&busy_workers);
            tokio::spawn(async move {
                worker_task(i, request_rx, busy_workers).await;
            });
        }

        info!(
            workers = worker_count,
            queue = max_queue_size,
            timeout_ms = config.request_timeout_ms,
            "Worker pool started"
        );

        Self {
            request_tx,
            semaphore: Arc::new(Semaphore::new(max_queue_size)),
            timeout: Duration::from_millis(config.request_timeout_ms),
            busy_workers,
            worker_count,
        }
    }

    /// Queue `f` and return a handle to its result
    ///
    /// Waits while the queue is full. The deadline starts now, so time
    /// spent queued counts against the timeout.
    pub async fn submit<T, F>(&self, label: &'static str, f: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let deadline = Instant::now() + self.timeout;

        let permit: OwnedSemaphorePermit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ParamError::PoolClosed)?;

        let (response_tx, response_rx) = oneshot::channel();

        let job: Job = Box::new(move |deadline| {
            let _permit = permit;
            if response_tx.is_closed() {
                debug!(operation = label, "Caller went away, skipping");
                return;
            }
            if Instant::now() >= deadline {
                let _ = response_tx.send(Err(ParamError::Timeout(format!(
                    "{} expired while queued",
                    label
                ))));
                return;
            }
            let result = deadline::scoped(deadline, f);
            let _ = response_tx.send(result);
        });

        self.request_tx
            .send(PoolRequest { label, deadline, job })
            .await
            .map_err(|_| ParamError::PoolClosed)?;

        Ok(TaskHandle { label, deadline, response_rx })
    }

    /// Submit and wait
    pub async fn run<T, F>(&self, label: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        self.submit(label, f).await?.join().await
    }

    /// Refuse new submissions; queued jobs still run
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Free queue slots
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Workers currently executing a job
    pub fn busy_count(&self) -> usize {
        self.busy_workers.load(Ordering::Relaxed)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }
}

async fn worker_task(
    worker_id: usize,
    request_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<PoolRequest>>>,
    busy_workers: Arc<AtomicUsize>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        let request = {
            let mut rx = request_rx.lock().await;
            match rx.recv().await {
                Some(r) => r,
                None => {
                    debug!("Worker {} shutting down (channel closed)", worker_id);
                    return;
                }
            }
        };

        let PoolRequest { label, deadline, job } = request;
        debug!(worker = worker_id, operation = label, "Processing");

        busy_workers.fetch_add(1, Ordering::Relaxed);
        let outcome = tokio::task::spawn_blocking(move || job(deadline)).await;
        busy_workers.fetch_sub(1, Ordering::Relaxed);

        if let Err(e) = outcome {
            // The job's sender is dropped with it, so the caller sees a closed channel
            error!(worker = worker_id, operation = label, "Job panicked: {}", e);
        }
    }
}
