//! The serial keychain queue.
//!
//! Every vault call runs on one dedicated worker thread, in submission
//! order. Callers block (or await) until their job has run, so two vault
//! calls submitted through the same queue never overlap.
//!
//! Before the process goes away, call [`KeychainQueue::barrier`] so no
//! write is still in flight.
//!
//! The blocking calls work from plain threads and from multi-thread tokio
//! runtimes. On a current-thread runtime they return
//! [`Error::BlockingInRuntime`] without running the job.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{mpsc, oneshot};
use tokio::task;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// Thread name of the process-wide queue.
pub const SHARED_QUEUE_NAME: &str = "lockbox-keychain";

static SHARED: OnceLock<Arc<KeychainQueue>> = OnceLock::new();

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Single-worker FIFO executor for vault calls.
pub struct KeychainQueue {
    name: String,
    tx: mpsc::UnboundedSender<Job>,
    worker: ThreadId,
}

impl KeychainQueue {
    /// Start a new queue with its own worker thread.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel::<Job>();

        let worker_name = name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || Self::drain(worker_name, rx))?;

        Ok(Self {
            name,
            tx,
            worker: handle.thread().id(),
        })
    }

    /// The process-wide queue, started on first use.
    pub fn shared() -> Result<Arc<KeychainQueue>> {
        if let Some(queue) = SHARED.get() {
            return Ok(queue.clone());
        }
        // A racing loser's queue is dropped and its worker exits
        let queue = Arc::new(Self::new(SHARED_QUEUE_NAME)?);
        Ok(SHARED.get_or_init(|| queue).clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn drain(name: String, mut rx: mpsc::UnboundedReceiver<Job>) {
        info!("Keychain queue {} started", name);

        while let Some(job) = rx.blocking_recv() {
            // Keep the queue alive if one job panics; its caller sees QueueClosed
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                error!("Job on keychain queue {} panicked", name);
            }
        }

        info!("Keychain queue {} stopped", name);
    }

    fn on_worker(&self) -> bool {
        thread::current().id() == self.worker
    }

    fn submit<T, F>(&self, job: F) -> Result<oneshot::Receiver<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Box::new(move || {
                // The caller may have given up waiting
                let _ = reply_tx.send(job());
            }))
            .map_err(|_| {
                error!("Keychain queue {} is closed", self.name);
                Error::QueueClosed
            })?;
        Ok(reply_rx)
    }

    /// Run `job` on the queue and block until it returns.
    ///
    /// Inside a multi-thread runtime the wait goes through
    /// `block_in_place`. A current-thread runtime cannot give up its only
    /// thread, so there the job is not submitted and the call fails with
    /// [`Error::BlockingInRuntime`]; use [`run_async`](Self::run_async)
    /// instead. Calling it from a job already running on this queue runs the
    /// nested job inline instead of deadlocking.
    pub fn run<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.on_worker() {
            return Ok(job());
        }

        match Handle::try_current() {
            Err(_) => self.submit(job)?.blocking_recv().map_err(|_| Error::QueueClosed),
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                let reply = self.submit(job)?;
                task::block_in_place(move || reply.blocking_recv())
                    .map_err(|_| Error::QueueClosed)
            }
            Ok(_) => {
                warn!(
                    "Blocking call on keychain queue {} from a current-thread runtime",
                    self.name
                );
                Err(Error::BlockingInRuntime)
            }
        }
    }

    /// Run `job` on the queue and wait for it without blocking the thread.
    pub async fn run_async<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.on_worker() {
            return Ok(job());
        }
        self.submit(job)?.await.map_err(|_| Error::QueueClosed)
    }

    /// Block until every job submitted before this call has finished.
    pub fn barrier(&self) -> Result<()> {
        debug!("Barrier on keychain queue {}", self.name);
        self.run(|| ())
    }

    /// Async form of [`barrier`](Self::barrier).
    pub async fn barrier_async(&self) -> Result<()> {
        self.run_async(|| ()).await
    }
}

impl std::fmt::Debug for KeychainQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeychainQueue")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn test_run_returns_job_result() {
        let queue = KeychainQueue::new("test-run").unwrap();
        assert_eq!(queue.run(|| 40 + 2).unwrap(), 42);
    }

    #[test]
    fn test_jobs_run_on_worker_thread() {
        let queue = KeychainQueue::new("test-worker-thread").unwrap();
        let name = queue
            .run(|| thread::current().name().map(str::to_string))
            .unwrap();
        assert_eq!(name.as_deref(), Some("test-worker-thread"));
    }

    #[test]
    fn test_jobs_never_overlap() {
        let queue = Arc::new(KeychainQueue::new("test-overlap").unwrap());
        let active = Arc::new(Mutex::new(0usize));
        let max_seen = Arc::new(Mutex::new(0usize));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = queue.clone();
                let active = active.clone();
                let max_seen = max_seen.clone();
                thread::spawn(move || {
                    queue
                        .run(move || {
                            {
                                let mut a = active.lock().unwrap();
                                *a += 1;
                                let mut m = max_seen.lock().unwrap();
                                *m = (*m).max(*a);
                            }
                            thread::sleep(Duration::from_millis(5));
                            *active.lock().unwrap() -= 1;
                        })
                        .unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*max_seen.lock().unwrap(), 1);
    }

    #[test]
    fn test_nested_run_does_not_deadlock() {
        let queue = Arc::new(KeychainQueue::new("test-nested").unwrap());
        let inner = queue.clone();
        let value = queue.run(move || inner.run(|| 7).unwrap()).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_panicking_job_keeps_queue_alive() {
        let queue = KeychainQueue::new("test-panic").unwrap();
        let result = queue.run(|| -> u8 { panic!("boom") });
        assert!(matches!(result, Err(Error::QueueClosed)));
        assert_eq!(queue.run(|| 1u8).unwrap(), 1);
    }

    #[test]
    fn test_barrier_waits_for_earlier_jobs() {
        let queue = Arc::new(KeychainQueue::new("test-barrier").unwrap());
        let done = Arc::new(Mutex::new(false));
        let (started_tx, started_rx) = std::sync::mpsc::channel();

        let writer = {
            let queue = queue.clone();
            let done = done.clone();
            thread::spawn(move || {
                queue
                    .run(move || {
                        started_tx.send(()).unwrap();
                        thread::sleep(Duration::from_millis(20));
                        *done.lock().unwrap() = true;
                    })
                    .unwrap();
            })
        };

        // The writer's job is running before the barrier is queued
        started_rx.recv().unwrap();
        queue.barrier().unwrap();
        assert!(*done.lock().unwrap());
        writer.join().unwrap();
    }

    #[test]
    fn test_shared_queue_is_singleton() {
        let a = KeychainQueue::shared().unwrap();
        let b = KeychainQueue::shared().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), SHARED_QUEUE_NAME);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_blocking_run_inside_multi_thread_runtime() {
        let queue = KeychainQueue::new("test-multi-thread").unwrap();
        assert_eq!(queue.run(|| 5).unwrap(), 5);
        queue.barrier().unwrap();
    }

    #[tokio::test]
    async fn test_blocking_run_inside_current_thread_runtime_fails() {
        let queue = KeychainQueue::new("test-current-thread").unwrap();
        let ran = Arc::new(Mutex::new(false));

        let flag = ran.clone();
        let result = queue.run(move || *flag.lock().unwrap() = true);
        assert!(matches!(result, Err(Error::BlockingInRuntime)));

        // The job was never queued
        queue.barrier_async().await.unwrap();
        assert!(!*ran.lock().unwrap());
    }

    #[tokio::test]
    async fn test_run_async() {
        let queue = KeychainQueue::new("test-async").unwrap();
        assert_eq!(queue.run_async(|| "done").await.unwrap(), "done");
        queue.barrier_async().await.unwrap();
    }
}
