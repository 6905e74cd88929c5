//! Blocking bridge.
//!
//! Lets async callers run blocking store calls without stalling their
//! scheduler. A single dedicated worker thread takes jobs from a bounded
//! queue and runs them one at a time, in submission order; each caller
//! awaits a oneshot carrying its job's result.
//!
//! ## Cancellation
//!
//! Dropping the awaiting future does not cancel a submitted job. The job
//! still runs to completion on the worker and its result is discarded when
//! the oneshot receiver is gone. A job that panics is caught so the worker
//! keeps serving; its caller observes [`LayerError::Cancelled`].
//!
//! ## Ordering
//!
//! Jobs from different callers complete in submission order, not in the
//! order their underlying calls would finish on their own. A receive that
//! blocks on an empty channel delays every job queued behind it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, oneshot};

use crate::store::lock_ignore_poison;
use crate::{LayerError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct BlockingBridge {
    // ---
    jobs: Mutex<Option<mpsc::Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BlockingBridge {
    /// Start the worker thread with a job queue of `depth` slots.
    pub fn start(name: &str, depth: usize) -> Result<Self> {
        // ---
        let (tx, mut rx) = mpsc::channel::<Job>(depth);

        let worker = thread::Builder::new()
            .name(format!("{name}-bridge"))
            .spawn(move || {
                crate::log_debug!("bridge worker started");
                while let Some(job) = rx.blocking_recv() {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        crate::log_error!("bridge job panicked; worker continues");
                    }
                }
                crate::log_debug!("bridge worker stopped");
            })?;

        Ok(Self {
            jobs: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Run `f` on the worker and await its result.
    ///
    /// Fails with `LayerClosed` after [`shutdown`](Self::shutdown), and with
    /// `Cancelled` when the job is dropped without producing a result.
    pub async fn run_blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        // ---
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            // receiver may be gone if the caller stopped waiting
            let _ = tx.send(f());
        });

        let jobs = lock_ignore_poison(&self.jobs).clone();
        let jobs = jobs.ok_or(LayerError::LayerClosed)?;
        jobs.send(job).await.map_err(|_| LayerError::LayerClosed)?;

        rx.await.map_err(|_| LayerError::Cancelled)?
    }

    /// Stop accepting jobs, let queued ones finish, and join the worker.
    ///
    /// Idempotent. The join happens on tokio's blocking pool.
    pub async fn shutdown(&self) {
        // ---
        lock_ignore_poison(&self.jobs).take();

        let worker = lock_ignore_poison(&self.worker).take();
        if let Some(worker) = worker {
            let joined = tokio::task::spawn_blocking(move || worker.join()).await;
            if !matches!(joined, Ok(Ok(()))) {
                crate::log_warn!("bridge worker did not stop cleanly");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn test_returns_job_result() {
        // ---
        let bridge = BlockingBridge::start("test", 4).unwrap();
        let out = bridge.run_blocking(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(out, 42);
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_propagates_job_error() {
        // ---
        let bridge = BlockingBridge::start("test", 4).unwrap();
        let out: Result<()> = bridge.run_blocking(|| Err(LayerError::Timeout)).await;
        assert!(matches!(out, Err(LayerError::Timeout)));
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_jobs_run_in_submission_order() {
        // ---
        let bridge = Arc::new(BlockingBridge::start("test", 16).unwrap());
        let log = Arc::new(Mutex::new(Vec::new()));

        let calls = (0..8).map(|i| {
            let log = log.clone();
            let bridge = bridge.clone();
            async move {
                bridge
                    .run_blocking(move || {
                        log.lock().unwrap().push(i);
                        Ok(())
                    })
                    .await
            }
        });
        for out in futures::future::join_all(calls).await {
            out.unwrap();
        }

        assert_eq!(*log.lock().unwrap(), (0..8).collect::<Vec<_>>());
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_kill_worker() {
        // ---
        let bridge = BlockingBridge::start("test", 4).unwrap();
        let out: Result<()> = bridge.run_blocking(|| panic!("boom")).await;
        assert!(matches!(out, Err(LayerError::Cancelled)));

        assert_eq!(bridge.run_blocking(|| Ok("alive")).await.unwrap(), "alive");
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_abandoned_call_still_runs() {
        // ---
        let bridge = BlockingBridge::start("test", 4).unwrap();
        let ran = Arc::new(Mutex::new(false));

        let flag = ran.clone();
        let slow = bridge.run_blocking(move || {
            std::thread::sleep(Duration::from_millis(30));
            *flag.lock().unwrap() = true;
            Ok(())
        });
        // poll once so the job is submitted, then give up on it
        let _ = tokio::time::timeout(Duration::from_millis(5), slow).await;

        bridge.run_blocking(|| Ok(())).await.unwrap();
        assert!(*ran.lock().unwrap());
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejects_after_shutdown() {
        // ---
        let bridge = BlockingBridge::start("test", 4).unwrap();
        bridge.shutdown().await;
        bridge.shutdown().await;

        let out = bridge.run_blocking(|| Ok(())).await;
        assert!(matches!(out, Err(LayerError::LayerClosed)));
    }
}
