//! Tokio-backed [`Executor`] with a bounded number of concurrent jobs.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;

use crate::ports::{BoxFuture, Executor};

/// Runs jobs on a tokio runtime, at most `max_workers` at a time.
///
/// Jobs beyond the limit are spawned immediately but wait for a permit
/// before their body runs. Each dispatcher gets its own pool.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
    permits: Arc<Semaphore>,
    max_workers: usize,
}

impl TokioExecutor {
    /// Create a pool on `handle`. `max_workers` is raised to at least 1.
    #[must_use]
    pub fn new(handle: Handle, max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            handle,
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    /// Create a pool on the runtime the caller is running in.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn current(max_workers: usize) -> Self {
        Self::new(Handle::current(), max_workers)
    }

    #[must_use]
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

}

impl Executor for TokioExecutor {
    fn spawn(&self, job: BoxFuture<'static, ()>) {
        let permits = Arc::clone(&self.permits);
        self.handle.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::debug!("executor closed, dropping job");
                return;
            };
            job.await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn should_cap_concurrent_jobs() {
        let executor = TokioExecutor::current(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let done = Arc::clone(&done);
            executor.spawn(Box::pin(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }

        for _ in 0..100 {
            if done.load(Ordering::SeqCst) == 6 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(done.load(Ordering::SeqCst), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(executor.permits.available_permits(), 2);
    }

    #[tokio::test]
    async fn should_drop_jobs_when_permits_are_closed() {
        let executor = TokioExecutor::current(1);
        executor.permits.close();
        let ran = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&ran);
        executor.spawn(Box::pin(async move {
            inner.fetch_add(1, Ordering::SeqCst);
        }));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn should_raise_zero_workers_to_one() {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let executor = TokioExecutor::new(runtime.handle().clone(), 0);
        assert_eq!(executor.max_workers(), 1);
    }
}
