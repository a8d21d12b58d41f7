//! Executor port: the worker pool every background job runs on.
//!
//! Injected per dispatcher so that several dispatchers in one process do
//! not share a hidden global pool.

use std::future::Future;
use std::pin::Pin;

/// An owned, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Runs detached jobs.
pub trait Executor: Send + Sync {
    /// Schedule `job`. It may start later if the pool is saturated.
    fn spawn(&self, job: BoxFuture<'static, ()>);
}
