//! In-memory operations shared by the crate's tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use trigger_domain::error::OperationError;

use crate::ports::{BoxFuture, Operation, OperationRef};

pub type Log = Arc<Mutex<Vec<String>>>;

/// Appends its name to a shared log.
#[derive(Debug)]
pub struct Recording {
    name: String,
    log: Log,
}

impl Recording {
    pub fn log() -> Log {
        Arc::default()
    }

    pub fn op(name: &str, log: &Log) -> OperationRef {
        Arc::new(Self {
            name: name.to_string(),
            log: Arc::clone(log),
        })
    }

    pub fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }
}

impl Operation for Recording {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> BoxFuture<'_, Result<(), OperationError>> {
        Box::pin(async move {
            self.log.lock().unwrap().push(self.name.clone());
            Ok(())
        })
    }
}

/// Always fails with `"boom"`.
#[derive(Debug)]
pub struct Failing {
    name: String,
}

impl Failing {
    pub fn op(name: &str) -> OperationRef {
        Arc::new(Self {
            name: name.to_string(),
        })
    }
}

impl Operation for Failing {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> BoxFuture<'_, Result<(), OperationError>> {
        Box::pin(async { Err(OperationError::Failed("boom".to_string())) })
    }
}

/// Never finishes; counts how often it was started and how often the
/// running future was dropped.
#[derive(Debug, Default, Clone)]
pub struct Blocking {
    pub started: Arc<AtomicUsize>,
    pub cancelled: Arc<AtomicUsize>,
}

struct CancelGuard(Arc<AtomicUsize>);

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl Blocking {
    pub fn op(&self) -> OperationRef {
        Arc::new(self.clone())
    }

    pub fn running(&self) -> usize {
        self.started
            .load(Ordering::SeqCst)
            .saturating_sub(self.cancelled.load(Ordering::SeqCst))
    }
}

impl Operation for Blocking {
    fn name(&self) -> &str {
        "blocking"
    }

    fn execute(&self) -> BoxFuture<'_, Result<(), OperationError>> {
        Box::pin(async move {
            self.started.fetch_add(1, Ordering::SeqCst);
            let _guard = CancelGuard(Arc::clone(&self.cancelled));
            std::future::pending::<()>().await;
            Ok(())
        })
    }
}

/// Poll `condition` until it holds, for at most two seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(condition(), "condition not reached in time");
}
