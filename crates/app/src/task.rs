//! Task: a cancellable, sequential run of a scene's operations.
//!
//! A [`Task`] is created with its operation list, started once with
//! [`Task::run_async`] on an [`Executor`], and may be asked to stop at any
//! time with [`Task::stop`]. Stopping is cooperative: the operation that is
//! in flight is dropped at its next suspension point and no later operation
//! starts. Failures are logged here and reported through [`TaskOutcome`];
//! they never escape to whoever started the task.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::{oneshot, watch};

use trigger_domain::id::TaskId;

use crate::ports::{Executor, OperationRef};

/// Lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, not started yet.
    Pending,
    Running,
    Completed,
    /// Stopped on request before finishing.
    Stopped,
    /// An operation returned an error.
    Failed,
}

impl TaskStatus {
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(text)
    }
}

/// How a task run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Stopped,
    Failed { operation: String, error: String },
    /// The run never reported back (not started, or its job was dropped).
    Aborted,
}

/// Snapshot of a task for observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub scene: String,
    pub status: TaskStatus,
}

/// Awaitable completion of a started task.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    done: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Wait until the task has finished running.
    pub async fn wait(self) -> TaskOutcome {
        self.done.await.unwrap_or(TaskOutcome::Aborted)
    }
}

pub struct Task {
    id: TaskId,
    scene: String,
    operations: Mutex<Option<Vec<OperationRef>>>,
    status: Arc<Mutex<TaskStatus>>,
    stop: watch::Sender<bool>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("scene", &self.scene)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Task {
    #[must_use]
    pub fn new(scene: impl Into<String>, operations: Vec<OperationRef>) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            id: TaskId::new(),
            scene: scene.into(),
            operations: Mutex::new(Some(operations)),
            status: Arc::new(Mutex::new(TaskStatus::Pending)),
            stop,
        }
    }

    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    #[must_use]
    pub fn scene(&self) -> &str {
        &self.scene
    }

    #[must_use]
    pub fn status(&self) -> TaskStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id,
            scene: self.scene.clone(),
            status: self.status(),
        }
    }

    /// Start running the operations on `executor`.
    ///
    /// A task runs at most once; calling this again returns a handle that
    /// resolves to [`TaskOutcome::Aborted`].
    pub fn run_async(&self, executor: &dyn Executor) -> TaskHandle {
        let (done_tx, done) = oneshot::channel();
        let handle = TaskHandle { id: self.id, done };

        let Some(operations) = self
            .operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            tracing::warn!(task = %self.id, scene = %self.scene, "task already started");
            return handle;
        };

        let runner = Runner {
            id: self.id,
            scene: self.scene.clone(),
            status: Arc::clone(&self.status),
            stop: self.stop.subscribe(),
        };
        executor.spawn(Box::pin(async move {
            let outcome = runner.run(operations).await;
            let _ = done_tx.send(outcome);
        }));
        handle
    }

    /// Ask the task to stop. Returns immediately.
    pub fn stop(&self) {
        self.stop.send_replace(true);
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if *status == TaskStatus::Pending {
            *status = TaskStatus::Stopped;
        }
    }
}

struct Runner {
    id: TaskId,
    scene: String,
    status: Arc<Mutex<TaskStatus>>,
    stop: watch::Receiver<bool>,
}

impl Runner {
    fn set_status(&self, status: TaskStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    async fn run(mut self, operations: Vec<OperationRef>) -> TaskOutcome {
        if *self.stop.borrow() {
            self.set_status(TaskStatus::Stopped);
            return TaskOutcome::Stopped;
        }
        self.set_status(TaskStatus::Running);
        tracing::debug!(task = %self.id, scene = %self.scene, operations = operations.len(), "task started");

        for operation in &operations {
            let result = tokio::select! {
                biased;
                () = stop_requested(&mut self.stop) => None,
                result = operation.execute() => Some(result),
            };
            match result {
                None => {
                    self.set_status(TaskStatus::Stopped);
                    tracing::debug!(task = %self.id, scene = %self.scene, "task stopped");
                    return TaskOutcome::Stopped;
                }
                Some(Err(err)) => {
                    self.set_status(TaskStatus::Failed);
                    tracing::warn!(
                        task = %self.id,
                        scene = %self.scene,
                        operation = operation.name(),
                        %err,
                        "operation failed"
                    );
                    return TaskOutcome::Failed {
                        operation: operation.name().to_string(),
                        error: err.to_string(),
                    };
                }
                Some(Ok(())) => {}
            }
        }

        self.set_status(TaskStatus::Completed);
        tracing::debug!(task = %self.id, scene = %self.scene, "task completed");
        TaskOutcome::Completed
    }
}

/// Resolves once a stop is requested. A dropped sender is not a request.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let result = stop.wait_for(|requested| *requested).await.map(|_| ());
    if result.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TokioExecutor;
    use crate::testing::{Blocking, Failing, Recording, wait_until};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[tokio::test]
    async fn should_run_operations_in_order() {
        let executor = TokioExecutor::current(2);
        let log = Recording::log();
        let task = Task::new(
            "combo",
            vec![Recording::op("first", &log), Recording::op("second", &log)],
        );

        let outcome = task.run_async(&executor).wait().await;

        assert_eq!(outcome, TaskOutcome::Completed);
        assert_eq!(Recording::entries(&log), vec!["first", "second"]);
        assert_eq!(task.status(), TaskStatus::Completed);
    }

    #[tokio::test]
    async fn should_stop_at_first_failing_operation() {
        let executor = TokioExecutor::current(2);
        let log = Recording::log();
        let task = Task::new(
            "combo",
            vec![
                Recording::op("first", &log),
                Failing::op("broken"),
                Recording::op("never", &log),
            ],
        );

        let outcome = task.run_async(&executor).wait().await;

        assert_eq!(
            outcome,
            TaskOutcome::Failed {
                operation: "broken".to_string(),
                error: "operation failed: boom".to_string(),
            }
        );
        assert_eq!(Recording::entries(&log), vec!["first"]);
        assert_eq!(task.status(), TaskStatus::Failed);
    }

    #[tokio::test]
    async fn should_cancel_running_operation_on_stop() {
        let executor = TokioExecutor::current(2);
        let blocking = Blocking::default();
        let task = Task::new("idle", vec![blocking.op()]);

        let handle = task.run_async(&executor);
        wait_until(|| blocking.started.load(Ordering::SeqCst) == 1).await;
        assert_eq!(task.status(), TaskStatus::Running);

        task.stop();
        let outcome = tokio::time::timeout(Duration::from_secs(1), handle.wait())
            .await
            .unwrap();

        assert_eq!(outcome, TaskOutcome::Stopped);
        assert_eq!(blocking.cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(task.status(), TaskStatus::Stopped);
    }

    #[tokio::test]
    async fn should_not_run_anything_when_stopped_before_start() {
        let executor = TokioExecutor::current(2);
        let log = Recording::log();
        let task = Task::new("combo", vec![Recording::op("first", &log)]);

        task.stop();
        assert_eq!(task.status(), TaskStatus::Stopped);
        assert!(*task.stop.borrow());

        let outcome = task.run_async(&executor).wait().await;
        assert_eq!(outcome, TaskOutcome::Stopped);
        assert!(Recording::entries(&log).is_empty());
    }

    #[tokio::test]
    async fn should_run_only_once() {
        let executor = TokioExecutor::current(2);
        let log = Recording::log();
        let task = Task::new("combo", vec![Recording::op("first", &log)]);

        let first = task.run_async(&executor);
        let second = task.run_async(&executor);

        assert_eq!(second.wait().await, TaskOutcome::Aborted);
        assert_eq!(first.wait().await, TaskOutcome::Completed);
        assert_eq!(Recording::entries(&log), vec!["first"]);
    }

    #[test]
    fn should_report_pending_info_before_start() {
        let task = Task::new("combo", Vec::new());
        let info = task.info();
        assert_eq!(info.id, task.id());
        assert_eq!(info.scene, "combo");
        assert_eq!(info.status, TaskStatus::Pending);
        assert!(!info.status.is_finished());
    }
}
