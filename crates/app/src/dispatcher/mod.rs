//! Trigger dispatcher: decides when to start, preempt or leave alone the
//! single current task.
//!
//! Two paths feed the dispatcher:
//!
//! - **events**: every state event whose id belongs to a scene is handed to
//!   the executor, which runs [`TriggerDispatcher::handle_trigger`]. A scene
//!   whose condition holds and whose cooldown has elapsed replaces the
//!   current task, stopping it first.
//! - **polling**: if one scene has no trigger states, a long-lived loop on
//!   the executor evaluates it repeatedly. The loop starts a task only when
//!   nothing is running, waits for that task, and backs off while any event
//!   evaluation is in flight.
//!
//! Both paths mutate the current task and the cooldown bookkeeping under a
//! single mutex, so at most one task is ever current.

mod config;
mod table;

pub use config::{DispatcherConfig, MIN_WORKERS};

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;

use trigger_domain::error::{ConfigError, TriggerError};
use trigger_domain::event::StateEvent;
use trigger_domain::id::{ListenerOwner, TaskId};
use trigger_domain::scene::SceneConfig;
use trigger_domain::state::StateLookup;
use trigger_domain::time::{Timestamp, elapsed_between};

use crate::clock::SystemClock;
use crate::executor::TokioExecutor;
use crate::ports::{
    ActionResolver, Clock, EventCallback, EventSource, Executor, OperationRef,
    SceneTemplateGetter,
};
use crate::task::{Task, TaskHandle, TaskInfo};

use self::table::SceneTable;

/// Cooldown key of the continuous scene.
const CONTINUOUS_KEY: &str = "";

/// Where the dispatcher is in its life.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    #[default]
    Uninitialized,
    Initialized,
    Running,
    Stopped,
    /// Terminal.
    Disposed,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Disposed => "disposed",
        };
        f.write_str(text)
    }
}

/// What one event trigger led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The dispatcher does not accept triggers right now.
    NotRunning,
    /// No scene listens for this event id.
    UnknownEvent,
    /// The scene started a task less than its cooldown ago.
    CoolingDown,
    /// The scene's condition does not hold.
    ConditionFalse,
    /// A new task became current.
    Started(TaskId),
}

/// Runs scenes in response to state events and polling, keeping at most
/// one task current.
pub struct TriggerDispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    executor: Arc<dyn Executor>,
    clock: Arc<dyn Clock>,
    config: DispatcherConfig,
    owner: ListenerOwner,
    /// Event evaluations queued or running; the poll loop yields while
    /// non-zero.
    pending_triggers: AtomicUsize,
    /// Bumped on each start so a poll loop from an earlier run exits.
    generation: AtomicU64,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    lifecycle: Lifecycle,
    table: Option<SceneTable>,
    bus: Option<Arc<dyn EventSource>>,
    current: Option<Task>,
    last_trigger_time: HashMap<String, Timestamp>,
}

impl State {
    fn cooldown_remaining(&self, key: &str, cooldown: Duration, now: Timestamp) -> Option<Duration> {
        let last = self.last_trigger_time.get(key)?;
        let elapsed = elapsed_between(*last, now);
        (elapsed < cooldown).then(|| cooldown - elapsed)
    }

    fn is_busy(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|task| !task.status().is_finished())
    }

    /// Stop the current task, if any, and install a new one.
    fn start_task(
        &mut self,
        key: &str,
        scene: &str,
        operations: Vec<OperationRef>,
        now: Timestamp,
        executor: &dyn Executor,
    ) -> TaskHandle {
        if let Some(previous) = self.current.take() {
            if !previous.status().is_finished() {
                tracing::debug!(task = %previous.id(), scene = previous.scene(), "preempting current task");
            }
            previous.stop();
        }
        let task = Task::new(scene, operations);
        let handle = task.run_async(executor);
        self.last_trigger_time.insert(key.to_string(), now);
        self.current = Some(task);
        handle
    }
}

enum PollStep {
    Exit,
    Wait(Duration),
    Idle,
    Started(TaskHandle),
}

/// Counts an event evaluation from the moment it is queued until its job
/// finishes or is dropped.
struct PendingGuard {
    inner: Arc<Inner>,
}

impl PendingGuard {
    fn new(inner: Arc<Inner>) -> Self {
        inner.pending_triggers.fetch_add(1, Ordering::AcqRel);
        Self { inner }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.inner.pending_triggers.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_trigger(&self, event_id: &str) -> TriggerOutcome {
        let mut state = self.lock();
        if state.lifecycle != Lifecycle::Running {
            tracing::warn!(event_id, lifecycle = %state.lifecycle, "trigger dropped, dispatcher not running");
            return TriggerOutcome::NotRunning;
        }

        let now = self.clock.now();
        let (scene, operations) = {
            let Some(scene) = state.table.as_ref().and_then(|table| table.scene_for(event_id))
            else {
                tracing::debug!(event_id, "no scene listens for event");
                return TriggerOutcome::UnknownEvent;
            };
            if let Some(remaining) = state.cooldown_remaining(event_id, scene.cooldown(), now) {
                tracing::debug!(event_id, scene = scene.name(), ?remaining, "trigger debounced");
                return TriggerOutcome::CoolingDown;
            }
            let Some(operations) = scene.get_operations(now) else {
                tracing::debug!(event_id, scene = scene.name(), "condition not met");
                return TriggerOutcome::ConditionFalse;
            };
            (scene.name().to_string(), operations)
        };

        let handle = state.start_task(event_id, &scene, operations, now, self.executor.as_ref());
        tracing::debug!(event_id, scene = %scene, task = %handle.id(), "task started");
        TriggerOutcome::Started(handle.id())
    }

    /// Queue an evaluation of `event_id` on the executor.
    fn enqueue_trigger(self: &Arc<Self>, event_id: String) {
        let guard = PendingGuard::new(Arc::clone(self));
        self.executor.spawn(Box::pin(async move {
            guard.inner.handle_trigger(&event_id);
        }));
    }

    fn poll_continuous(&self, generation: u64) -> PollStep {
        let mut state = self.lock();
        if state.lifecycle != Lifecycle::Running
            || self.generation.load(Ordering::Acquire) != generation
        {
            return PollStep::Exit;
        }
        if state.is_busy() {
            return PollStep::Idle;
        }

        let now = self.clock.now();
        let (scene, operations) = {
            let Some(scene) = state.table.as_ref().and_then(SceneTable::continuous) else {
                return PollStep::Exit;
            };
            if let Some(remaining) = state.cooldown_remaining(CONTINUOUS_KEY, scene.cooldown(), now) {
                return PollStep::Wait(remaining);
            }
            let Some(operations) = scene.get_operations(now) else {
                return PollStep::Idle;
            };
            (scene.name().to_string(), operations)
        };

        let handle = state.start_task(CONTINUOUS_KEY, &scene, operations, now, self.executor.as_ref());
        tracing::debug!(scene = %scene, task = %handle.id(), "continuous task started");
        PollStep::Started(handle)
    }

    async fn poll_loop(self: Arc<Self>, generation: u64) {
        tracing::debug!(generation, "poll loop started");
        loop {
            if self.pending_triggers.load(Ordering::Acquire) > 0 {
                tokio::time::sleep(self.config.backoff()).await;
                continue;
            }
            match self.poll_continuous(generation) {
                PollStep::Exit => break,
                PollStep::Wait(remaining) => {
                    tokio::time::sleep(remaining.min(self.config.poll_interval())).await;
                }
                PollStep::Idle => tokio::time::sleep(self.config.poll_interval()).await,
                PollStep::Started(handle) => {
                    let task = handle.id();
                    let outcome = handle.wait().await;
                    tracing::debug!(%task, ?outcome, "continuous task finished");
                }
            }
        }
        tracing::debug!(generation, "poll loop exited");
    }

    /// Leave the running state. Returns whether anything changed.
    fn stop_locked(&self, state: &mut State) -> bool {
        if state.lifecycle != Lifecycle::Running {
            return false;
        }
        state.lifecycle = Lifecycle::Stopped;
        if let Some(bus) = &state.bus {
            bus.unlisten_all(self.owner);
        }
        if let Some(task) = &state.current {
            task.stop();
        }
        true
    }

    fn stop(&self) -> bool {
        let mut state = self.lock();
        self.stop_locked(&mut state)
    }
}

impl TriggerDispatcher {
    /// Dispatcher over the given executor and clock.
    ///
    /// `executor` must run at least [`MIN_WORKERS`] jobs concurrently. With
    /// fewer, the poll loop and the task it waits on can hold every worker
    /// and queued event evaluations never run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `config` does not validate.
    pub fn new(
        executor: Arc<dyn Executor>,
        clock: Arc<dyn Clock>,
        config: DispatcherConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                executor,
                clock,
                config,
                owner: ListenerOwner::new(),
                pending_triggers: AtomicUsize::new(0),
                generation: AtomicU64::new(0),
                state: Mutex::new(State::default()),
            }),
        })
    }

    /// Dispatcher on the current tokio runtime, with wall-clock time and a
    /// pool of `config.max_workers`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `config` does not validate or
    /// when called outside a tokio runtime.
    pub fn with_tokio(config: DispatcherConfig) -> Result<Self, ConfigError> {
        let handle = Handle::try_current()
            .map_err(|err| ConfigError::Invalid(format!("no tokio runtime: {err}")))?;
        let executor = TokioExecutor::new(handle, config.max_workers);
        Self::new(Arc::new(executor), Arc::new(SystemClock), config)
    }

    /// Compile `scenes` and reset the dispatcher to use them.
    ///
    /// A running dispatcher is stopped first. The previous scenes are
    /// disposed, which clears the trackers they read. On error the
    /// dispatcher is left as it was.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError`] when a scene fails to compile, when the
    /// scene set is inconsistent, or after [`TriggerDispatcher::dispose`].
    #[tracing::instrument(skip_all, fields(scenes = scenes.len()))]
    pub fn init(
        &self,
        bus: Arc<dyn EventSource>,
        scenes: &[SceneConfig],
        states: &dyn StateLookup,
        resolver: &dyn ActionResolver,
        templates: &dyn SceneTemplateGetter,
    ) -> Result<(), TriggerError> {
        let table = SceneTable::build(scenes, states, resolver, templates)?;

        let mut state = self.inner.lock();
        if state.lifecycle == Lifecycle::Disposed {
            return Err(ConfigError::Disposed.into());
        }
        self.inner.stop_locked(&mut state);
        if let Some(previous) = state.table.take() {
            previous.dispose();
        }

        let compiled = table.len();
        let event_ids = table.event_ids().count();
        let continuous = table.continuous().map(|scene| scene.name().to_string());
        state.table = Some(table);
        state.bus = Some(bus);
        state.current = None;
        state.last_trigger_time.clear();
        state.lifecycle = Lifecycle::Initialized;

        tracing::info!(compiled, event_ids, continuous = ?continuous, "dispatcher initialized");
        Ok(())
    }

    /// Start accepting triggers: listen for every scene's trigger states and
    /// start the poll loop if there is a continuous scene.
    ///
    /// Returns `false` when the dispatcher is not initialized, already
    /// running, or disposed.
    pub fn start_running_async(&self) -> bool {
        let inner = &self.inner;
        let mut state = inner.lock();
        if !matches!(state.lifecycle, Lifecycle::Initialized | Lifecycle::Stopped) {
            tracing::debug!(lifecycle = %state.lifecycle, "start ignored");
            return false;
        }
        let (Some(table), Some(bus)) = (state.table.as_ref(), state.bus.clone()) else {
            return false;
        };

        let weak = Arc::downgrade(inner);
        let callback: EventCallback = Arc::new(move |event: &StateEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.enqueue_trigger(event.event_id.clone());
            }
        });
        let mut listened = 0_usize;
        for event_id in table.event_ids() {
            bus.listen(event_id, inner.owner, Arc::clone(&callback));
            listened += 1;
        }
        let continuous = table.continuous().is_some();

        state.lifecycle = Lifecycle::Running;
        let generation = inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if continuous {
            inner
                .executor
                .spawn(Box::pin(Arc::clone(inner).poll_loop(generation)));
        }

        tracing::info!(listened, continuous, "dispatcher running");
        true
    }

    /// Stop accepting triggers and ask the current task to stop.
    ///
    /// Does not wait for the task to exit.
    pub fn stop_running(&self) {
        if self.inner.stop() {
            tracing::info!("dispatcher stopped");
        }
    }

    /// Stop, then dispose every scene and the trackers they read. Terminal.
    pub fn dispose(&self) {
        let mut state = self.inner.lock();
        if state.lifecycle == Lifecycle::Disposed {
            return;
        }
        self.inner.stop_locked(&mut state);
        if let Some(table) = state.table.take() {
            table.dispose();
        }
        state.bus = None;
        state.lifecycle = Lifecycle::Disposed;
        tracing::info!("dispatcher disposed");
    }

    /// Evaluate the scene listening for `event_id` and start its task if
    /// allowed. Event callbacks run this on the executor.
    pub fn handle_trigger(&self, event_id: &str) -> TriggerOutcome {
        self.inner.handle_trigger(event_id)
    }

    #[must_use]
    pub fn current_task(&self) -> Option<TaskInfo> {
        self.inner.lock().current.as_ref().map(Task::info)
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lock().lifecycle
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lifecycle() == Lifecycle::Running
    }

    /// Event evaluations queued or in progress.
    #[must_use]
    pub fn pending_triggers(&self) -> usize {
        self.inner.pending_triggers.load(Ordering::Acquire)
    }
}

impl fmt::Debug for TriggerDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerDispatcher")
            .field("lifecycle", &self.lifecycle())
            .field("pending_triggers", &self.pending_triggers())
            .finish_non_exhaustive()
    }
}

impl Drop for TriggerDispatcher {
    fn drop(&mut self) {
        self.inner.stop();
    }
}
