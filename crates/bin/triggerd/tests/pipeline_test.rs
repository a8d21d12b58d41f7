//! End-to-end tests for the full triggerd stack.
//!
//! Each test wires a real registry, event bus, executor and dispatcher from
//! a TOML scene file, feeds observation lines the way `main` does, and
//! watches which task is current. A manual clock keeps cooldowns exact.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use trigger_app::clock::ManualClock;
use trigger_app::dispatcher::{Lifecycle, TriggerDispatcher};
use trigger_app::event_bus::InProcessEventBus;
use trigger_app::executor::TokioExecutor;
use trigger_app::task::{TaskInfo, TaskStatus};
use trigger_domain::state::StateRegistry;
use trigger_domain::time::Timestamp;
use triggerd::config::Config;
use triggerd::feed::{FeedOutcome, StateFeeder};
use triggerd::operations::BuiltinResolver;

const SCENES: &str = r#"
    states = ["red", "blue"]

    [dispatcher]
    poll_interval_ms = 10
    backoff_ms = 5

    [[templates]]
    name = "focus"
    operations = [{ type = "log", params = { message = "focusing" } }]

    [[scenes]]
    name = "attack"
    condition = "[red, 0, 1]"
    trigger_states = ["red"]
    cooldown_secs = 1.0
    template = "focus"
    operations = [{ type = "sleep", params = { ms = 60000 } }]

    [[scenes]]
    name = "broken"
    condition = "[blue]"
    trigger_states = ["blue"]
    operations = [{ type = "fail", params = { message = "on purpose" } }]

    [[scenes]]
    name = "idle"
    condition = "![red, 0, 5]"
    cooldown_secs = 0.5
    operations = [{ type = "log", params = { message = "wandering" } }]
"#;

#[allow(clippy::cast_possible_truncation)]
fn t(secs: f64) -> Timestamp {
    DateTime::from_timestamp_millis(1_700_000_000_000 + (secs * 1000.0).round() as i64).unwrap()
}

struct Stack {
    clock: Arc<ManualClock>,
    dispatcher: TriggerDispatcher,
    feeder: StateFeeder<Arc<InProcessEventBus>>,
}

impl Stack {
    fn start() -> Self {
        let config: Config = toml::from_str(SCENES).unwrap();
        let clock = Arc::new(ManualClock::new(t(0.0)));
        let registry = Arc::new(StateRegistry::with_states(config.states.iter().cloned()));
        let bus = Arc::new(InProcessEventBus::new(64));
        let executor = Arc::new(TokioExecutor::current(config.dispatcher.max_workers));

        let dispatcher =
            TriggerDispatcher::new(executor, clock.clone(), config.dispatcher.clone()).unwrap();
        dispatcher
            .init(
                bus.clone(),
                &config.scenes,
                registry.as_ref(),
                &BuiltinResolver,
                &config.templates,
            )
            .unwrap();
        assert!(dispatcher.start_running_async());

        let feeder = StateFeeder::new(registry, bus, clock.clone());
        Self {
            clock,
            dispatcher,
            feeder,
        }
    }

    fn feed_at(&self, secs: f64, line: &str) -> FeedOutcome {
        self.clock.set(t(secs));
        self.feeder.feed_line(line).unwrap()
    }

    async fn settle(&self) {
        for _ in 0..400 {
            if self.dispatcher.pending_triggers() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("triggers never settled");
    }

    async fn current_matching(&self, predicate: impl Fn(&TaskInfo) -> bool) -> TaskInfo {
        for _ in 0..400 {
            if let Some(task) = self.dispatcher.current_task().filter(|task| predicate(task)) {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no matching current task, got {:?}", self.dispatcher.current_task());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn should_run_idle_scene_until_an_event_takes_over() {
    let stack = Stack::start();

    let idle = stack.current_matching(|task| task.scene == "idle").await;
    assert_eq!(idle.scene, "idle");

    assert_eq!(stack.feed_at(0.0, "red"), FeedOutcome::Published(1));
    stack.settle().await;
    let attack = stack
        .current_matching(|task| task.scene == "attack" && task.status == TaskStatus::Running)
        .await;

    stack.clock.set(t(3.0));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(stack.dispatcher.current_task().unwrap().id, attack.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn should_debounce_then_preempt_repeated_events() {
    let stack = Stack::start();

    stack.feed_at(0.0, "red");
    stack.settle().await;
    let first = stack.current_matching(|task| task.scene == "attack").await;

    stack.feed_at(0.5, "red");
    stack.settle().await;
    assert_eq!(stack.dispatcher.current_task().unwrap().id, first.id);

    stack.feed_at(1.2, "red");
    stack.settle().await;
    let second = stack
        .current_matching(|task| task.scene == "attack" && task.id != first.id)
        .await;
    assert_eq!(second.scene, "attack");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn should_contain_operation_failure() {
    let stack = Stack::start();

    stack.feed_at(0.0, "blue");
    stack.settle().await;
    stack
        .current_matching(|task| task.scene == "broken" && task.status == TaskStatus::Failed)
        .await;
    assert_eq!(stack.dispatcher.lifecycle(), Lifecycle::Running);

    stack.feed_at(0.1, "red");
    stack.settle().await;
    stack
        .current_matching(|task| task.scene == "attack" && task.status == TaskStatus::Running)
        .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn should_ignore_unknown_and_malformed_input() {
    let stack = Stack::start();

    assert_eq!(stack.feed_at(0.0, "green"), FeedOutcome::UnknownState);
    assert_eq!(stack.feed_at(0.0, "# comment"), FeedOutcome::Skipped);
    assert!(stack.feeder.feed_line("red fast").is_err());
    assert_eq!(stack.dispatcher.pending_triggers(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn should_stop_current_task_on_dispose() {
    let stack = Stack::start();

    stack.feed_at(0.0, "red");
    stack.settle().await;
    stack
        .current_matching(|task| task.scene == "attack" && task.status == TaskStatus::Running)
        .await;

    stack.dispatcher.dispose();
    assert_eq!(stack.dispatcher.lifecycle(), Lifecycle::Disposed);
    stack
        .current_matching(|task| task.status == TaskStatus::Stopped)
        .await;
    assert_eq!(stack.feed_at(2.0, "red"), FeedOutcome::Published(0));
}
