//! # trigger-app
//!
//! Application layer: use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** at the IO seams:
//!   - `EventSource` / `EventPublisher`: state-change notifications
//!   - `Clock`: the dispatcher's notion of "now"
//!   - `Executor`: the bounded worker pool everything runs on
//!   - `Operation`, `ActionResolver`, `SceneTemplateGetter`: what a scene
//!     runs and how configuration turns into it
//! - Provide **in-process infrastructure** that doesn't need IO
//!   (event bus, clocks, tokio-backed executor)
//! - Run scenes as cancellable **tasks**
//! - Decide when to start, preempt or leave alone the current task
//!   (`TriggerDispatcher`)
//!
//! ## Dependency rule
//! Depends on `trigger-domain` only (plus `tokio` for channels, timers and
//! spawning). Never imports the daemon crate.

pub mod clock;
pub mod dispatcher;
pub mod event_bus;
pub mod executor;
pub mod ports;
pub mod scene_builder;
pub mod task;

#[cfg(test)]
mod testing;
