//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the dispatcher and the
//! daemon can depend on them without creating circular dependencies.

pub mod clock;
pub mod event_bus;
pub mod executor;
pub mod operation;

pub use clock::Clock;
pub use event_bus::{EventCallback, EventPublisher, EventSource};
pub use executor::{BoxFuture, Executor};
pub use operation::{ActionResolver, Operation, OperationRef, SceneTemplateGetter};
