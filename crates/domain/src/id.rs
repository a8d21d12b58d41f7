//! Typed identifiers backed by random UUIDs.
//!
//! Identifiers render short (`task-1a2b3c4d`) for logs; the full UUID is
//! available through `as_uuid` and is what serde reads and writes.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[doc = $doc:expr])* $name:ident => $prefix:literal) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl Default for $name {
            fn default() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self::default()
            }

            #[must_use]
            pub fn as_uuid(self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let simple = self.0.simple().to_string();
                write!(f, "{}-{}", $prefix, &simple[..8])
            }
        }
    };
}

uuid_id!(
    /// One run of a scene's operations.
    TaskId => "task"
);

uuid_id!(
    /// Identity under which event listeners are registered, so that a
    /// component can later remove all of its listeners at once.
    ListenerOwner => "listener"
);
