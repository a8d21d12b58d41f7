//! Built-in operations available to scenes, and the resolver that builds
//! them from configuration.
//!
//! | type    | params                | effect                          |
//! |---------|-----------------------|---------------------------------|
//! | `log`   | `message`             | logs the message at info level  |
//! | `sleep` | `ms`                  | waits, cancellable              |
//! | `fail`  | `message`             | fails with the message          |

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use trigger_app::ports::{ActionResolver, BoxFuture, Operation, OperationRef};
use trigger_domain::error::OperationError;
use trigger_domain::scene::OperationConfig;

#[derive(Debug)]
pub struct LogOperation {
    message: String,
}

impl Operation for LogOperation {
    fn name(&self) -> &str {
        "log"
    }

    fn execute(&self) -> BoxFuture<'_, Result<(), OperationError>> {
        Box::pin(async move {
            tracing::info!(message = %self.message, "scene log");
            Ok(())
        })
    }
}

#[derive(Debug)]
pub struct SleepOperation {
    duration: Duration,
}

impl Operation for SleepOperation {
    fn name(&self) -> &str {
        "sleep"
    }

    fn execute(&self) -> BoxFuture<'_, Result<(), OperationError>> {
        Box::pin(async move {
            tokio::time::sleep(self.duration).await;
            Ok(())
        })
    }
}

#[derive(Debug)]
pub struct FailOperation {
    message: String,
}

impl Operation for FailOperation {
    fn name(&self) -> &str {
        "fail"
    }

    fn execute(&self) -> BoxFuture<'_, Result<(), OperationError>> {
        Box::pin(async move { Err(OperationError::Failed(self.message.clone())) })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MessageParams {
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SleepParams {
    ms: u64,
}

/// Absent params deserialize as the defaults.
fn params<T: DeserializeOwned + Default>(value: &serde_json::Value) -> Result<T, OperationError> {
    if value.is_null() {
        return Ok(T::default());
    }
    T::deserialize(value).map_err(|err| OperationError::InvalidParams(err.to_string()))
}

/// Resolves `log`, `sleep` and `fail`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinResolver;

impl ActionResolver for BuiltinResolver {
    fn resolve(&self, config: &OperationConfig) -> Result<OperationRef, OperationError> {
        match config.kind.as_str() {
            "log" => {
                let MessageParams { message } = params(&config.params)?;
                Ok(Arc::new(LogOperation { message }))
            }
            "sleep" => {
                let SleepParams { ms } = params(&config.params)?;
                Ok(Arc::new(SleepOperation {
                    duration: Duration::from_millis(ms),
                }))
            }
            "fail" => {
                let MessageParams { message } = params(&config.params)?;
                Ok(Arc::new(FailOperation { message }))
            }
            other => Err(OperationError::UnknownKind(other.to_string())),
        }
    }
}
