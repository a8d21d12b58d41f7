//! Operation ports: what a scene runs, and how configuration becomes it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use trigger_domain::error::OperationError;
use trigger_domain::scene::{OperationConfig, SceneConfig};

use super::executor::BoxFuture;

/// One step of a scene's action list.
///
/// The dispatcher never looks inside an operation. A running operation is
/// cancelled by dropping its future, so implementations should await at
/// points where stopping is acceptable.
pub trait Operation: fmt::Debug + Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Run the operation to completion.
    fn execute(&self) -> BoxFuture<'_, Result<(), OperationError>>;
}

/// Shared handle to an operation; scenes hand out clones of these.
pub type OperationRef = Arc<dyn Operation>;

/// Turns an [`OperationConfig`] into a runnable operation.
pub trait ActionResolver {
    /// # Errors
    ///
    /// Returns [`OperationError`] when the kind is unknown or its
    /// parameters are unusable.
    fn resolve(&self, config: &OperationConfig) -> Result<OperationRef, OperationError>;
}

impl<F> ActionResolver for F
where
    F: Fn(&OperationConfig) -> Result<OperationRef, OperationError>,
{
    fn resolve(&self, config: &OperationConfig) -> Result<OperationRef, OperationError> {
        self(config)
    }
}

/// Looks up reusable scene templates by name.
pub trait SceneTemplateGetter {
    fn get_template(&self, name: &str) -> Option<SceneConfig>;
}

impl SceneTemplateGetter for HashMap<String, SceneConfig> {
    fn get_template(&self, name: &str) -> Option<SceneConfig> {
        self.get(name).cloned()
    }
}

impl SceneTemplateGetter for Vec<SceneConfig> {
    fn get_template(&self, name: &str) -> Option<SceneConfig> {
        self.iter().find(|template| template.name == name).cloned()
    }
}
