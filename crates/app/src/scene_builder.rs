//! Compiles declarative [`SceneConfig`]s into runnable scenes.

use trigger_domain::condition;
use trigger_domain::error::{ConfigError, TriggerError};
use trigger_domain::scene::{Scene, SceneConfig};
use trigger_domain::state::StateLookup;

use crate::ports::{ActionResolver, OperationRef, SceneTemplateGetter};

/// Build one scene.
///
/// The condition is parsed against `states`, the template's operations (if
/// any) are prepended to the scene's own, and every operation is resolved.
///
/// # Errors
///
/// - [`TriggerError::Parse`] when the condition does not compile
/// - [`TriggerError::Config`] for an unknown template or a scene that fails
///   validation
/// - [`TriggerError::Resolve`] when an operation cannot be resolved
pub fn build_scene(
    config: &SceneConfig,
    states: &dyn StateLookup,
    resolver: &dyn ActionResolver,
    templates: &dyn SceneTemplateGetter,
) -> Result<Scene<OperationRef>, TriggerError> {
    let condition =
        condition::parse(&config.condition, states).map_err(|source| TriggerError::Parse {
            scene: config.name.clone(),
            source,
        })?;

    let mut configs = Vec::new();
    if let Some(name) = &config.template {
        let template =
            templates
                .get_template(name)
                .ok_or_else(|| ConfigError::UnknownTemplate {
                    scene: config.name.clone(),
                    template: name.clone(),
                })?;
        configs.extend(template.operations);
    }
    configs.extend(config.operations.iter().cloned());

    let operations = configs
        .iter()
        .map(|op| {
            resolver.resolve(op).map_err(|source| TriggerError::Resolve {
                scene: config.name.clone(),
                kind: op.kind.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let scene = Scene::new(
        config.name.clone(),
        condition,
        config.trigger_states.clone(),
        config.cooldown()?,
        operations,
    )?;
    tracing::debug!(
        scene = scene.name(),
        condition = %scene.condition(),
        operations = configs.len(),
        "scene compiled"
    );
    Ok(scene)
}
