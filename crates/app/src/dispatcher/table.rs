//! The scene table: which scene answers which event, and the continuous one.

use std::collections::BTreeMap;

use trigger_domain::error::{ConfigError, TriggerError};
use trigger_domain::scene::{Scene, SceneConfig};
use trigger_domain::state::StateLookup;

use crate::ports::{ActionResolver, OperationRef, SceneTemplateGetter};
use crate::scene_builder::build_scene;

/// Compiled scenes indexed for dispatch. Read-only once built.
#[derive(Debug)]
pub(crate) struct SceneTable {
    scenes: Vec<Scene<OperationRef>>,
    by_event: BTreeMap<String, usize>,
    continuous: Option<usize>,
}

impl SceneTable {
    /// Compile every scene and index it.
    ///
    /// Each trigger state may belong to one scene only, and at most one
    /// scene may be continuous.
    pub(crate) fn build(
        configs: &[SceneConfig],
        states: &dyn StateLookup,
        resolver: &dyn ActionResolver,
        templates: &dyn SceneTemplateGetter,
    ) -> Result<Self, TriggerError> {
        let mut table = Self {
            scenes: Vec::with_capacity(configs.len()),
            by_event: BTreeMap::new(),
            continuous: None,
        };

        for config in configs {
            let scene = build_scene(config, states, resolver, templates)?;
            let index = table.scenes.len();

            if scene.is_continuous() {
                if let Some(first) = table.continuous {
                    return Err(ConfigError::MultipleContinuousScenes {
                        first: table.scenes[first].name().to_string(),
                        second: scene.name().to_string(),
                    }
                    .into());
                }
                table.continuous = Some(index);
            }

            for state in scene.trigger_states() {
                if let Some(&first) = table.by_event.get(state) {
                    return Err(ConfigError::DuplicateTriggerState {
                        state: state.clone(),
                        first: table.scenes[first].name().to_string(),
                        second: scene.name().to_string(),
                    }
                    .into());
                }
                table.by_event.insert(state.clone(), index);
            }

            table.scenes.push(scene);
        }

        Ok(table)
    }

    pub(crate) fn scene_for(&self, event_id: &str) -> Option<&Scene<OperationRef>> {
        self.by_event.get(event_id).map(|&index| &self.scenes[index])
    }

    pub(crate) fn continuous(&self) -> Option<&Scene<OperationRef>> {
        self.continuous.map(|index| &self.scenes[index])
    }

    pub(crate) fn event_ids(&self) -> impl Iterator<Item = &str> {
        self.by_event.keys().map(String::as_str)
    }

    pub(crate) fn len(&self) -> usize {
        self.scenes.len()
    }

    pub(crate) fn dispose(&self) {
        for scene in &self.scenes {
            scene.dispose();
        }
    }
}
