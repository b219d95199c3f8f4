//! Scene configuration

use serde::{Deserialize, Serialize};

/// Sizing hints for a [`Scene`](crate::ecs::Scene).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Slots reserved when a component type's vector is first created.
    pub initial_component_capacity: usize,
    /// Pre-size of the entity list.
    pub entity_capacity: usize,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            initial_component_capacity: 0,
            entity_capacity: 64,
        }
    }
}
