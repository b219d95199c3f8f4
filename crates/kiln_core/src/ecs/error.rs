use crate::ecs::{ComponentId, EntityId};
use crate::stream::StreamError;
use thiserror::Error;

/// Errors reported by scene storage.
///
/// Scene operations log the not-found variants and degrade to a no-op; only
/// handle resolution and stream I/O hand them back to the caller.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("component id {component} is not registered")]
    UnknownComponentType { component: ComponentId },

    #[error("entity {entity} has no component with id {component}")]
    ComponentNotFound {
        entity: EntityId,
        component: ComponentId,
    },

    #[error("entity {entity} is not part of the scene")]
    EntityNotFound { entity: EntityId },

    #[error(
        "stale handle for component {component}: slot {slot} was issued at generation \
         {generation}, storage is at generation {current}"
    )]
    StaleHandle {
        component: ComponentId,
        slot: u32,
        generation: u32,
        current: u32,
    },

    #[error("typed access expected component id {expected} but storage holds {actual}")]
    ComponentTypeMismatch {
        expected: ComponentId,
        actual: ComponentId,
    },

    #[error("component {name} (id {component}) has instances but no serializer")]
    NotSerializable {
        component: ComponentId,
        name: &'static str,
    },

    #[error(transparent)]
    Stream(#[from] StreamError),
}
