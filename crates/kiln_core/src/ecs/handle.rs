use crate::ecs::ComponentId;
use std::fmt;

/// Generation-checked reference to a component slot.
///
/// Handles stay cheap to copy and never dangle: resolving one against a
/// vector whose generation moved on (reallocation, erase, free) yields
/// `SceneError::StaleHandle` instead of another entity's data.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ComponentHandle {
    component: ComponentId,
    slot: u32,
    generation: u32,
}

impl ComponentHandle {
    pub(crate) fn new(component: ComponentId, slot: u32, generation: u32) -> Self {
        Self {
            component,
            slot,
            generation,
        }
    }

    #[inline]
    pub fn component(self) -> ComponentId {
        self.component
    }

    #[inline]
    pub fn slot(self) -> u32 {
        self.slot
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.component, self.slot, self.generation)
    }
}
