// scene.rs - Scene: entity lifetimes, component vectors and the handle index

use crate::config::SceneConfig;
use crate::ecs::entity::EntityGenerator;
use crate::ecs::{
    is_registered, Component, ComponentHandle, ComponentId, ComponentVector, EntityId, SceneError,
};
use kiln_metrics::Counter;
use std::collections::{hash_map::Entry, HashMap};

pub(super) const REALLOCATIONS: &str = "reallocations";
pub(super) const ADDRESS_INVALIDATIONS: &str = "address_invalidations";
pub(super) const COMPONENTS_ADDED: &str = "components_added";
pub(super) const COMPONENTS_REMOVED: &str = "components_removed";

/// Owner of all entities and components of one scene.
///
/// Each component type lives in its own packed [`ComponentVector`]. The
/// handle index maps `entity -> component id -> handle`; every handle in it
/// resolves against the current state of its vector, because any operation
/// that moves slots restamps the handles of that type before returning.
///
/// Not-found conditions are logged and ignored. Dropping the scene destroys
/// every stored component.
pub struct Scene {
    pub(super) generator: EntityGenerator,
    pub(super) entities: Vec<EntityId>,
    pub(super) addresses: HashMap<EntityId, HashMap<ComponentId, ComponentHandle>>,
    pub(super) vectors: HashMap<ComponentId, ComponentVector>,
    config: SceneConfig,
    pub(super) stats: Counter,
}

impl Scene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    pub fn with_config(config: SceneConfig) -> Self {
        Self {
            generator: EntityGenerator::new(),
            entities: Vec::with_capacity(config.entity_capacity),
            addresses: HashMap::new(),
            vectors: HashMap::new(),
            config,
            stats: Counter::new(),
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Storage counters (reallocations, handle restamps, adds, removes).
    pub fn stats(&self) -> &Counter {
        &self.stats
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Allocate a fresh id and append it to the entity list.
    pub fn create_entity(&mut self) -> EntityId {
        let entity = self.generator.next_id();
        self.entities.push(entity);
        tracing::trace!(%entity, "created entity");
        entity
    }

    /// Append an externally chosen id. Future generated ids skip past it.
    pub fn add_entity(&mut self, entity: EntityId) {
        if self.contains_entity(entity) {
            tracing::warn!(%entity, "entity already part of the scene");
            return;
        }
        self.generator.advance_past(entity);
        self.entities.push(entity);
    }

    /// Remove `entity` from the entity list. Its components are untouched;
    /// use [`despawn`](Self::despawn) to drop them too.
    pub fn remove_entity(&mut self, entity: EntityId) -> bool {
        match self.entities.iter().position(|&e| e == entity) {
            Some(index) => {
                self.entities.remove(index);
                true
            }
            None => {
                tracing::warn!("{}", SceneError::EntityNotFound { entity });
                false
            }
        }
    }

    /// Destroy every component of `entity`, then remove it from the list.
    pub fn despawn(&mut self, entity: EntityId) -> bool {
        if let Some(handles) = self.addresses.remove(&entity) {
            let mut components: Vec<_> = handles.into_keys().collect();
            components.sort_unstable();
            for component in components {
                let Some(vector) = self.vectors.get_mut(&component) else {
                    continue;
                };
                if vector.erase(entity).is_some() {
                    self.stats.increment(COMPONENTS_REMOVED, 1);
                    self.invalidate_component_addresses(component);
                }
            }
        }
        self.remove_entity(entity)
    }

    /// Entities in creation order.
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn contains_entity(&self, entity: EntityId) -> bool {
        self.entities.contains(&entity)
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    /// Attach `value` to `entity`, replacing the existing instance in place.
    ///
    /// A new instance may reallocate the type's vector; the handles of that
    /// type are restamped before the value is appended. The returned
    /// reference lives until the next mutation of the scene.
    pub fn add_component<T: Component>(&mut self, entity: EntityId, value: T) -> &mut T {
        let existing = self.handle_in_index(entity, T::ID);
        let vector = self.vector_entry::<T>();

        let slot = match existing {
            Some(handle) => {
                let slot = handle.slot() as usize;
                debug_assert_eq!(vector.entity_at(slot), Some(entity));
                vector.update(slot, value);
                slot
            }
            None => {
                let grow = vector.is_full();
                let moved = grow && vector.reserve(vector.len() * 2 + 1);
                if moved {
                    self.stats.increment(REALLOCATIONS, 1);
                    self.invalidate_component_addresses(T::ID);
                }

                let vector = self.vector_entry::<T>();
                let slot = vector.emplace(entity, value);
                let handle = vector.handle(slot).expect("slot was just emplaced");
                self.addresses
                    .entry(entity)
                    .or_default()
                    .insert(T::ID, handle);
                self.stats.increment(COMPONENTS_ADDED, 1);
                slot
            }
        };

        self.vector_entry::<T>()
            .value_at_mut(slot)
            .expect("slot holds the component just written")
    }

    /// Detach and return `entity`'s `T`. Dropping the returned value is the
    /// destroy step.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> Option<T> {
        let Some(vector) = self.vectors.get_mut(&T::ID) else {
            report_missing(entity, T::ID);
            return None;
        };
        let (_, value) = vector.take::<T>(entity)?;

        if let Entry::Occupied(mut handles) = self.addresses.entry(entity) {
            handles.get_mut().remove(&T::ID);
            if handles.get().is_empty() {
                handles.remove();
            }
        }
        // Later slots shifted down by one.
        self.invalidate_component_addresses(T::ID);
        self.stats.increment(COMPONENTS_REMOVED, 1);
        Some(value)
    }

    pub fn get_component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let handle = self.handle_in_index(entity, T::ID)?;
        let vector = self.vectors.get(&T::ID)?;
        match vector.resolve::<T>(handle) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(%entity, "{err}");
                vector.get(entity)
            }
        }
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let handle = self.handle_in_index(entity, T::ID)?;
        let vector = self.vectors.get_mut(&T::ID)?;
        let slot = match vector.resolve::<T>(handle) {
            Ok(_) => handle.slot() as usize,
            Err(err) => {
                tracing::warn!(%entity, "{err}");
                vector.slot_of(entity)?
            }
        };
        vector.value_at_mut(slot)
    }

    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        self.handle_in_index(entity, T::ID).is_some()
    }

    /// Current handle of `entity`'s `T`.
    ///
    /// Unlike a reference, a handle may be kept across mutations; resolving
    /// it after the vector changed reports [`SceneError::StaleHandle`].
    pub fn component_handle<T: Component>(&self, entity: EntityId) -> Option<ComponentHandle> {
        self.handle_in_index(entity, T::ID)
    }

    pub fn resolve<T: Component>(&self, handle: ComponentHandle) -> Result<&T, SceneError> {
        self.vectors
            .get(&handle.component())
            .ok_or_else(|| missing_vector(handle))?
            .resolve(handle)
    }

    pub fn resolve_mut<T: Component>(
        &mut self,
        handle: ComponentHandle,
    ) -> Result<&mut T, SceneError> {
        self.vectors
            .get_mut(&handle.component())
            .ok_or_else(|| missing_vector(handle))?
            .resolve_mut(handle)
    }

    /// Visit every `T` in storage order.
    pub fn each_component<T, F>(&mut self, f: F)
    where
        T: Component,
        F: FnMut(EntityId, &mut T),
    {
        if let Some(vector) = self.vectors.get_mut(&T::ID) {
            vector.for_each(f);
        }
    }

    pub fn iter_components<T: Component>(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.vectors
            .get(&T::ID)
            .into_iter()
            .flat_map(|vector| vector.iter::<T>())
    }

    /// Make room for at least `capacity` instances of `T`.
    pub fn reserve_components<T: Component>(&mut self, capacity: usize) {
        if self.vector_entry::<T>().reserve(capacity) {
            self.stats.increment(REALLOCATIONS, 1);
            self.invalidate_component_addresses(T::ID);
        }
    }

    pub fn component_count<T: Component>(&self) -> usize {
        self.vectors.get(&T::ID).map_or(0, ComponentVector::len)
    }

    pub fn component_capacity<T: Component>(&self) -> usize {
        self.vectors.get(&T::ID).map_or(0, ComponentVector::capacity)
    }

    /// Ids of every component type with a vector in this scene, ascending.
    pub fn component_types(&self) -> Vec<ComponentId> {
        let mut ids: Vec<_> = self.vectors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    // ------------------------------------------------------------------
    // Handle index maintenance
    // ------------------------------------------------------------------

    /// Restamp every handle of one component type from storage order.
    pub fn invalidate_component_addresses(&mut self, component: ComponentId) {
        let Some(vector) = self.vectors.get(&component) else {
            if !is_registered(component) {
                tracing::error!("{}", SceneError::UnknownComponentType { component });
            }
            return;
        };

        for slot in 0..vector.len() {
            let (Some(entity), Some(handle)) = (vector.entity_at(slot), vector.handle(slot)) else {
                continue;
            };
            self.addresses
                .entry(entity)
                .or_default()
                .insert(component, handle);
        }

        self.stats.increment(ADDRESS_INVALIDATIONS, 1);
        tracing::trace!(
            component,
            count = vector.len(),
            generation = vector.generation(),
            "restamped component handles"
        );
    }

    pub fn invalidate_all_component_addresses(&mut self) {
        for component in self.component_types() {
            self.invalidate_component_addresses(component);
        }
    }

    /// Destroy every component and forget every entity.
    ///
    /// The id generator keeps its position, so ids are not reused.
    pub fn free(&mut self) {
        for vector in self.vectors.values_mut() {
            vector.free();
        }
        tracing::debug!(
            entities = self.entities.len(),
            types = self.vectors.len(),
            "freed scene"
        );
        self.vectors.clear();
        self.addresses.clear();
        self.entities.clear();
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    fn handle_in_index(&self, entity: EntityId, component: ComponentId) -> Option<ComponentHandle> {
        self.addresses.get(&entity)?.get(&component).copied()
    }

    /// The vector for `T`, created (and pre-sized) on first use.
    pub(super) fn vector_entry<T: Component>(&mut self) -> &mut ComponentVector {
        match self.vectors.entry(T::ID) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let mut vector = ComponentVector::for_type::<T>();
                vector.reserve(self.config.initial_component_capacity);
                tracing::debug!(
                    component = T::NAME,
                    id = T::ID,
                    capacity = vector.capacity(),
                    "created component vector"
                );
                entry.insert(vector)
            }
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("entities", &self.entities.len())
            .field("component_types", &self.component_types())
            .field("config", &self.config)
            .finish()
    }
}

fn report_missing(entity: EntityId, component: ComponentId) {
    if is_registered(component) {
        tracing::warn!("{}", SceneError::ComponentNotFound { entity, component });
    } else {
        tracing::error!("{}", SceneError::UnknownComponentType { component });
    }
}

fn missing_vector(handle: ComponentHandle) -> SceneError {
    if is_registered(handle.component()) {
        SceneError::StaleHandle {
            component: handle.component(),
            slot: handle.slot(),
            generation: handle.generation(),
            current: 0,
        }
    } else {
        SceneError::UnknownComponentType {
            component: handle.component(),
        }
    }
}
