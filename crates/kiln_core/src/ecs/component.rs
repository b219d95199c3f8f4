// component.rs - Runtime component registration
//
// Components are identified by manually assigned u32 ids, not Rust TypeIds,
// so a scene saved by one build can be read back by any build that registers
// the same ids.

use crate::ecs::{EntityId, SceneError};
use once_cell::sync::Lazy;
use std::any::TypeId;
use std::collections::HashMap;
use std::mem::{align_of, needs_drop, offset_of, size_of};
use std::ptr;
use std::sync::{PoisonError, RwLock};

pub type ComponentId = u32;

/// Reserved id; never assigned to a component type.
pub const INVALID_COMPONENT: ComponentId = 0;

/// Storage slot layout: the owning entity first, the component value after it.
#[repr(C)]
pub(crate) struct Slot<T> {
    pub(crate) entity: EntityId,
    pub(crate) value: T,
}

/// Destructor invoked on a slot without compile-time knowledge of its type.
pub type DropSlotFn = unsafe fn(*mut u8);

/// Metadata describing a component's slot layout and destructor.
#[derive(Clone, Copy, Debug)]
pub struct ComponentMeta {
    pub id: ComponentId,
    pub name: &'static str,
    pub type_id: TypeId,
    /// Size of the component value itself.
    pub size: usize,
    /// Size of one slot (entity id + value + padding).
    pub stride: usize,
    /// Alignment of one slot; the backing buffer is allocated with it.
    pub align: usize,
    /// Byte offset of the value inside a slot.
    pub value_offset: usize,
    /// `None` when the type has no drop glue.
    pub drop_slot: Option<DropSlotFn>,
}

impl ComponentMeta {
    /// Describe the slot layout of `T`.
    pub fn of<T: Component>() -> Self {
        Self {
            id: T::ID,
            name: T::NAME,
            type_id: TypeId::of::<T>(),
            size: size_of::<T>(),
            stride: size_of::<Slot<T>>(),
            align: align_of::<Slot<T>>(),
            value_offset: offset_of!(Slot<T>, value),
            drop_slot: needs_drop::<T>().then_some(drop_slot::<T> as DropSlotFn),
        }
    }

    #[inline]
    pub fn needs_drop(&self) -> bool {
        self.drop_slot.is_some()
    }
}

/// # Safety
/// `slot` must point at a live, initialized `Slot<T>`.
unsafe fn drop_slot<T>(slot: *mut u8) {
    ptr::drop_in_place(slot.cast::<Slot<T>>());
}

/// Global registry, allocated on first access.
static REGISTRY: Lazy<RwLock<HashMap<ComponentId, ComponentMeta>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a component's metadata.
///
/// Idempotent for the same Rust type. Registering a second, different type
/// under an id that is already taken is a programming error and panics.
pub fn register_component(meta: ComponentMeta) {
    assert_ne!(
        meta.id, INVALID_COMPONENT,
        "component id 0 is reserved ({})",
        meta.name
    );

    if let Some(prev) = REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&meta.id)
    {
        assert_same_type(prev, &meta);
        return;
    }

    let mut map = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(prev) = map.get(&meta.id) {
        // Lost a registration race against the same type.
        assert_same_type(prev, &meta);
        return;
    }
    tracing::debug!(
        id = meta.id,
        name = meta.name,
        size = meta.size,
        stride = meta.stride,
        "registered component"
    );
    map.insert(meta.id, meta);
}

fn assert_same_type(prev: &ComponentMeta, meta: &ComponentMeta) {
    assert!(
        prev.type_id == meta.type_id,
        "Component id {} registered by two types: {} and {}",
        meta.id,
        prev.name,
        meta.name
    );
}

/// Look up component metadata by ID.
pub fn meta_of(id: ComponentId) -> Option<ComponentMeta> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
        .copied()
}

/// Look up component metadata, reporting unregistered ids as an error.
pub fn lookup(id: ComponentId) -> Result<ComponentMeta, SceneError> {
    meta_of(id).ok_or(SceneError::UnknownComponentType { component: id })
}

pub fn is_registered(id: ComponentId) -> bool {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains_key(&id)
}

/// All registered ids, ascending.
pub fn registered_components() -> Vec<ComponentId> {
    let mut ids: Vec<_> = REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .keys()
        .copied()
        .collect();
    ids.sort_unstable();
    ids
}

/// Trait for component records stored in a scene.
///
/// Implement it through [`define_component!`](crate::define_component)
/// rather than by hand so the id is checked against the reserved value.
pub trait Component: 'static + Sized + Send + Sync {
    /// Globally unique component ID (never 0).
    const ID: ComponentId;

    /// Human-readable name for debugging.
    const NAME: &'static str;

    /// Register this component's layout (and serializer, if any).
    ///
    /// Scenes call it the first time they store the type. Call it once
    /// during startup for every type a loaded scene may contain: a stream
    /// block whose id is not registered yet is skipped.
    fn ensure_registered() {
        register_component(ComponentMeta::of::<Self>());
    }
}

/// Helper macro to implement the Component trait.
///
/// The optional fourth argument hooks persistence into registration:
/// `pod` for `bytemuck::Pod` types stored as raw bytes, `custom` for types
/// implementing [`SerializableComponent`](crate::ecs::SerializableComponent).
/// Types declared without it stay in memory only, and
/// [`Scene::serialize`](crate::ecs::Scene::serialize) refuses scenes that hold
/// any of their instances.
///
/// Persistence is registered together with the layout, so
/// `ensure_registered` should be called once during startup for each
/// persisted type before scenes are loaded.
///
/// # Example
/// ```ignore
/// #[derive(Clone, Copy, Pod, Zeroable)]
/// #[repr(C)]
/// struct Velocity { x: f32, y: f32, z: f32 }
///
/// define_component!(Velocity, 40, "Velocity", pod);
///
/// // at startup, before `Scene::from_reader`
/// Velocity::ensure_registered();
/// ```
#[macro_export]
macro_rules! define_component {
    (@impl $ty:ty, $id:expr, $name:expr, { $($extra:tt)* }) => {
        const _: () = assert!(
            $id != $crate::ecs::INVALID_COMPONENT,
            "component id 0 is reserved"
        );

        impl $crate::ecs::Component for $ty {
            const ID: $crate::ecs::ComponentId = $id;
            const NAME: &'static str = $name;

            fn ensure_registered() {
                $crate::ecs::register_component($crate::ecs::ComponentMeta::of::<Self>());
                $($extra)*
            }
        }
    };
    ($ty:ty, $id:expr, $name:expr, pod) => {
        $crate::define_component!(@impl $ty, $id, $name, {
            $crate::ecs::register_pod_serializer::<Self>();
        });
    };
    ($ty:ty, $id:expr, $name:expr, custom) => {
        $crate::define_component!(@impl $ty, $id, $name, {
            $crate::ecs::register_custom_serializer::<Self>();
        });
    };
    ($ty:ty, $id:expr, $name:expr) => {
        $crate::define_component!(@impl $ty, $id, $name, {});
    };
}
