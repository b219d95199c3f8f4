//! Entity-component scene storage.
//!
//! Components of one type live packed in a [`ComponentVector`]; a [`Scene`]
//! owns one vector per type plus an index from entity to generation-checked
//! [`ComponentHandle`]s. Component layouts and persistence hooks are kept in
//! process-wide registries keyed by manually assigned [`ComponentId`]s.

mod component;
mod entity;
mod error;
mod handle;
mod macros;
mod scene;
mod scene_io;
mod serialize;
pub mod storage;

pub use component::{
    is_registered, lookup, meta_of, register_component, registered_components, Component,
    ComponentId, ComponentMeta, DropSlotFn, INVALID_COMPONENT,
};
pub use entity::EntityId;
pub use error::SceneError;
pub use handle::ComponentHandle;
pub use scene::Scene;
pub use scene_io::FORMAT_VERSION;
pub use serialize::{
    register_custom_serializer, register_pod_serializer, register_serializer, serializer_of,
    DecodeFn, EncodeFn, SerializableComponent, SerializerMeta,
};
pub use storage::ComponentVector;
