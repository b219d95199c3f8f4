// serialize.rs - Persistence hooks for component types
//
// A second registry, keyed like the component table, holding the encode and
// decode entry points of types that opt into scene persistence. Entries are
// monomorphized per type, so a scene can persist a vector knowing only its id.

use crate::ecs::{is_registered, Component, ComponentId, ComponentVector, EntityId};
use crate::stream::{StreamError, WriteStream};
use bytemuck::Pod;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::mem::size_of;
use std::sync::{PoisonError, RwLock};

/// Component with a hand-written stream encoding.
///
/// Used for types that own heap data and therefore cannot be persisted as
/// raw bytes.
pub trait SerializableComponent: Component {
    /// Append this value's encoding to `out`.
    fn serialize(&self, out: &mut Vec<u8>) -> Result<(), StreamError>;

    /// Decode one value, advancing `input` past the bytes consumed.
    fn deserialize(input: &mut &[u8]) -> Result<Self, StreamError>;
}

/// Encode every instance of a vector.
///
/// Appends `entity id (u64 LE) + raw payload` per instance to the raw block
/// and, for custom types, one payload per instance to `custom`.
pub type EncodeFn =
    fn(&ComponentVector, &mut Vec<u8>, &mut Vec<Vec<u8>>) -> Result<(), StreamError>;

/// Decode one instance from its raw and custom payloads and append it.
pub type DecodeFn = fn(&mut ComponentVector, EntityId, &[u8], &[u8]) -> Result<(), StreamError>;

#[derive(Clone, Copy)]
pub struct SerializerMeta {
    pub id: ComponentId,
    /// Raw payload bytes per instance (entity id excluded).
    pub raw_size: usize,
    /// Whether per-instance custom payloads are written.
    pub has_custom: bool,
    pub encode: EncodeFn,
    pub decode: DecodeFn,
}

impl fmt::Debug for SerializerMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerMeta")
            .field("id", &self.id)
            .field("raw_size", &self.raw_size)
            .field("has_custom", &self.has_custom)
            .finish_non_exhaustive()
    }
}

static SERIALIZERS: Lazy<RwLock<HashMap<ComponentId, SerializerMeta>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register persistence hooks for an already registered component id.
pub fn register_serializer(meta: SerializerMeta) {
    assert!(
        is_registered(meta.id),
        "serializer registered for unknown component id {}",
        meta.id
    );
    let mut map = SERIALIZERS.write().unwrap_or_else(PoisonError::into_inner);
    if map.insert(meta.id, meta).is_none() {
        tracing::debug!(
            id = meta.id,
            raw_size = meta.raw_size,
            custom = meta.has_custom,
            "registered component serializer"
        );
    }
}

pub fn serializer_of(id: ComponentId) -> Option<SerializerMeta> {
    SERIALIZERS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
        .copied()
}

/// Persist `T` as its raw bytes.
pub fn register_pod_serializer<T: Component + Pod>() {
    register_serializer(SerializerMeta {
        id: T::ID,
        raw_size: size_of::<T>(),
        has_custom: false,
        encode: encode_pod::<T>,
        decode: decode_pod::<T>,
    });
}

/// Persist `T` through its [`SerializableComponent`] impl.
pub fn register_custom_serializer<T: SerializableComponent>() {
    register_serializer(SerializerMeta {
        id: T::ID,
        raw_size: 0,
        has_custom: true,
        encode: encode_custom::<T>,
        decode: decode_custom::<T>,
    });
}

fn encode_pod<T: Component + Pod>(
    vector: &ComponentVector,
    raw: &mut Vec<u8>,
    _custom: &mut Vec<Vec<u8>>,
) -> Result<(), StreamError> {
    raw.reserve(vector.len() * (size_of::<u64>() + size_of::<T>()));
    for (entity, value) in vector.iter::<T>() {
        raw.write_u64_le(entity.raw())?;
        raw.extend_from_slice(bytemuck::bytes_of(value));
    }
    Ok(())
}

fn decode_pod<T: Component + Pod>(
    vector: &mut ComponentVector,
    entity: EntityId,
    raw: &[u8],
    _custom: &[u8],
) -> Result<(), StreamError> {
    if raw.len() != size_of::<T>() {
        return Err(StreamError::LengthMismatch {
            expected: size_of::<T>(),
            actual: raw.len(),
        });
    }
    let value: T = bytemuck::pod_read_unaligned(raw);
    vector.emplace(entity, value);
    Ok(())
}

fn encode_custom<T: SerializableComponent>(
    vector: &ComponentVector,
    raw: &mut Vec<u8>,
    custom: &mut Vec<Vec<u8>>,
) -> Result<(), StreamError> {
    for (entity, value) in vector.iter::<T>() {
        raw.write_u64_le(entity.raw())?;
        let mut payload = Vec::new();
        value.serialize(&mut payload)?;
        custom.push(payload);
    }
    Ok(())
}

fn decode_custom<T: SerializableComponent>(
    vector: &mut ComponentVector,
    entity: EntityId,
    _raw: &[u8],
    custom: &[u8],
) -> Result<(), StreamError> {
    let mut input = custom;
    let value = T::deserialize(&mut input)?;
    if !input.is_empty() {
        return Err(StreamError::LengthMismatch {
            expected: custom.len() - input.len(),
            actual: custom.len(),
        });
    }
    vector.emplace(entity, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::define_component;
    use crate::stream::{ReadStream, WriteStream};
    use bytemuck::Zeroable;

    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Mass {
        kg: f32,
        inverse: f32,
    }
    define_component!(Mass, 300, "Mass", pod);

    #[derive(Debug, PartialEq)]
    struct Note {
        text: String,
        priority: u32,
    }
    define_component!(Note, 301, "Note", custom);

    impl SerializableComponent for Note {
        fn serialize(&self, out: &mut Vec<u8>) -> Result<(), StreamError> {
            out.write_str(&self.text)?;
            out.write_u32_le(self.priority)
        }

        fn deserialize(input: &mut &[u8]) -> Result<Self, StreamError> {
            Ok(Self {
                text: input.read_string()?,
                priority: input.read_u32_le()?,
            })
        }
    }

    fn entity(raw: u64) -> EntityId {
        EntityId::from_raw(raw).unwrap()
    }

    #[test]
    fn registration_installs_serializers() {
        Mass::ensure_registered();
        Note::ensure_registered();

        let pod = serializer_of(300).expect("pod serializer");
        assert_eq!(pod.raw_size, 8);
        assert!(!pod.has_custom);

        let custom = serializer_of(301).expect("custom serializer");
        assert_eq!(custom.raw_size, 0);
        assert!(custom.has_custom);

        assert!(serializer_of(0xbeef).is_none());
    }

    #[test]
    fn pod_instances_survive_encode_decode() {
        let mut source = ComponentVector::for_type::<Mass>();
        source.emplace(entity(3), Mass { kg: 2.0, inverse: 0.5 });
        source.emplace(entity(7), Mass { kg: 4.0, inverse: 0.25 });

        let hooks = serializer_of(Mass::ID).unwrap();
        let mut raw = Vec::new();
        let mut custom = Vec::new();
        (hooks.encode)(&source, &mut raw, &mut custom).unwrap();
        assert_eq!(raw.len(), 2 * (8 + hooks.raw_size));
        assert!(custom.is_empty());

        let mut target = ComponentVector::for_type::<Mass>();
        for chunk in raw.chunks(8 + hooks.raw_size) {
            let owner = entity(u64::from_le_bytes(chunk[..8].try_into().unwrap()));
            (hooks.decode)(&mut target, owner, &chunk[8..], &[]).unwrap();
        }
        assert_eq!(target.get::<Mass>(entity(7)), Some(&Mass { kg: 4.0, inverse: 0.25 }));
        assert_eq!(target.len(), 2);
    }

    #[test]
    fn custom_payloads_carry_owned_data() {
        let mut source = ComponentVector::for_type::<Note>();
        source.emplace(
            entity(1),
            Note {
                text: "hello".into(),
                priority: 3,
            },
        );

        let hooks = serializer_of(Note::ID).unwrap();
        let mut raw = Vec::new();
        let mut custom = Vec::new();
        (hooks.encode)(&source, &mut raw, &mut custom).unwrap();
        assert_eq!(raw, 1u64.to_le_bytes());
        assert_eq!(custom.len(), 1);

        let mut target = ComponentVector::for_type::<Note>();
        (hooks.decode)(&mut target, entity(1), &[], &custom[0]).unwrap();
        assert_eq!(target.get::<Note>(entity(1)).map(|n| n.text.as_str()), Some("hello"));
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let mut target = ComponentVector::for_type::<Mass>();
        let err = decode_pod::<Mass>(&mut target, entity(1), &[0; 5], &[]).unwrap_err();
        assert!(matches!(err, StreamError::LengthMismatch { expected: 8, actual: 5 }));

        let mut notes = ComponentVector::for_type::<Note>();
        let mut payload = Vec::new();
        payload.write_str("x").unwrap();
        payload.write_u32_le(1).unwrap();
        payload.push(0xaa);
        let err = decode_custom::<Note>(&mut notes, entity(1), &[], &payload).unwrap_err();
        assert!(matches!(err, StreamError::LengthMismatch { .. }));
        assert!(notes.is_empty());
    }
}
