// scene_io.rs - Binary scene persistence
//
// Layout (little-endian):
//   magic "KSCN", version u16
//   entity ids: u32 count + count * u64
//   u32 type count, then per type in ascending id order:
//     id u32, flags u8, count u32,
//     raw block (u32 length; per instance entity u64 + raw payload),
//     when flags & CUSTOM: count length-prefixed custom payloads

use crate::ecs::{
    lookup, serializer_of, ComponentId, ComponentVector, EntityId, Scene, SceneError,
    SerializerMeta,
};
use crate::stream::{ReadStream, StreamError, WriteStream};
use std::collections::HashSet;
use std::io::{Read, Write};
use std::mem::size_of;

const MAGIC: [u8; 4] = *b"KSCN";

/// Current scene stream version.
pub const FORMAT_VERSION: u16 = 1;

const FLAG_CUSTOM: u8 = 1;

impl Scene {
    /// Write every entity and every component to `out`.
    ///
    /// Fails with [`SceneError::NotSerializable`] before writing anything
    /// when a populated component type has no serializer. Empty vectors of
    /// such types are left out.
    pub fn serialize<W: Write + ?Sized>(&self, out: &mut W) -> Result<(), SceneError> {
        let mut persisted: Vec<(&ComponentVector, SerializerMeta)> = Vec::new();
        for id in self.component_types() {
            let Some(vector) = self.vectors.get(&id) else {
                continue;
            };
            match serializer_of(id) {
                Some(hooks) => persisted.push((vector, hooks)),
                None if vector.is_empty() => {}
                None => {
                    return Err(SceneError::NotSerializable {
                        component: id,
                        name: vector.meta().name,
                    })
                }
            }
        }

        out.write_all(&MAGIC).map_err(StreamError::Io)?;
        out.write_u16_le(FORMAT_VERSION)?;

        let ids: Vec<u64> = self.entities.iter().map(|e| e.raw().to_le()).collect();
        out.write_pod_slice(&ids)?;

        out.write_len(persisted.len())?;
        for (vector, hooks) in persisted {
            let mut raw = Vec::new();
            let mut custom = Vec::new();
            (hooks.encode)(vector, &mut raw, &mut custom)?;

            out.write_u32_le(hooks.id)?;
            out.write_u8(if hooks.has_custom { FLAG_CUSTOM } else { 0 })?;
            out.write_len(vector.len())?;
            out.write_blob(&raw)?;
            if hooks.has_custom {
                for payload in &custom {
                    out.write_blob(payload)?;
                }
            }
        }

        tracing::debug!(
            entities = self.entities.len(),
            types = self.vectors.len(),
            "serialized scene"
        );
        Ok(())
    }

    /// Replace this scene's contents with the scene stored in `input`.
    ///
    /// On error the scene is left as it was.
    pub fn deserialize<R: Read + ?Sized>(&mut self, input: &mut R) -> Result<(), SceneError> {
        let mut staged = Scene::with_config(self.config().clone());
        staged.generator = self.generator.clone();
        staged.read_contents(input)?;

        self.free();
        self.generator = staged.generator;
        self.entities = staged.entities;
        self.addresses = staged.addresses;
        self.vectors = staged.vectors;
        Ok(())
    }

    /// Load a scene from `input` with the default configuration.
    pub fn from_reader<R: Read + ?Sized>(input: &mut R) -> Result<Self, SceneError> {
        let mut scene = Scene::new();
        scene.read_contents(input)?;
        Ok(scene)
    }

    fn read_contents<R: Read + ?Sized>(&mut self, input: &mut R) -> Result<(), SceneError> {
        let mut magic = [0u8; 4];
        input.read_exact_bytes(&mut magic)?;
        if magic != MAGIC {
            return Err(StreamError::BadMagic { found: magic }.into());
        }
        let version = input.read_u16_le()?;
        if version != FORMAT_VERSION {
            return Err(StreamError::UnsupportedVersion {
                found: version,
                expected: FORMAT_VERSION,
            }
            .into());
        }

        let raw_ids: Vec<u64> = input.read_pod_vec()?;
        let mut seen = HashSet::with_capacity(raw_ids.len());
        for raw in raw_ids {
            let entity = EntityId::from_raw(u64::from_le(raw)).ok_or(StreamError::InvalidEntity)?;
            if !seen.insert(entity) {
                tracing::warn!(%entity, "duplicate entity in scene stream, skipped");
                continue;
            }
            self.generator.advance_past(entity);
            self.entities.push(entity);
        }

        let type_count = input.read_len()?;
        let mut loaded = HashSet::new();
        for _ in 0..type_count {
            let block = TypeBlock::read(input)?;
            if !loaded.insert(block.id) {
                tracing::warn!(component = block.id, "component type repeated in stream, skipped");
                continue;
            }
            let Some(hooks) = serializer_of(block.id) else {
                tracing::error!(
                    count = block.count,
                    "{}; was ensure_registered called at startup?",
                    SceneError::UnknownComponentType { component: block.id }
                );
                continue;
            };
            self.load_block(&block, hooks)?;
        }

        self.invalidate_all_component_addresses();
        tracing::debug!(
            entities = self.entities.len(),
            types = self.vectors.len(),
            "deserialized scene"
        );
        Ok(())
    }

    fn load_block(&mut self, block: &TypeBlock, hooks: SerializerMeta) -> Result<(), SceneError> {
        let instance = size_of::<u64>() + hooks.raw_size;
        let expected = block
            .count
            .checked_mul(instance)
            .ok_or(StreamError::LengthOverflow { len: usize::MAX })?;
        if block.raw.len() != expected {
            return Err(StreamError::LengthMismatch {
                expected,
                actual: block.raw.len(),
            }
            .into());
        }

        let meta = lookup(block.id)?;
        let initial = self.config().initial_component_capacity;
        let vector = self
            .vectors
            .entry(block.id)
            .or_insert_with(|| ComponentVector::new(meta));
        vector.reserve(block.count.max(initial));

        let mut owners = HashSet::with_capacity(block.count);
        for (index, chunk) in block.raw.chunks_exact(instance).enumerate() {
            let mut payload = chunk;
            let entity =
                EntityId::from_raw(payload.read_u64_le()?).ok_or(StreamError::InvalidEntity)?;
            if !owners.insert(entity) {
                tracing::warn!(%entity, component = meta.name, "duplicate component in stream, skipped");
                continue;
            }
            let custom = block.custom.get(index).map_or(&[][..], Vec::as_slice);
            (hooks.decode)(&mut *vector, entity, payload, custom)?;
        }
        Ok(())
    }
}

/// One component type's blocks, read before the id is resolved so that
/// unknown types can be skipped.
struct TypeBlock {
    id: ComponentId,
    count: usize,
    raw: Vec<u8>,
    custom: Vec<Vec<u8>>,
}

impl TypeBlock {
    fn read<R: Read + ?Sized>(input: &mut R) -> Result<Self, StreamError> {
        let id = input.read_u32_le()?;
        let flags = input.read_u8()?;
        let count = input.read_len()?;
        let raw = input.read_blob()?;
        let custom = if flags & FLAG_CUSTOM != 0 {
            (0..count).map(|_| input.read_blob()).collect::<Result<_, _>>()?
        } else {
            Vec::new()
        };
        Ok(Self {
            id,
            count,
            raw,
            custom,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{Component, SerializableComponent};
    use crate::{define_component, spawn};
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Heat {
        kelvin: f32,
        rate: f32,
    }
    define_component!(Heat, 310, "Heat", pod);

    #[derive(Debug, PartialEq)]
    struct Caption {
        text: String,
    }
    define_component!(Caption, 311, "Caption", custom);

    impl SerializableComponent for Caption {
        fn serialize(&self, out: &mut Vec<u8>) -> Result<(), StreamError> {
            out.write_str(&self.text)
        }

        fn deserialize(input: &mut &[u8]) -> Result<Self, StreamError> {
            Ok(Self {
                text: input.read_string()?,
            })
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Scratch {
        value: u32,
    }
    define_component!(Scratch, 312, "Scratch");

    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Beacon {
        range: f32,
    }
    define_component!(Beacon, 313, "Beacon", pod);

    fn caption(text: &str) -> Caption {
        Caption {
            text: text.to_string(),
        }
    }

    fn sample_scene() -> (Scene, Vec<EntityId>) {
        let mut scene = Scene::new();
        let a = spawn!(scene, Heat { kelvin: 300.0, rate: 0.5 }, caption("alpha"));
        let b = spawn!(scene, Heat { kelvin: 5.0, rate: -1.0 });
        let c = spawn!(scene, caption("gamma"));
        (scene, vec![a, b, c])
    }

    fn encode(scene: &Scene) -> Vec<u8> {
        let mut out = Vec::new();
        scene.serialize(&mut out).unwrap();
        out
    }

    #[test]
    fn round_trip_restores_entities_and_components() {
        let (scene, ids) = sample_scene();
        let bytes = encode(&scene);
        assert_eq!(&bytes[..4], b"KSCN");

        let loaded = Scene::from_reader(&mut bytes.as_slice()).unwrap();
        assert_eq!(loaded.entities(), scene.entities());
        assert_eq!(
            loaded.get_component::<Heat>(ids[0]),
            Some(&Heat { kelvin: 300.0, rate: 0.5 })
        );
        assert_eq!(
            loaded.get_component::<Caption>(ids[2]).map(|c| c.text.as_str()),
            Some("gamma")
        );
        assert_eq!(loaded.component_count::<Heat>(), 2);
        assert_eq!(loaded.component_count::<Caption>(), 2);

        // Handles are rebuilt for the loaded vectors.
        let handle = loaded.component_handle::<Heat>(ids[1]).unwrap();
        assert_eq!(loaded.resolve::<Heat>(handle).map(|h| h.kelvin).ok(), Some(5.0));
    }

    #[test]
    fn deserialize_replaces_contents_and_keeps_ids_fresh() {
        let (source, ids) = sample_scene();
        let bytes = encode(&source);

        let mut scene = Scene::new();
        let stale = spawn!(scene, caption("old"));
        scene.deserialize(&mut bytes.as_slice()).unwrap();

        assert_eq!(scene.entities(), source.entities());
        let texts: Vec<_> = scene
            .iter_components::<Caption>()
            .map(|(_, c)| c.text.as_str())
            .collect();
        assert_eq!(texts, vec!["alpha", "gamma"]);
        assert_eq!(
            scene.get_component::<Caption>(stale).map(|c| c.text.as_str()),
            Some("alpha")
        );
        let next = scene.create_entity();
        assert!(ids.iter().all(|id| next.raw() > id.raw()));
    }

    #[test]
    fn corrupt_input_leaves_the_scene_untouched() {
        let (source, _) = sample_scene();
        let mut bytes = encode(&source);
        bytes.truncate(bytes.len() - 3);

        let mut scene = Scene::new();
        let keep = spawn!(scene, Heat { kelvin: 1.0, rate: 1.0 });
        let err = scene.deserialize(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, SceneError::Stream(StreamError::Truncated)));
        assert_eq!(scene.get_component::<Heat>(keep).map(|h| h.kelvin), Some(1.0));
    }

    #[test]
    fn header_is_validated() {
        let err = Scene::from_reader(&mut &b"NOPE\x01\x00"[..]).unwrap_err();
        assert!(matches!(
            err,
            SceneError::Stream(StreamError::BadMagic { found }) if &found == b"NOPE"
        ));

        let mut future = MAGIC.to_vec();
        future.extend_from_slice(&99u16.to_le_bytes());
        let err = Scene::from_reader(&mut future.as_slice()).unwrap_err();
        assert!(matches!(
            err,
            SceneError::Stream(StreamError::UnsupportedVersion { found: 99, expected: 1 })
        ));
    }

    #[test]
    fn unknown_component_blocks_are_skipped() {
        let mut bytes = MAGIC.to_vec();
        bytes.write_u16_le(FORMAT_VERSION).unwrap();
        bytes.write_pod_slice(&[7u64.to_le()]).unwrap();
        bytes.write_len(2).unwrap();

        // Unregistered id 0xfeed with one custom payload.
        bytes.write_u32_le(0xfeed).unwrap();
        bytes.write_u8(FLAG_CUSTOM).unwrap();
        bytes.write_len(1).unwrap();
        bytes.write_blob(&7u64.to_le_bytes()).unwrap();
        bytes.write_blob(b"opaque").unwrap();

        // A known block after it still loads.
        Heat::ensure_registered();
        bytes.write_u32_le(Heat::ID).unwrap();
        bytes.write_u8(0).unwrap();
        bytes.write_len(1).unwrap();
        let mut raw = 7u64.to_le_bytes().to_vec();
        raw.extend_from_slice(bytemuck::bytes_of(&Heat { kelvin: 2.0, rate: 3.0 }));
        bytes.write_blob(&raw).unwrap();

        let scene = Scene::from_reader(&mut bytes.as_slice()).unwrap();
        let seven = EntityId::from_raw(7).unwrap();
        assert_eq!(scene.get_component::<Heat>(seven).map(|h| h.rate), Some(3.0));
        assert_eq!(scene.component_types(), vec![Heat::ID]);
    }

    #[test]
    fn startup_registration_loads_types_no_scene_has_stored() {
        // Beacon is never added to a scene in this process.
        Beacon::ensure_registered();

        let mut bytes = MAGIC.to_vec();
        bytes.write_u16_le(FORMAT_VERSION).unwrap();
        bytes.write_pod_slice(&[4u64.to_le()]).unwrap();
        bytes.write_len(1).unwrap();
        bytes.write_u32_le(Beacon::ID).unwrap();
        bytes.write_u8(0).unwrap();
        bytes.write_len(1).unwrap();
        let mut raw = 4u64.to_le_bytes().to_vec();
        raw.extend_from_slice(bytemuck::bytes_of(&Beacon { range: 12.5 }));
        bytes.write_blob(&raw).unwrap();

        let scene = Scene::from_reader(&mut bytes.as_slice()).unwrap();
        let four = EntityId::from_raw(4).unwrap();
        assert_eq!(scene.get_component::<Beacon>(four), Some(&Beacon { range: 12.5 }));
    }

    #[test]
    fn raw_block_size_is_checked() {
        Heat::ensure_registered();
        let mut bytes = MAGIC.to_vec();
        bytes.write_u16_le(FORMAT_VERSION).unwrap();
        bytes.write_pod_slice::<u64>(&[]).unwrap();
        bytes.write_len(1).unwrap();
        bytes.write_u32_le(Heat::ID).unwrap();
        bytes.write_u8(0).unwrap();
        bytes.write_len(2).unwrap();
        bytes.write_blob(&[0u8; 16]).unwrap();

        let err = Scene::from_reader(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(
            err,
            SceneError::Stream(StreamError::LengthMismatch { expected: 32, actual: 16 })
        ));
    }

    #[test]
    fn populated_type_without_serializer_is_refused() {
        let (mut scene, ids) = sample_scene();
        scene.add_component(ids[2], Scratch { value: 9 });

        let mut out = Vec::new();
        let err = scene.serialize(&mut out).unwrap_err();
        assert!(matches!(
            err,
            SceneError::NotSerializable { component: 312, name: "Scratch" }
        ));
        assert!(out.is_empty());

        // Once the last instance is gone the empty vector is left out.
        assert_eq!(scene.remove_component::<Scratch>(ids[2]), Some(Scratch { value: 9 }));
        let loaded = Scene::from_reader(&mut encode(&scene).as_slice()).unwrap();
        assert_eq!(loaded.component_types(), vec![Heat::ID, Caption::ID]);
        assert_eq!(
            loaded.get_component::<Caption>(ids[2]).map(|c| c.text.as_str()),
            Some("gamma")
        );
    }

    #[test]
    fn empty_scene_round_trips() {
        let scene = Scene::new();
        let loaded = Scene::from_reader(&mut encode(&scene).as_slice()).unwrap();
        assert_eq!(loaded.entity_count(), 0);
        assert!(loaded.component_types().is_empty());
    }
}
