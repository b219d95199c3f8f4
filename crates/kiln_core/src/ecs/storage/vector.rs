// vector.rs - Packed, type-erased storage for one component type.
//
// Slots are `Slot<T>` values (entity id first) laid end to end with no gap
// between them. The byte view is what generic teardown and persistence walk;
// typed views are checked against the registered TypeId before any cast.

use super::buffer::RawBuffer;
use crate::ecs::component::Slot;
use crate::ecs::{Component, ComponentHandle, ComponentId, ComponentMeta, EntityId, SceneError};
use std::any::TypeId;
use std::mem::ManuallyDrop;
use std::ptr;

/// Packed array of one component type over an aligned byte buffer.
///
/// Every operation that can move a slot (reallocation, erase, free) bumps
/// the vector's generation, which invalidates outstanding
/// [`ComponentHandle`]s.
pub struct ComponentVector {
    meta: ComponentMeta,
    buffer: RawBuffer,
    generation: u32,
}

impl ComponentVector {
    /// Create an empty vector for the described component.
    pub fn new(meta: ComponentMeta) -> Self {
        Self {
            buffer: RawBuffer::new(meta.align),
            meta,
            generation: 0,
        }
    }

    /// Create an empty vector for `T`, registering `T` if needed.
    pub fn for_type<T: Component>() -> Self {
        T::ensure_registered();
        Self::new(ComponentMeta::of::<T>())
    }

    #[inline]
    pub fn meta(&self) -> &ComponentMeta {
        &self.meta
    }

    #[inline]
    pub fn component(&self) -> ComponentId {
        self.meta.id
    }

    /// Number of stored instances.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len() / self.meta.stride
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.len() == 0
    }

    /// Number of instances that fit without reallocating.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity() / self.meta.stride
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    #[inline]
    pub fn byte_len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Grow capacity to at least `slots` instances.
    ///
    /// Returns `true` if the buffer was reallocated, in which case every
    /// handle previously issued by this vector is stale.
    pub fn reserve(&mut self, slots: usize) -> bool {
        let bytes = slots
            .checked_mul(self.meta.stride)
            .unwrap_or_else(|| panic!("capacity overflow reserving {slots} {}", self.meta.name));
        let moved = self.buffer.reserve_exact(bytes);
        if moved {
            self.bump_generation();
            tracing::trace!(
                component = self.meta.name,
                capacity = self.capacity(),
                generation = self.generation,
                "component vector reallocated"
            );
        }
        moved
    }

    /// Append a component for `entity`, returning its slot index.
    ///
    /// Falls back to doubling the buffer when the caller did not reserve;
    /// the scene always reserves first so it knows when addresses move.
    pub fn emplace<T: Component>(&mut self, entity: EntityId, value: T) -> usize {
        self.assert_type::<T>();
        let slot = ManuallyDrop::new(Slot { entity, value });
        // SAFETY: `slot` is a live Slot<T> of this vector's type and is never
        // dropped here, so ownership moves into the buffer.
        unsafe { self.construct_slot(ptr::addr_of!(*slot).cast::<u8>()) }
    }

    /// Replace the value in `slot`, keeping its address and owner.
    pub fn update<T: Component>(&mut self, slot: usize, value: T) {
        self.assert_type::<T>();
        assert!(slot < self.len(), "slot {slot} out of bounds for {}", self.meta.name);
        // SAFETY: `slot` is in bounds and holds an initialized T.
        let old = unsafe { ptr::replace(self.value_ptr_mut(slot).cast::<T>(), value) };
        drop(old);
    }

    /// Destroy the component owned by `entity` and close the gap.
    ///
    /// Slots after the erased one shift down by one. Returns the erased slot
    /// index, or `None` (logged) when the entity has no instance here.
    pub fn erase(&mut self, entity: EntityId) -> Option<usize> {
        let Some(slot) = self.slot_of(entity) else {
            self.log_missing(entity);
            return None;
        };
        let drop_slot = self.meta.drop_slot;
        // The gap closes even if the destructor unwinds.
        let mut gap = CloseGap { vector: self, slot };
        if let Some(drop_slot) = drop_slot {
            let target = gap.vector.slot_ptr_mut(slot);
            // SAFETY: the slot is initialized and its bytes are discarded by
            // `gap`, so it is dropped exactly once.
            unsafe { drop_slot(target) };
        }
        drop(gap);
        Some(slot)
    }

    /// Typed erase: move the component out instead of dropping it.
    pub fn take<T: Component>(&mut self, entity: EntityId) -> Option<(usize, T)> {
        self.assert_type::<T>();
        let Some(slot) = self.slot_of(entity) else {
            self.log_missing(entity);
            return None;
        };
        // SAFETY: the slot holds an initialized T; its bytes are discarded
        // right after, so the value is moved out exactly once.
        let value = unsafe { ptr::read(self.value_ptr(slot).cast::<T>()) };
        self.remove_slot_bytes(slot);
        Some((slot, value))
    }

    /// Linear scan for the component owned by `entity`.
    pub fn get<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let slot = self.slot_of(entity)?;
        self.value_at(slot)
    }

    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let slot = self.slot_of(entity)?;
        self.value_at_mut(slot)
    }

    /// Typed view of one slot.
    pub fn value_at<T: Component>(&self, slot: usize) -> Option<&T> {
        self.assert_type::<T>();
        if slot >= self.len() {
            return None;
        }
        // SAFETY: in bounds, initialized, and checked to be a T.
        Some(unsafe { &*self.value_ptr(slot).cast::<T>() })
    }

    pub fn value_at_mut<T: Component>(&mut self, slot: usize) -> Option<&mut T> {
        self.assert_type::<T>();
        if slot >= self.len() {
            return None;
        }
        // SAFETY: in bounds, initialized, checked to be a T, and uniquely
        // borrowed through `&mut self`.
        Some(unsafe { &mut *self.value_ptr_mut(slot).cast::<T>() })
    }

    /// Owner of `slot`, read through the untyped view.
    pub fn entity_at(&self, slot: usize) -> Option<EntityId> {
        if slot >= self.len() {
            return None;
        }
        // SAFETY: every initialized slot starts with its owner's EntityId
        // (Slot<T> is repr(C)) and slots are at least EntityId-aligned.
        Some(unsafe { self.slot_ptr(slot).cast::<EntityId>().read() })
    }

    /// Owners in storage order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        (0..self.len()).filter_map(move |slot| self.entity_at(slot))
    }

    /// Slot index of `entity`'s component, using only the runtime stride.
    pub fn slot_of(&self, entity: EntityId) -> Option<usize> {
        self.entities().position(|owner| owner == entity)
    }

    /// Iterate `(owner, component)` pairs in storage order.
    pub fn iter<T: Component>(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.assert_type::<T>();
        (0..self.len()).map(move |slot| {
            // SAFETY: in bounds, initialized, checked to be a Slot<T>.
            let entry = unsafe { &*self.slot_ptr(slot).cast::<Slot<T>>() };
            (entry.entity, &entry.value)
        })
    }

    /// Visit every instance mutably. The owner id is passed by value so the
    /// callback cannot restamp it.
    pub fn for_each<T, F>(&mut self, mut f: F)
    where
        T: Component,
        F: FnMut(EntityId, &mut T),
    {
        self.assert_type::<T>();
        for slot in 0..self.len() {
            // SAFETY: in bounds, initialized, checked to be a Slot<T>; one
            // slot is borrowed at a time.
            let entry = unsafe { &mut *self.slot_ptr_mut(slot).cast::<Slot<T>>() };
            f(entry.entity, &mut entry.value);
        }
    }

    /// Handle for `slot` at the current generation.
    pub fn handle(&self, slot: usize) -> Option<ComponentHandle> {
        if slot >= self.len() {
            return None;
        }
        let slot = u32::try_from(slot).ok()?;
        Some(ComponentHandle::new(self.meta.id, slot, self.generation))
    }

    /// Dereference a handle, rejecting it if the vector changed since it
    /// was issued.
    pub fn resolve<T: Component>(&self, handle: ComponentHandle) -> Result<&T, SceneError> {
        let slot = self.check_handle::<T>(handle)?;
        self.value_at(slot).ok_or_else(|| self.stale(handle))
    }

    pub fn resolve_mut<T: Component>(
        &mut self,
        handle: ComponentHandle,
    ) -> Result<&mut T, SceneError> {
        let slot = self.check_handle::<T>(handle)?;
        let stale = self.stale(handle);
        self.value_at_mut(slot).ok_or(stale)
    }

    /// Destroy every instance through the registered destructor.
    ///
    /// Works without the compile-time type; this is what scene teardown
    /// runs. Capacity is kept.
    pub fn free(&mut self) {
        let len = self.len();
        // Length goes to zero first: a panicking destructor leaks the rest
        // instead of dropping anything twice.
        // SAFETY: zero is always a valid length.
        unsafe { self.buffer.set_len(0) };
        if let Some(drop_slot) = self.meta.drop_slot {
            let base = self.buffer.as_mut_ptr();
            for slot in 0..len {
                // SAFETY: slots below the old length were initialized.
                unsafe { drop_slot(base.add(slot * self.meta.stride)) };
            }
        }
        self.bump_generation();
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    /// Placement-construct: move one slot's bytes to the end of the buffer.
    ///
    /// # Safety
    /// `src` must point at an initialized slot of this vector's component
    /// type. Ownership of the value moves into the vector; the caller must
    /// not drop the source.
    unsafe fn construct_slot(&mut self, src: *const u8) -> usize {
        if self.is_full() {
            self.reserve(self.len() * 2 + 1);
        }
        let slot = self.len();
        let offset = self.buffer.len();
        let stride = self.meta.stride;
        ptr::copy_nonoverlapping(src, self.buffer.as_mut_ptr().add(offset), stride);
        self.buffer.set_len(offset + stride);
        slot
    }

    fn remove_slot_bytes(&mut self, slot: usize) {
        let start = slot * self.meta.stride;
        self.buffer.remove_range(start, start + self.meta.stride);
        self.bump_generation();
    }

    fn check_handle<T: Component>(&self, handle: ComponentHandle) -> Result<usize, SceneError> {
        if T::ID != self.meta.id || handle.component() != self.meta.id {
            return Err(SceneError::ComponentTypeMismatch {
                expected: self.meta.id,
                actual: if T::ID != self.meta.id { T::ID } else { handle.component() },
            });
        }
        let slot = handle.slot() as usize;
        if handle.generation() != self.generation || slot >= self.len() {
            return Err(self.stale(handle));
        }
        Ok(slot)
    }

    fn stale(&self, handle: ComponentHandle) -> SceneError {
        SceneError::StaleHandle {
            component: handle.component(),
            slot: handle.slot(),
            generation: handle.generation(),
            current: self.generation,
        }
    }

    fn log_missing(&self, entity: EntityId) {
        let err = SceneError::ComponentNotFound {
            entity,
            component: self.meta.id,
        };
        tracing::warn!(component = self.meta.name, "{err}");
    }

    #[inline]
    fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    #[inline]
    fn assert_type<T: Component>(&self) {
        assert!(
            self.meta.type_id == TypeId::of::<T>(),
            "component vector for {} accessed as {}",
            self.meta.name,
            T::NAME
        );
    }

    #[inline]
    fn slot_ptr(&self, slot: usize) -> *const u8 {
        debug_assert!(slot < self.len());
        // SAFETY: callers pass in-bounds slots, so the offset stays inside
        // the allocation.
        unsafe { self.buffer.as_ptr().add(slot * self.meta.stride) }
    }

    #[inline]
    fn slot_ptr_mut(&mut self, slot: usize) -> *mut u8 {
        debug_assert!(slot < self.len());
        let stride = self.meta.stride;
        // SAFETY: as in `slot_ptr`.
        unsafe { self.buffer.as_mut_ptr().add(slot * stride) }
    }

    #[inline]
    fn value_ptr(&self, slot: usize) -> *const u8 {
        // SAFETY: `value_offset < stride`, so this stays inside the slot.
        unsafe { self.slot_ptr(slot).add(self.meta.value_offset) }
    }

    #[inline]
    fn value_ptr_mut(&mut self, slot: usize) -> *mut u8 {
        let offset = self.meta.value_offset;
        // SAFETY: as in `value_ptr`.
        unsafe { self.slot_ptr_mut(slot).add(offset) }
    }
}

impl Drop for ComponentVector {
    fn drop(&mut self) {
        self.free();
    }
}

impl std::fmt::Debug for ComponentVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentVector")
            .field("component", &self.meta.name)
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("generation", &self.generation)
            .finish()
    }
}

/// Removes one slot's bytes when dropped.
struct CloseGap<'a> {
    vector: &'a mut ComponentVector,
    slot: usize,
}

impl Drop for CloseGap<'_> {
    fn drop(&mut self) {
        self.vector.remove_slot_bytes(self.slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::define_component;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Position {
        x: i32,
        y: i32,
    }
    define_component!(Position, 100, "Position");

    #[derive(Clone, Copy, Debug, PartialEq)]
    #[repr(align(16))]
    struct Wide {
        lanes: [f32; 4],
    }
    define_component!(Wide, 101, "Wide");

    /// Counts drops through a shared counter.
    struct Tracked {
        drops: Arc<AtomicUsize>,
        label: String,
    }
    define_component!(Tracked, 102, "Tracked");

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Panics from its destructor when `grumble` is set.
    struct Brittle {
        drops: Arc<AtomicUsize>,
        grumble: bool,
    }
    define_component!(Brittle, 103, "Brittle");

    impl Drop for Brittle {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
            if self.grumble {
                panic!("brittle component refused to drop");
            }
        }
    }

    fn entity(raw: u64) -> EntityId {
        EntityId::from_raw(raw).unwrap()
    }

    fn tracked(drops: &Arc<AtomicUsize>, label: &str) -> Tracked {
        Tracked {
            drops: Arc::clone(drops),
            label: label.to_string(),
        }
    }

    #[test]
    fn emplace_get_and_iterate() {
        let mut vector = ComponentVector::for_type::<Position>();
        vector.reserve(4);
        assert_eq!(vector.emplace(entity(1), Position { x: 1, y: 2 }), 0);
        assert_eq!(vector.emplace(entity(2), Position { x: 3, y: 4 }), 1);

        assert_eq!(vector.len(), 2);
        assert_eq!(vector.byte_len() % vector.meta().stride, 0);
        assert_eq!(vector.get::<Position>(entity(2)), Some(&Position { x: 3, y: 4 }));
        assert_eq!(vector.get::<Position>(entity(9)), None);
        assert_eq!(vector.slot_of(entity(2)), Some(1));
        assert_eq!(vector.entity_at(0), Some(entity(1)));

        let collected: Vec<_> = vector.iter::<Position>().map(|(e, p)| (e.raw(), p.x)).collect();
        assert_eq!(collected, vec![(1, 1), (2, 3)]);
    }

    #[test]
    fn emplace_without_reserve_still_grows() {
        let mut vector = ComponentVector::for_type::<Position>();
        for raw in 1..=20 {
            vector.emplace(entity(raw), Position { x: raw as i32, y: 0 });
        }
        assert_eq!(vector.len(), 20);
        assert!(vector.capacity() >= 20);
        assert_eq!(vector.get::<Position>(entity(17)).map(|p| p.x), Some(17));
    }

    #[test]
    fn reserve_bumps_generation_only_on_reallocation() {
        let mut vector = ComponentVector::for_type::<Position>();
        let start = vector.generation();
        assert!(vector.reserve(8));
        assert_eq!(vector.generation(), start + 1);
        assert!(!vector.reserve(4));
        assert_eq!(vector.generation(), start + 1);
        assert_eq!(vector.capacity(), 8);
    }

    #[test]
    fn over_aligned_components_stay_aligned() {
        let mut vector = ComponentVector::for_type::<Wide>();
        for raw in 1..=9 {
            vector.emplace(entity(raw), Wide { lanes: [raw as f32; 4] });
        }
        for (_, wide) in vector.iter::<Wide>() {
            assert_eq!(wide as *const Wide as usize % 16, 0);
        }
        assert_eq!(vector.get::<Wide>(entity(9)).map(|w| w.lanes[3]), Some(9.0));
    }

    #[test]
    fn update_replaces_in_place_and_drops_old_value() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut vector = ComponentVector::for_type::<Tracked>();
        vector.emplace(entity(1), tracked(&drops, "first"));
        let before = vector.value_at::<Tracked>(0).map(|t| t as *const Tracked);

        vector.update(0, tracked(&drops, "second"));

        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(vector.len(), 1);
        assert_eq!(vector.value_at::<Tracked>(0).map(|t| t as *const Tracked), before);
        assert_eq!(vector.get::<Tracked>(entity(1)).map(|t| t.label.as_str()), Some("second"));
        assert_eq!(vector.entity_at(0), Some(entity(1)));
    }

    #[test]
    fn erase_shifts_later_slots_and_runs_destructor() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut vector = ComponentVector::for_type::<Tracked>();
        for (raw, label) in [(1, "a"), (2, "b"), (3, "c")] {
            vector.emplace(entity(raw), tracked(&drops, label));
        }
        let generation = vector.generation();

        assert_eq!(vector.erase(entity(2)), Some(1));
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(vector.len(), 2);
        assert_eq!(vector.slot_of(entity(3)), Some(1));
        assert_eq!(vector.get::<Tracked>(entity(3)).map(|t| t.label.as_str()), Some("c"));
        assert_ne!(vector.generation(), generation);

        // Absent entity: logged no-op.
        assert_eq!(vector.erase(entity(2)), None);
        assert_eq!(vector.len(), 2);
    }

    #[test]
    fn take_moves_value_out_without_dropping() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut vector = ComponentVector::for_type::<Tracked>();
        vector.emplace(entity(4), tracked(&drops, "kept"));

        let (slot, value) = vector.take::<Tracked>(entity(4)).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(value.label, "kept");
        assert!(vector.is_empty());

        drop(value);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_destructor_in_erase_still_closes_the_gap() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut vector = ComponentVector::for_type::<Brittle>();
        vector.emplace(entity(1), Brittle { drops: Arc::clone(&drops), grumble: true });
        vector.emplace(entity(2), Brittle { drops: Arc::clone(&drops), grumble: false });

        let result = panic::catch_unwind(AssertUnwindSafe(|| vector.erase(entity(1))));
        assert!(result.is_err());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(vector.len(), 1);
        assert_eq!(vector.entity_at(0), Some(entity(2)));

        drop(vector);
        assert_eq!(drops.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn free_and_drop_destroy_every_instance() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut vector = ComponentVector::for_type::<Tracked>();
        for raw in 1..=5 {
            vector.emplace(entity(raw), tracked(&drops, "x"));
        }
        vector.free();
        assert_eq!(drops.load(Ordering::SeqCst), 5);
        assert!(vector.is_empty());

        vector.emplace(entity(6), tracked(&drops, "y"));
        drop(vector);
        assert_eq!(drops.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn for_each_mutates_in_place() {
        let mut vector = ComponentVector::for_type::<Position>();
        for raw in 1..=3 {
            vector.emplace(entity(raw), Position { x: 0, y: 0 });
        }
        vector.for_each::<Position, _>(|owner, pos| pos.x = owner.raw() as i32 * 10);

        let xs: Vec<_> = vector.iter::<Position>().map(|(_, p)| p.x).collect();
        assert_eq!(xs, vec![10, 20, 30]);
    }

    #[test]
    fn handles_go_stale_when_slots_move() {
        let mut vector = ComponentVector::for_type::<Position>();
        vector.reserve(1);
        vector.emplace(entity(1), Position { x: 1, y: 1 });
        let handle = vector.handle(0).unwrap();
        assert_eq!(vector.resolve::<Position>(handle).unwrap().x, 1);

        vector.resolve_mut::<Position>(handle).unwrap().x = 5;
        assert_eq!(vector.get::<Position>(entity(1)).unwrap().x, 5);

        // Full: the next emplace reallocates.
        vector.emplace(entity(2), Position { x: 2, y: 2 });
        assert!(matches!(
            vector.resolve::<Position>(handle),
            Err(SceneError::StaleHandle { slot: 0, .. })
        ));
        assert!(vector.handle(2).is_none());
    }

    #[test]
    fn resolving_with_the_wrong_type_is_rejected() {
        let mut vector = ComponentVector::for_type::<Position>();
        vector.emplace(entity(1), Position { x: 0, y: 0 });
        let handle = vector.handle(0).unwrap();
        assert!(matches!(
            vector.resolve::<Wide>(handle),
            Err(SceneError::ComponentTypeMismatch { expected: 100, actual: 101 })
        ));
    }

    #[test]
    #[should_panic(expected = "accessed as")]
    fn typed_access_checks_the_registered_type() {
        let mut vector = ComponentVector::for_type::<Position>();
        vector.emplace(entity(1), Wide { lanes: [0.0; 4] });
    }

    #[test]
    fn vectors_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ComponentVector>();
    }
}
