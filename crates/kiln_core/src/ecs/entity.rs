//! Entity identifiers
//!
//! Entities carry no data of their own; they are keys into component
//! storage. Ids come from a per-scene monotonic generator and are never
//! reused within a session.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;

/// Opaque, non-zero entity identifier.
///
/// Zero is the reserved "invalid entity" value and cannot be represented,
/// so `Option<EntityId>` is the same size as `EntityId`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct EntityId(NonZeroU64);

impl EntityId {
    /// Build an id from its raw value. Returns `None` for zero.
    #[inline]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0.get()
    }

    /// Serialize to little-endian bytes (save files)
    #[inline]
    pub fn to_le_bytes(self) -> [u8; 8] {
        self.raw().to_le_bytes()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic id source. Starts at 1; never hands out the same id twice.
#[derive(Debug, Clone)]
pub(crate) struct EntityGenerator {
    last: u64,
}

impl EntityGenerator {
    pub(crate) fn new() -> Self {
        Self { last: 0 }
    }

    pub(crate) fn next_id(&mut self) -> EntityId {
        // Exhausting 2^64 ids in one session is not a supported scenario.
        self.last = self
            .last
            .checked_add(1)
            .unwrap_or_else(|| panic!("entity id space exhausted"));
        EntityId(NonZeroU64::MIN.saturating_add(self.last - 1))
    }

    /// Make sure future ids are strictly greater than `id`.
    pub(crate) fn advance_past(&mut self, id: EntityId) {
        self.last = self.last.max(id.raw());
    }

    pub(crate) fn last(&self) -> u64 {
        self.last
    }
}
