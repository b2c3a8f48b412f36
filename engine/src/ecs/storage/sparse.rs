//! Entity-indexed sparse array shared by every storage of a registry.
//!
//! Each [`ArchetypeStorage`](super::ArchetypeStorage) needs a sparse array
//! mapping an entity id to its row in the dense arrays. Rather than one array
//! per storage, all storages of a registry share a single allocation: an
//! entity lives in exactly one storage at a time, so the slot for an entity is
//! only meaningful to the storage that currently owns it.
//!
//! # Slot collisions
//!
//! When an entity migrates (destroy in one archetype, create in another), the
//! new owner overwrites the slot. A storage that no longer owns the entity may
//! therefore read a stale index from the shared array. That is safe because
//! every read goes through the self-verifying containment check
//! `entity < capacity && sparse[entity] < dense.len && dense[sparse[entity]] == entity`,
//! which can only pass in the owning storage. Do not read slots outside that
//! check.
//!
//! # Concurrency
//!
//! Mutating methods are `unsafe` and require the caller to hold exclusive
//! access to the owning registry (structural operations are command-style and
//! never run while systems are in flight). Reads may happen concurrently from
//! any number of view iterations during a tick.

use std::cell::UnsafeCell;

use crate::ecs::entity::Entity;

/// A growable `u32` slot array indexed by entity id, shared by reference
/// (via `Arc`) between the storages of one registry.
#[derive(Debug, Default)]
pub struct SharedSparseArray {
    slots: UnsafeCell<Vec<u32>>,
}

// SAFETY: all mutation goes through `unsafe` methods whose contract demands
// exclusive registry access; concurrent use is read-only.
unsafe impl Sync for SharedSparseArray {}

impl SharedSparseArray {
    /// Creates an empty sparse array.
    pub fn new() -> Self {
        Self {
            slots: UnsafeCell::new(Vec::new()),
        }
    }

    /// Number of slots currently allocated.
    #[inline]
    pub fn capacity(&self) -> usize {
        // SAFETY: shared read; writers hold exclusive registry access.
        unsafe { (*self.slots.get()).len() }
    }

    /// Grows the array so `entity` has a slot. New slots are zeroed.
    ///
    /// # Safety
    ///
    /// Caller must have exclusive access to the registry owning this array;
    /// no concurrent reads or writes may be in flight.
    pub(crate) unsafe fn assure(&self, entity: Entity) {
        let slots = unsafe { &mut *self.slots.get() };
        if entity.index() >= slots.len() {
            slots.resize(entity.index() + 1, 0);
        }
    }

    /// Writes the dense index for `entity`.
    ///
    /// # Safety
    ///
    /// Caller must have exclusive access to the registry owning this array,
    /// and `entity` must have a slot (see [`assure`](Self::assure)).
    pub(crate) unsafe fn set(&self, entity: Entity, index: u32) {
        let slots = unsafe { &mut *self.slots.get() };
        debug_assert!(entity.index() < slots.len(), "entity has no sparse slot");
        slots[entity.index()] = index;
    }

    /// Reads the slot for `entity`, or `None` if the entity is beyond the
    /// current capacity.
    ///
    /// The returned value is only meaningful inside the containment check of
    /// the storage that owns the entity.
    #[inline]
    pub fn get(&self, entity: Entity) -> Option<u32> {
        // SAFETY: shared read; writers hold exclusive registry access.
        unsafe { (&*self.slots.get()).get(entity.index()).copied() }
    }
}
