//! Dense type identity for components, archetypes and views.
//!
//! Every component type is assigned a small dense integer ([`ComponentId`]) on
//! first use, in first-come order. Archetypes and views get their own dense
//! sequences ([`ArchetypeId`], [`ViewId`]) assigned by the relation tables, so
//! the three sequences stay packed and can index flat vectors directly.
//!
//! Identifiers are stable for the lifetime of the process but are not
//! persistent across processes; callers must treat them as opaque.

use std::{
    any::TypeId as StdTypeId,
    sync::atomic::{AtomicU32, Ordering},
};

use dashmap::DashMap;

/// Hard cap on the number of distinct archetypes (and views) a registry can
/// hold. Sizing the tables up front means concurrent readers never observe a
/// table relocation. Exceeding the cap is a programming error.
pub const MAX_ARCHETYPES: usize = 4096;

/// Dense identifier of a component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(u32);

impl ComponentId {
    #[inline]
    pub(crate) const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Index for use in flat storage (vectors, bitsets).
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Dense identifier of an archetype (a set of component types).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    #[inline]
    pub(crate) const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Index for use in flat storage.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Dense identifier of a view signature (a set of component types an
/// operation wants to access).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewId(u32);

impl ViewId {
    #[inline]
    pub(crate) const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Index for use in flat storage.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Assigns dense integers to Rust types, first-come first-served.
///
/// Reads are lock-free via a sharded concurrent map; the counter is atomic.
/// Repeated queries for the same type always return the same value.
pub(crate) struct TypeIndexer {
    map: DashMap<StdTypeId, u32>,
    next: AtomicU32,
}

impl TypeIndexer {
    pub(crate) fn new() -> Self {
        Self {
            map: DashMap::new(),
            next: AtomicU32::new(0),
        }
    }

    /// Returns the dense index for `T`, assigning one on first call.
    pub(crate) fn assure<T: 'static>(&self) -> u32 {
        let key = StdTypeId::of::<T>();

        // Fast path: lock-free read for already-registered types.
        if let Some(existing) = self.map.get(&key) {
            return *existing;
        }

        // Slow path: the entry API arbitrates racing registrations so both
        // threads observe a single winner.
        match self.map.entry(key) {
            dashmap::Entry::Occupied(occupied) => *occupied.get(),
            dashmap::Entry::Vacant(vacant) => {
                let value = self.next.fetch_add(1, Ordering::Relaxed);
                vacant.insert(value);
                value
            }
        }
    }

    /// Number of types registered so far.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.next.load(Ordering::Relaxed) as usize
    }
}

/// The canonical sorted sequence of component ids identifying an archetype or
/// a view.
///
/// Two call sites that list the same component types in any order resolve to
/// an equal signature, which is what makes archetype and view identifiers
/// permutation-invariant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    ids: Vec<ComponentId>,
}

impl Signature {
    /// Builds a signature from component ids in any order.
    pub fn new(mut ids: Vec<ComponentId>) -> Self {
        ids.sort_unstable();
        debug_assert!(
            ids.windows(2).all(|pair| pair[0] != pair[1]),
            "duplicate component in signature"
        );
        Self { ids }
    }

    /// The empty signature.
    #[inline]
    pub const fn empty() -> Self {
        Self { ids: Vec::new() }
    }

    /// Sorted component ids.
    #[inline]
    pub fn ids(&self) -> &[ComponentId] {
        &self.ids
    }

    /// Number of component types in the signature.
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` for the empty signature.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns `true` if `id` is part of the signature.
    #[inline]
    pub fn contains(&self, id: ComponentId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    /// Returns `true` if every id of `self` appears in `other`.
    pub fn is_subset_of(&self, other: &Signature) -> bool {
        self.ids.iter().all(|id| other.contains(*id))
    }
}
