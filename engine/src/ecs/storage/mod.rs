//! Dense columnar storage for a single archetype.
//!
//! An [`ArchetypeStorage`] holds every entity of one archetype in
//! struct-of-arrays form: a dense array of entities plus one dense column per
//! component type, all kept in lockstep. Membership is answered by a sparse
//! set over the registry-wide [`SharedSparseArray`].
//!
//! # Invariants
//!
//! For a storage `S` and entity `e`, `S.contains(e)` holds exactly when
//! `e < sparse.capacity && sparse[e] < dense.len && dense[sparse[e]] == e`.
//! For every component type `C` in the archetype, `col[C][sparse[e]]` is the
//! `C` belonging to `e`.
//!
//! Insertion order is not preserved: erase is an O(1) swap-with-back on the
//! dense array and every column. No pointer stability is guaranteed; any
//! mutation may relocate rows.
//!
//! # Type erasure
//!
//! The storage itself carries no component type parameters. The exact
//! component set is captured once by [`initialize`](ArchetypeStorage::initialize),
//! which creates the columns and installs two monomorphized function pointers
//! (erase-at-index and clear-all) that dispatch to every column of the tuple.
//! All other operations take a single component type and go through the
//! erased column map.

pub mod sparse;

pub use sparse::SharedSparseArray;

use std::{any::Any, cell::UnsafeCell, sync::Arc};

use crate::{
    containers::TypeMap,
    ecs::{
        component::{Component, ComponentSet, component_id},
        entity::Entity,
        types::Signature,
    },
};

/// A dense component column. Interior mutability lets view iteration hand out
/// mutable rows through a shared storage reference; the scheduler's access
/// discipline (single writer per component per tick) is what makes that
/// sound.
pub(crate) struct Column<C>(UnsafeCell<Vec<C>>);

// SAFETY: components are `Send + Sync`; concurrent mutable access is excluded
// by the scheduler's access discipline, not by this type.
unsafe impl<C: Component> Sync for Column<C> {}

impl<C: Component> Column<C> {
    fn new() -> Self {
        Self(UnsafeCell::new(Vec::new()))
    }

    #[inline]
    fn vec_mut(&mut self) -> &mut Vec<C> {
        self.0.get_mut()
    }

    /// Slice over the live rows.
    #[inline]
    fn as_slice(&self) -> &[C] {
        // SAFETY: shared read; structural mutation requires `&mut` access.
        unsafe { &*self.0.get() }
    }

    /// Base pointer for raw row access during view iteration.
    #[inline]
    pub(crate) fn base_ptr(&self) -> *mut C {
        // SAFETY: pointer dereference sites carry the aliasing obligation.
        unsafe { (*self.0.get()).as_mut_ptr() }
    }
}

type ErasedColumn = Box<dyn Any + Send + Sync>;

fn noop_erase(_: &mut ArchetypeStorage, _: usize) {}
fn noop_clear(_: &mut ArchetypeStorage) {}

/// Sparse-set storage holding all entities of one archetype in dense columns.
pub struct ArchetypeStorage {
    /// Dense array of entities; `dense[sparse[e]] == e` for contained `e`.
    dense: Vec<Entity>,

    /// Registry-wide sparse array, shared with the other storages.
    sparse: Arc<SharedSparseArray>,

    /// One erased `Column<C>` per component type, indexed by component id.
    pools: TypeMap<ErasedColumn>,

    /// Erases row `index` from every column. Installed by `initialize`.
    erase_fn: fn(&mut ArchetypeStorage, usize),

    /// Clears every column. Installed by `initialize`.
    clear_fn: fn(&mut ArchetypeStorage),

    /// The exact component set this storage was initialized with.
    signature: Signature,
}

impl ArchetypeStorage {
    /// Creates an uninitialized storage bound to the registry's sparse array.
    pub(crate) fn new(sparse: Arc<SharedSparseArray>) -> Self {
        Self {
            dense: Vec::new(),
            sparse,
            pools: TypeMap::new(),
            erase_fn: noop_erase,
            clear_fn: noop_clear,
            signature: Signature::empty(),
        }
    }

    /// Captures the exact component set of the archetype, creating one column
    /// per component type and installing the erased dispatchers.
    ///
    /// Must be called exactly once, before any insert.
    pub(crate) fn initialize<S: ComponentSet>(&mut self) {
        debug_assert!(
            self.dense.is_empty() && self.pools.is_empty(),
            "storage already initialized"
        );

        self.signature = S::signature();
        S::install(self);
        self.erase_fn = S::erase_at;
        self.clear_fn = S::clear_columns;
    }

    /// Inserts `entity` with one value per component of the archetype.
    ///
    /// The entity must not already be contained, and `S` must be the exact
    /// set captured at initialize time.
    pub(crate) fn insert<S: ComponentSet>(&mut self, entity: Entity, components: S) {
        debug_assert!(!self.contains(entity), "entity already in storage");
        debug_assert_eq!(
            S::signature(),
            self.signature,
            "component set does not match archetype"
        );

        // SAFETY: `&mut self` implies exclusive registry access.
        unsafe {
            self.sparse.assure(entity);
            self.sparse.set(entity, self.dense.len() as u32);
        }

        self.dense.push(entity);
        components.push(self);
    }

    /// Erases `entity` by swapping the back row into its place in the dense
    /// array and every column.
    pub(crate) fn erase(&mut self, entity: Entity) {
        debug_assert!(self.contains(entity), "entity not in storage");

        let index = self.sparse.get(entity).expect("entity has no sparse slot") as usize;
        let back = *self.dense.last().expect("storage is empty");

        // Redirect the swapped-in back entity before the dense swap. When the
        // erased row is the back row this rewrites the victim's own slot,
        // which is harmless.
        // SAFETY: `&mut self` implies exclusive registry access.
        unsafe { self.sparse.set(back, index as u32) };

        self.dense.swap_remove(index);
        let erase = self.erase_fn;
        erase(self, index);
    }

    /// Destroys every row. The sparse array is left dirty, which is harmless:
    /// `contains` self-verifies against the now-empty dense array.
    pub(crate) fn clear(&mut self) {
        self.dense.clear();
        let clear = self.clear_fn;
        clear(self);
    }

    /// The self-verifying containment check.
    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        match self.sparse.get(entity) {
            Some(index) => {
                (index as usize) < self.dense.len() && self.dense[index as usize] == entity
            }
            None => false,
        }
    }

    /// Returns a reference to the `C` of `entity`.
    ///
    /// The entity must be contained and `C` must be part of the archetype.
    pub fn unpack<C: Component>(&self, entity: Entity) -> &C {
        debug_assert!(self.contains(entity), "entity not in storage");

        let index = self.sparse.get(entity).expect("entity has no sparse slot") as usize;
        &self.column::<C>().as_slice()[index]
    }

    /// Returns a mutable reference to the `C` of `entity`.
    pub fn unpack_mut<C: Component>(&mut self, entity: Entity) -> &mut C {
        debug_assert!(self.contains(entity), "entity not in storage");

        let index = self.sparse.get(entity).expect("entity has no sparse slot") as usize;
        &mut self.column_vec_mut::<C>()[index]
    }

    /// Returns the entire column for `C`, for tight iteration.
    pub fn access<C: Component>(&self) -> &[C] {
        self.column::<C>().as_slice()
    }

    /// Dense array of contained entities.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.dense
    }

    /// Number of entities in the storage.
    #[inline]
    pub fn size(&self) -> usize {
        self.dense.len()
    }

    /// Returns `true` if the storage holds no entities.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// The component set captured at initialize time.
    #[inline]
    pub(crate) fn signature(&self) -> &Signature {
        &self.signature
    }

    // Column plumbing used by `ComponentSet` and the view machinery.

    pub(crate) fn column<C: Component>(&self) -> &Column<C> {
        self.pools
            .get(component_id::<C>().index())
            .expect("component not part of archetype")
            .downcast_ref::<Column<C>>()
            .expect("column type mismatch")
    }

    fn column_vec_mut<C: Component>(&mut self) -> &mut Vec<C> {
        self.pools
            .get_mut(component_id::<C>().index())
            .expect("component not part of archetype")
            .downcast_mut::<Column<C>>()
            .expect("column type mismatch")
            .vec_mut()
    }

    pub(crate) fn register_column<C: Component>(&mut self) {
        let replaced = self
            .pools
            .insert(component_id::<C>().index(), Box::new(Column::<C>::new()));
        debug_assert!(replaced.is_none(), "column registered twice");
    }

    pub(crate) fn push_component<C: Component>(&mut self, value: C) {
        self.column_vec_mut::<C>().push(value);
    }

    pub(crate) fn swap_remove_component<C: Component>(&mut self, index: usize) {
        self.column_vec_mut::<C>().swap_remove(index);
    }

    pub(crate) fn clear_column<C: Component>(&mut self) {
        self.column_vec_mut::<C>().clear();
    }
}
