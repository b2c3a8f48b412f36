//! Views over the registry: multi-archetype queries with per-row access.
//!
//! A [`View`] declares which components an operation accesses and how
//! (`&C` read-only, `&mut C` read-write) and borrows the list of archetypes
//! matching that declaration. Iterating a view yields one [`SubView`] per
//! archetype; a subview is a thin handle over one storage plus the base
//! pointers of the declared columns, and its row iterator yields
//! `(Entity, item)` tuples.
//!
//! ```rust,ignore
//! let view = registry.view::<(&Position, &mut Velocity)>();
//! view.for_each(|_entity, (position, velocity)| {
//!     velocity.x += position.x * 0.1;
//! });
//! ```
//!
//! The read/write qualifiers are the sole input to the scheduler's dependency
//! analysis; see [`crate::ecs::schedule`].
//!
//! # Aliasing
//!
//! Mutable rows are handed out through a shared storage borrow. This is sound
//! only under the engine's access discipline: within one tick, no two
//! concurrently running systems declare overlapping non-read-only access to
//! the same component unless the application opted into that race (see the
//! scheduler docs). Do not request the same component twice in one view.

pub mod relations;

pub use relations::ViewRelations;

use std::{marker::PhantomData, sync::Arc};

use crate::ecs::{
    component::{Component, component_id},
    entity::Entity,
    registry::Registry,
    storage::ArchetypeStorage,
    types::{ArchetypeId, ComponentId, Signature},
};

/// One declared access of a view: a component and whether the access is
/// read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentAccess {
    pub component: ComponentId,
    pub read_only: bool,
}

/// A single element of a view declaration: `&C` or `&mut C`.
///
/// # Safety
///
/// `make` must return a reference derived from `ptr` at `index` without
/// touching any other row.
pub unsafe trait ViewPart {
    type Component: Component;
    const READ_ONLY: bool;
    type Item<'a>;

    /// Dereferences row `index` of the column at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be the base pointer of a live column with more than `index`
    /// rows, and the aliasing rules for the produced reference must hold.
    unsafe fn make<'a>(ptr: *mut Self::Component, index: usize) -> Self::Item<'a>;
}

unsafe impl<'c, C: Component> ViewPart for &'c C {
    type Component = C;
    const READ_ONLY: bool = true;
    type Item<'a> = &'a C;

    #[inline]
    unsafe fn make<'a>(ptr: *mut C, index: usize) -> &'a C {
        unsafe { &*ptr.add(index) }
    }
}

unsafe impl<'c, C: Component> ViewPart for &'c mut C {
    type Component = C;
    const READ_ONLY: bool = false;
    type Item<'a> = &'a mut C;

    #[inline]
    unsafe fn make<'a>(ptr: *mut C, index: usize) -> &'a mut C {
        unsafe { &mut *ptr.add(index) }
    }
}

/// A view declaration: a single [`ViewPart`] or a tuple of them.
///
/// # Safety
///
/// `ptrs` must capture one valid column base pointer per declared component
/// of `storage`, and `item` must only dereference row `index`.
pub unsafe trait Query {
    type Item<'a>;
    type Ptrs: Copy;

    /// Component ids in declaration order.
    fn component_ids() -> Vec<ComponentId>;

    /// Declared accesses, one per component, in declaration order.
    fn accesses() -> Vec<ComponentAccess>;

    /// Canonical signature of the declaration.
    fn signature() -> Signature {
        Signature::new(Self::component_ids())
    }

    /// Captures the column base pointers for one storage.
    ///
    /// # Safety
    ///
    /// Every declared component must be part of the storage's archetype, and
    /// the storage must not be structurally mutated while the pointers are
    /// in use.
    unsafe fn ptrs(storage: &ArchetypeStorage) -> Self::Ptrs;

    /// Produces the item for row `index`.
    ///
    /// # Safety
    ///
    /// `index` must be below the storage's size at capture time, and each row
    /// must be produced at most once per mutable part.
    unsafe fn item<'a>(ptrs: &Self::Ptrs, index: usize) -> Self::Item<'a>;
}

unsafe impl Query for () {
    type Item<'a> = ();
    type Ptrs = ();

    fn component_ids() -> Vec<ComponentId> {
        Vec::new()
    }

    fn accesses() -> Vec<ComponentAccess> {
        Vec::new()
    }

    unsafe fn ptrs(_storage: &ArchetypeStorage) -> Self::Ptrs {}

    unsafe fn item<'a>(_ptrs: &Self::Ptrs, _index: usize) -> Self::Item<'a> {}
}

unsafe impl<'c, C: Component> Query for &'c C {
    type Item<'a> = &'a C;
    type Ptrs = *mut C;

    fn component_ids() -> Vec<ComponentId> {
        vec![component_id::<C>()]
    }

    fn accesses() -> Vec<ComponentAccess> {
        vec![ComponentAccess {
            component: component_id::<C>(),
            read_only: true,
        }]
    }

    unsafe fn ptrs(storage: &ArchetypeStorage) -> Self::Ptrs {
        storage.column::<C>().base_ptr()
    }

    unsafe fn item<'a>(ptrs: &Self::Ptrs, index: usize) -> Self::Item<'a> {
        unsafe { <&C as ViewPart>::make(*ptrs, index) }
    }
}

unsafe impl<'c, C: Component> Query for &'c mut C {
    type Item<'a> = &'a mut C;
    type Ptrs = *mut C;

    fn component_ids() -> Vec<ComponentId> {
        vec![component_id::<C>()]
    }

    fn accesses() -> Vec<ComponentAccess> {
        vec![ComponentAccess {
            component: component_id::<C>(),
            read_only: false,
        }]
    }

    unsafe fn ptrs(storage: &ArchetypeStorage) -> Self::Ptrs {
        storage.column::<C>().base_ptr()
    }

    unsafe fn item<'a>(ptrs: &Self::Ptrs, index: usize) -> Self::Item<'a> {
        unsafe { <&mut C as ViewPart>::make(*ptrs, index) }
    }
}

macro_rules! tuple_query_impl {
    ($($name:ident),*) => {
        unsafe impl<$($name: ViewPart),*> Query for ($($name,)*) {
            type Item<'a> = ($($name::Item<'a>,)*);
            type Ptrs = ($(*mut $name::Component,)*);

            fn component_ids() -> Vec<ComponentId> {
                vec![$(component_id::<$name::Component>()),*]
            }

            fn accesses() -> Vec<ComponentAccess> {
                vec![$(ComponentAccess {
                    component: component_id::<$name::Component>(),
                    read_only: $name::READ_ONLY,
                }),*]
            }

            unsafe fn ptrs(storage: &ArchetypeStorage) -> Self::Ptrs {
                ($(storage.column::<$name::Component>().base_ptr(),)*)
            }

            #[allow(non_snake_case)]
            unsafe fn item<'a>(ptrs: &Self::Ptrs, index: usize) -> Self::Item<'a> {
                let ($($name,)*) = *ptrs;
                ($(unsafe { <$name as ViewPart>::make($name, index) },)*)
            }
        }
    };
}

crate::impl_for_tuples!(tuple_query_impl);

/// A view over every archetype matching a declaration.
///
/// Cheap to construct: it wraps a snapshot of the matching archetype list.
/// The snapshot reflects the archetypes known at creation time; recreate
/// views after structural changes.
pub struct View<'a, Q: Query> {
    registry: &'a Registry,
    archetypes: Arc<Vec<ArchetypeId>>,
    _marker: PhantomData<fn(Q) -> Q>,
}

impl<'a, Q: Query> View<'a, Q> {
    pub(crate) fn new(registry: &'a Registry, archetypes: Arc<Vec<ArchetypeId>>) -> Self {
        Self {
            registry,
            archetypes,
            _marker: PhantomData,
        }
    }

    /// The archetype ids this view covers.
    #[inline]
    pub fn archetypes(&self) -> &[ArchetypeId] {
        &self.archetypes
    }

    /// Iterates the per-archetype subviews.
    pub fn iter(&self) -> impl Iterator<Item = SubView<'a, Q>> + '_ {
        let registry = self.registry;
        self.archetypes.iter().map(move |&archetype| {
            let storage = registry
                .storage(archetype)
                .expect("storage not initialized");
            SubView::new(storage)
        })
    }

    /// Returns `true` if any covered archetype contains the entity.
    pub fn contains(&self, entity: Entity) -> bool {
        self.iter().any(|sub| sub.contains(entity))
    }

    /// Total number of entities across the covered archetypes.
    pub fn size(&self) -> usize {
        self.iter().map(|sub| sub.size()).sum()
    }

    /// Returns a reference to the `C` of `entity`.
    ///
    /// O(k) in the number of covered archetypes; the entity must be in the
    /// view and `C` must be part of the declaration.
    pub fn unpack<C: Component>(&self, entity: Entity) -> &'a C {
        for sub in self.iter() {
            if sub.contains(entity) {
                return sub.unpack::<C>(entity);
            }
        }

        panic!("entity not in view");
    }

    /// Invokes `f` for every row of every covered archetype.
    ///
    /// Semantically identical to nested iteration; the inner loop is unrolled
    /// two-wide.
    pub fn for_each(&self, mut f: impl FnMut(Entity, Q::Item<'a>)) {
        for sub in self.iter() {
            sub.for_each(&mut f);
        }
    }
}

impl<'v, 'a, Q: Query> IntoIterator for &'v View<'a, Q> {
    type Item = SubView<'a, Q>;
    type IntoIter = std::vec::IntoIter<SubView<'a, Q>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter().collect::<Vec<_>>().into_iter()
    }
}

/// The slice of a view covering a single archetype: one storage plus the
/// captured column base pointers.
pub struct SubView<'a, Q: Query> {
    storage: &'a ArchetypeStorage,
    ptrs: Q::Ptrs,
    _marker: PhantomData<fn(Q) -> Q>,
}

impl<'a, Q: Query> SubView<'a, Q> {
    pub(crate) fn new(storage: &'a ArchetypeStorage) -> Self {
        // SAFETY: relations only route archetypes whose set is a superset of
        // the view's declaration, so every declared column exists.
        let ptrs = unsafe { Q::ptrs(storage) };
        Self {
            storage,
            ptrs,
            _marker: PhantomData,
        }
    }

    /// Returns `true` if the entity is in this archetype.
    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.storage.contains(entity)
    }

    /// Number of entities in this archetype.
    #[inline]
    pub fn size(&self) -> usize {
        self.storage.size()
    }

    /// Returns a reference to the `C` of `entity` in this archetype.
    pub fn unpack<C: Component>(&self, entity: Entity) -> &'a C {
        debug_assert!(self.contains(entity), "entity not in subview");
        self.storage.unpack::<C>(entity)
    }

    /// Double-ended iterator over `(Entity, item)` rows.
    pub fn iter(&self) -> SubViewIter<'a, Q> {
        let entities = entities_slice(self.storage);
        SubViewIter {
            entities,
            ptrs: self.ptrs,
            index: 0,
            end: entities.len(),
        }
    }

    /// Invokes `f` for every row, two rows per trip.
    pub fn for_each(&self, f: &mut impl FnMut(Entity, Q::Item<'a>)) {
        let entities = entities_slice(self.storage);
        let len = entities.len();

        let mut index = 0;
        let mut trips = len >> 1;

        while trips > 0 {
            // SAFETY: index and index + 1 are below len; each row is
            // produced exactly once.
            unsafe {
                f(entities[index], Q::item(&self.ptrs, index));
                f(entities[index + 1], Q::item(&self.ptrs, index + 1));
            }
            index += 2;
            trips -= 1;
        }

        if len & 1 == 1 {
            // SAFETY: the last odd row.
            unsafe { f(entities[index], Q::item(&self.ptrs, index)) };
        }
    }
}

impl<'v, 'a, Q: Query> IntoIterator for &'v SubView<'a, Q> {
    type Item = (Entity, Q::Item<'a>);
    type IntoIter = SubViewIter<'a, Q>;

    fn into_iter(self) -> SubViewIter<'a, Q> {
        self.iter()
    }
}

/// Extends the entity-slice borrow to the storage's lifetime.
fn entities_slice<'a>(storage: &'a ArchetypeStorage) -> &'a [Entity] {
    storage.entities()
}

/// Row iterator of a [`SubView`].
pub struct SubViewIter<'a, Q: Query> {
    entities: &'a [Entity],
    ptrs: Q::Ptrs,
    index: usize,
    end: usize,
}

impl<'a, Q: Query> Iterator for SubViewIter<'a, Q> {
    type Item = (Entity, Q::Item<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.end {
            return None;
        }

        let entity = self.entities[self.index];
        // SAFETY: index is below the captured length; each row is produced
        // exactly once.
        let item = unsafe { Q::item(&self.ptrs, self.index) };
        self.index += 1;
        Some((entity, item))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.index;
        (remaining, Some(remaining))
    }
}

impl<'a, Q: Query> DoubleEndedIterator for SubViewIter<'a, Q> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.index >= self.end {
            return None;
        }

        self.end -= 1;
        let entity = self.entities[self.end];
        // SAFETY: end is below the captured length; each row is produced
        // exactly once.
        let item = unsafe { Q::item(&self.ptrs, self.end) };
        Some((entity, item))
    }
}

impl<'a, Q: Query> ExactSizeIterator for SubViewIter<'a, Q> {}
