//! The registry: the top-level world where entities and components live.
//!
//! The registry is archetype-aware: entities are grouped by their exact set
//! of component types, and every archetype owns a dense struct-of-arrays
//! storage. An entity lives in exactly one archetype storage at a time.
//!
//! Data access goes through views (see [`crate::ecs::view`]): a view declares
//! the wanted components and their read/write qualification and covers every
//! archetype whose set is a superset of the declaration.
//!
//! # Structural operations are commands
//!
//! `create`, `destroy` and `destroy_all` take `&mut self` and must not be
//! called while the scheduler is running systems against this registry.
//! Issue them between ticks (a command-buffer layer can be built on top).
//!
//! # Example
//!
//! ```rust,ignore
//! let mut registry = Registry::new();
//!
//! let entity = registry.create((Position { x: 0.0, y: 0.0 }, Velocity { x: 1.0, y: 0.0 }));
//!
//! registry.view::<(&Velocity, &mut Position)>().for_each(|_entity, (vel, pos)| {
//!     pos.x += vel.x;
//! });
//!
//! registry.destroy::<(Position, Velocity)>(entity);
//! ```

use std::sync::Arc;

use crate::ecs::{
    component::{Component, ComponentSet},
    entity::{Entity, EntityManager},
    storage::{ArchetypeStorage, SharedSparseArray},
    types::{ArchetypeId, MAX_ARCHETYPES},
    view::{Query, View, ViewRelations},
};

/// Archetype-aware container for all entities and their components.
pub struct Registry {
    /// Sparse array shared by every storage (see [`SharedSparseArray`]).
    mappings: Arc<SharedSparseArray>,

    /// Entity id generator and recycler.
    entities: EntityManager,

    /// View and archetype relation tables.
    relations: ViewRelations,

    /// One storage slot per archetype id; empty until first use.
    storages: Vec<Option<ArchetypeStorage>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        let mut storages = Vec::new();
        storages.resize_with(MAX_ARCHETYPES, || None);

        Self {
            mappings: Arc::new(SharedSparseArray::new()),
            entities: EntityManager::new(),
            relations: ViewRelations::new(),
            storages,
        }
    }

    /// Creates a new entity with the given components and returns its id.
    ///
    /// The component tuple is the entity's archetype. Initializing every
    /// component at creation is the fast path; there is no archetype
    /// migration in this core.
    pub fn create<S: ComponentSet>(&mut self, components: S) -> Entity {
        let archetype = self.relations.assure_archetype(&S::signature());

        if self.storages[archetype.index()].is_none() {
            self.initialize_storage::<S>(archetype);
        }

        let entity = self.entities.obtain();
        self.storages[archetype.index()]
            .as_mut()
            .expect("storage just assured")
            .insert(entity, components);

        entity
    }

    /// Out-of-line cold path: first entity of a new archetype.
    #[cold]
    #[inline(never)]
    fn initialize_storage<S: ComponentSet>(&mut self, archetype: ArchetypeId) {
        log::debug!(
            "initializing storage for archetype {:?} ({} components)",
            archetype,
            S::signature().len()
        );

        let mut storage = ArchetypeStorage::new(Arc::clone(&self.mappings));
        storage.initialize::<S>();
        self.storages[archetype.index()] = Some(storage);
    }

    /// Destroys the entity and all its attached components.
    ///
    /// `S` may be the empty set, a subset, or the exact archetype of the
    /// entity. The more is known, the fewer archetypes are searched: with the
    /// exact archetype destruction is O(1), with a subset it is O(k) in the
    /// view's archetype count.
    pub fn destroy<S: ComponentSet>(&mut self, entity: Entity) {
        let view = self.relations.assure_view(&S::signature());
        let archetypes = self.relations.view_archetypes(view);

        for &archetype in archetypes.iter() {
            let storage = self.storages[archetype.index()]
                .as_mut()
                .expect("storage not initialized");

            if storage.contains(entity) {
                storage.erase(entity);
                self.entities.release(entity);
                return;
            }
        }

        debug_assert!(false, "entity not in view for destroy");
    }

    /// Destroys every entity whose archetype contains all components of `S`.
    ///
    /// With the empty set this clears the whole registry and releases all
    /// entity ids in one bulk operation.
    pub fn destroy_all<S: ComponentSet>(&mut self) {
        let signature = S::signature();
        let view = self.relations.assure_view(&signature);
        let archetypes = self.relations.view_archetypes(view);

        let bulk = signature.is_empty();

        for &archetype in archetypes.iter() {
            let storage = self.storages[archetype.index()]
                .as_mut()
                .expect("storage not initialized");

            if !bulk {
                for &entity in storage.entities() {
                    self.entities.release(entity);
                }
            }

            storage.clear();
        }

        if bulk {
            // Releases everything at once very cheaply.
            self.entities.release_all();
        }
    }

    /// Returns a reference to the `C` of `entity`.
    ///
    /// O(k) in the number of archetypes containing `C`. Prefer unpacking
    /// through view iteration in hot paths.
    pub fn unpack<C: Component>(&self, entity: Entity) -> &C {
        let view = self.relations.assure_view(&<(C,)>::signature());
        let archetypes = self.relations.view_archetypes(view);

        for &archetype in archetypes.iter() {
            let storage = self.storages[archetype.index()]
                .as_ref()
                .expect("storage not initialized");

            if storage.contains(entity) {
                return storage.unpack::<C>(entity);
            }
        }

        panic!("entity does not have the requested component");
    }

    /// Returns a mutable reference to the `C` of `entity`.
    pub fn unpack_mut<C: Component>(&mut self, entity: Entity) -> &mut C {
        let view = self.relations.assure_view(&<(C,)>::signature());
        let archetypes = self.relations.view_archetypes(view);

        for &archetype in archetypes.iter() {
            let storage = self.storages[archetype.index()]
                .as_ref()
                .expect("storage not initialized");

            if storage.contains(entity) {
                return self.storages[archetype.index()]
                    .as_mut()
                    .expect("storage not initialized")
                    .unpack_mut::<C>(entity);
            }
        }

        panic!("entity does not have the requested component");
    }

    /// Returns whether the entity has all components of `S`.
    pub fn has_components<S: ComponentSet>(&self, entity: Entity) -> bool {
        let view = self.relations.assure_view(&S::signature());
        let archetypes = self.relations.view_archetypes(view);

        archetypes.iter().any(|&archetype| {
            self.storages[archetype.index()]
                .as_ref()
                .expect("storage not initialized")
                .contains(entity)
        })
    }

    /// Total number of entities in the registry.
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.entities.circulating_count()
    }

    /// Number of entities whose archetype contains all components of `S`.
    ///
    /// The empty set counts every entity.
    pub fn entity_count_of<S: ComponentSet>(&self) -> usize {
        let signature = S::signature();
        if signature.is_empty() {
            return self.entity_count();
        }

        let view = self.relations.assure_view(&signature);
        let archetypes = self.relations.view_archetypes(view);

        archetypes
            .iter()
            .map(|&archetype| {
                self.storages[archetype.index()]
                    .as_ref()
                    .expect("storage not initialized")
                    .size()
            })
            .sum()
    }

    /// Obtains a view of the registry for the declared components.
    ///
    /// Exclusive borrow: the view (and its possibly-mutable items) cannot
    /// outlive the borrow, so this path is always sound.
    pub fn view<Q: Query>(&mut self) -> View<'_, Q> {
        // SAFETY: the exclusive borrow rules out any concurrent access.
        unsafe { self.view_unchecked() }
    }

    /// Obtains a view through a shared borrow.
    ///
    /// # Safety
    ///
    /// The caller must guarantee the engine's access discipline: while items
    /// of this view are alive, no other code mutates the declared components
    /// except as permitted by the scheduler's dependency analysis. The
    /// scheduler's [`Context`](crate::ecs::schedule::Context) upholds this
    /// for well-formed stage graphs.
    pub unsafe fn view_unchecked<Q: Query>(&self) -> View<'_, Q> {
        let view = self.relations.assure_view(&Q::signature());
        View::new(self, self.relations.view_archetypes(view))
    }

    pub(crate) fn storage(&self, archetype: ArchetypeId) -> Option<&ArchetypeStorage> {
        self.storages[archetype.index()].as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_macros::Component;

    #[derive(Component, Debug, PartialEq)]
    struct Armor(i32);

    #[derive(Component, Debug, PartialEq)]
    struct Mana(f64);

    #[derive(Component, Debug, PartialEq)]
    struct Tag;

    #[test]
    fn create_destroy_round_trip() {
        // Given
        let mut registry = Registry::new();

        // When
        let entity = registry.create((Armor(10), Mana(0.5)));

        // Then
        assert_eq!(registry.entity_count(), 1);
        assert_eq!(registry.unpack::<Armor>(entity), &Armor(10));
        assert_eq!(registry.unpack::<Mana>(entity), &Mana(0.5));

        // When
        registry.destroy::<(Armor, Mana)>(entity);

        // Then
        assert_eq!(registry.entity_count(), 0);
        assert_eq!(registry.entity_count_of::<(Armor,)>(), 0);
        assert_eq!(registry.entity_count_of::<(Mana,)>(), 0);
    }

    #[test]
    fn destroy_with_partial_signature() {
        // Given
        let mut registry = Registry::new();
        let entity = registry.create((Armor(1), Mana(1.0)));

        // When - destroy through a strict subset of the archetype
        registry.destroy::<(Armor,)>(entity);

        // Then
        assert_eq!(registry.entity_count(), 0);
    }

    #[test]
    fn destroy_with_empty_signature() {
        // Given
        let mut registry = Registry::new();
        let entity = registry.create((Armor(1),));

        // When
        registry.destroy::<()>(entity);

        // Then
        assert_eq!(registry.entity_count(), 0);
    }

    #[test]
    fn counts_per_view() {
        // Given
        let mut registry = Registry::new();
        for _ in 0..10 {
            registry.create((Armor(0), Mana(0.0)));
        }
        for _ in 0..10 {
            registry.create((Armor(0),));
        }

        // Then
        assert_eq!(registry.entity_count_of::<(Armor,)>(), 20);
        assert_eq!(registry.entity_count_of::<(Mana,)>(), 10);
        assert_eq!(registry.entity_count_of::<(Armor, Mana)>(), 10);
        assert_eq!(registry.entity_count(), 20);
    }

    #[test]
    fn destroy_all_by_component() {
        // Given
        let mut registry = Registry::new();
        for _ in 0..10 {
            registry.create((Armor(0), Mana(0.0)));
        }
        for _ in 0..10 {
            registry.create((Armor(0),));
        }

        // When
        registry.destroy_all::<(Mana,)>();

        // Then
        assert_eq!(registry.entity_count_of::<(Armor,)>(), 10);
        assert_eq!(registry.entity_count_of::<(Mana,)>(), 0);
        assert_eq!(registry.entity_count(), 10);
    }

    #[test]
    fn destroy_all_bulk_resets_everything() {
        // Given
        let mut registry = Registry::new();
        for _ in 0..5 {
            registry.create((Armor(0),));
            registry.create((Mana(0.0),));
        }

        // When
        registry.destroy_all::<()>();

        // Then
        assert_eq!(registry.entity_count(), 0);
        assert_eq!(registry.entity_count_of::<(Armor,)>(), 0);
        assert_eq!(registry.entity_count_of::<(Mana,)>(), 0);

        // And ids restart from zero
        assert_eq!(registry.create((Armor(0),)).index(), 0);
    }

    #[test]
    fn has_components_checks_subsets() {
        // Given
        let mut registry = Registry::new();
        let full = registry.create((Armor(0), Mana(0.0)));
        let partial = registry.create((Armor(0),));

        // Then
        assert!(registry.has_components::<(Armor,)>(full));
        assert!(registry.has_components::<(Armor, Mana)>(full));
        assert!(registry.has_components::<(Armor,)>(partial));
        assert!(!registry.has_components::<(Armor, Mana)>(partial));
        assert!(!registry.has_components::<(Mana,)>(partial));
    }

    #[test]
    fn view_iterates_matching_archetypes() {
        // Given
        let mut registry = Registry::new();
        registry.create((Armor(1), Mana(1.0)));
        registry.create((Armor(2),));
        registry.create((Mana(3.0),));

        // When
        let mut armors: Vec<i32> = Vec::new();
        registry
            .view::<&Armor>()
            .for_each(|_entity, armor| armors.push(armor.0));

        // Then
        armors.sort();
        assert_eq!(armors, vec![1, 2]);
    }

    #[test]
    fn view_mutates_components() {
        // Given
        let mut registry = Registry::new();
        let entity = registry.create((Armor(1),));

        // When
        registry
            .view::<&mut Armor>()
            .for_each(|_entity, armor| armor.0 += 10);

        // Then
        assert_eq!(registry.unpack::<Armor>(entity), &Armor(11));
    }

    #[test]
    fn view_tuple_query_joins_columns() {
        // Given
        let mut registry = Registry::new();
        registry.create((Armor(2), Mana(4.0)));

        // When
        let mut seen = Vec::new();
        registry
            .view::<(&Armor, &mut Mana)>()
            .for_each(|_entity, (armor, mana)| {
                mana.0 += armor.0 as f64;
                seen.push(mana.0);
            });

        // Then
        assert_eq!(seen, vec![6.0]);
    }

    #[test]
    fn view_with_entities_only() {
        // Given
        let mut registry = Registry::new();
        let a = registry.create((Armor(0),));
        let b = registry.create((Mana(0.0),));

        // When
        let mut entities = Vec::new();
        registry
            .view::<()>()
            .for_each(|entity, ()| entities.push(entity));

        // Then
        entities.sort();
        assert_eq!(entities, vec![a, b]);
    }

    #[test]
    fn entity_ids_are_recycled() {
        // Given
        let mut registry = Registry::new();
        let first = registry.create((Tag,));
        registry.destroy::<(Tag,)>(first);

        // When
        let second = registry.create((Tag,));

        // Then
        assert_eq!(first, second);
        assert_eq!(registry.entity_count(), 1);
    }

    #[test]
    fn unpack_mut_writes_through() {
        // Given
        let mut registry = Registry::new();
        let entity = registry.create((Armor(1),));

        // When
        registry.unpack_mut::<Armor>(entity).0 = 7;

        // Then
        assert_eq!(registry.unpack::<Armor>(entity), &Armor(7));
    }

    #[test]
    fn views_cover_archetypes_created_later() {
        // Given - bake the view before the second archetype exists
        let mut registry = Registry::new();
        registry.create((Armor(1),));
        assert_eq!(registry.entity_count_of::<(Armor,)>(), 1);

        // When
        registry.create((Armor(2), Mana(0.0)));

        // Then - a fresh view snapshot sees both archetypes
        assert_eq!(registry.entity_count_of::<(Armor,)>(), 2);
    }
}
