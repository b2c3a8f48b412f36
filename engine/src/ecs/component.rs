//! Component identity and component tuples.
//!
//! A component is any plain-data type attached to entities; there is no
//! inheritance or registration ceremony beyond deriving [`Component`]:
//!
//! ```rust,ignore
//! use ember_macros::Component;
//!
//! #[derive(Component)]
//! struct Position { x: f32, y: f32 }
//! ```
//!
//! Each component type gets a process-wide dense [`ComponentId`] on first use
//! (see [`component_id`]). Archetype and view signatures are canonical sorted
//! sequences of these ids, so listing the same types in a different order at
//! two call sites resolves to the same identity.
//!
//! [`ComponentSet`] is the tuple-of-values abstraction the storage layer is
//! erased over: `(A, B)` knows how to create its columns, push one value per
//! column, and erase or clear all of them through a function pointer installed
//! at storage-initialize time.

use std::sync::LazyLock;

use crate::ecs::{
    storage::ArchetypeStorage,
    types::{ComponentId, Signature, TypeIndexer},
};

/// Marker trait for component types. Derive it with
/// `#[derive(ember_macros::Component)]`.
///
/// Components must be `Send + Sync` because systems touching them run on the
/// worker pool.
pub trait Component: Send + Sync + 'static {}

/// Process-wide component id sequence, first-come first-served.
static COMPONENTS: LazyLock<TypeIndexer> = LazyLock::new(TypeIndexer::new);

/// Returns the dense id of component type `C`, assigning one on first call.
#[inline]
pub fn component_id<C: Component>() -> ComponentId {
    ComponentId::new(COMPONENTS.assure::<C>())
}

/// A tuple of component values making up an exact archetype.
///
/// Implemented for tuples `(A,)` through `(A, ..., P)` of [`Component`] types
/// and for the empty tuple `()`. The empty set is what signature-only
/// operations (`destroy_all::<()>`, `entity_count::<()>`) use.
pub trait ComponentSet: Send + 'static {
    /// Component ids in declaration order (unsorted).
    fn component_ids() -> Vec<ComponentId>;

    /// Canonical sorted signature for the set.
    fn signature() -> Signature {
        Signature::new(Self::component_ids())
    }

    /// Creates one column per component in `storage`.
    fn install(storage: &mut ArchetypeStorage);

    /// Appends one value per column. Caller keeps the dense entity array in
    /// lockstep.
    fn push(self, storage: &mut ArchetypeStorage);

    /// Swap-erases row `index` from every column of the set.
    ///
    /// Installed into the storage as an erased function pointer.
    fn erase_at(storage: &mut ArchetypeStorage, index: usize);

    /// Clears every column of the set. Installed as an erased function
    /// pointer alongside [`erase_at`](Self::erase_at).
    fn clear_columns(storage: &mut ArchetypeStorage);
}

impl ComponentSet for () {
    fn component_ids() -> Vec<ComponentId> {
        Vec::new()
    }

    fn install(_storage: &mut ArchetypeStorage) {}

    fn push(self, _storage: &mut ArchetypeStorage) {}

    fn erase_at(_storage: &mut ArchetypeStorage, _index: usize) {}

    fn clear_columns(_storage: &mut ArchetypeStorage) {}
}

macro_rules! component_set_impl {
    ($($name:ident),*) => {
        impl<$($name: Component),*> ComponentSet for ($($name,)*) {
            fn component_ids() -> Vec<ComponentId> {
                vec![$(component_id::<$name>()),*]
            }

            fn install(storage: &mut ArchetypeStorage) {
                $(storage.register_column::<$name>();)*
            }

            #[allow(non_snake_case)]
            fn push(self, storage: &mut ArchetypeStorage) {
                let ($($name,)*) = self;
                $(storage.push_component::<$name>($name);)*
            }

            fn erase_at(storage: &mut ArchetypeStorage, index: usize) {
                $(storage.swap_remove_component::<$name>(index);)*
            }

            fn clear_columns(storage: &mut ArchetypeStorage) {
                $(storage.clear_column::<$name>();)*
            }
        }
    };
}

crate::impl_for_tuples!(component_set_impl);

#[cfg(test)]
mod tests {
    use super::*;
    use ember_macros::Component;

    #[derive(Component)]
    struct First;

    #[derive(Component)]
    struct Second;

    #[derive(Component)]
    struct Third;

    #[test]
    fn component_id_is_stable() {
        // Given / When
        let a = component_id::<First>();
        let b = component_id::<First>();

        // Then
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_components_get_distinct_ids() {
        // Then
        assert_ne!(component_id::<First>(), component_id::<Second>());
        assert_ne!(component_id::<First>(), component_id::<Third>());
    }

    #[test]
    fn tuple_signature_is_permutation_invariant() {
        // When
        let abc = <(First, Second, Third)>::signature();
        let cab = <(Third, First, Second)>::signature();
        let bca = <(Second, Third, First)>::signature();

        // Then
        assert_eq!(abc, cab);
        assert_eq!(abc, bca);
    }

    #[test]
    fn empty_set_has_empty_signature() {
        // Then
        assert!(<() as ComponentSet>::signature().is_empty());
    }

    #[test]
    fn widest_tuple_arity_is_supported() {
        // Given - twelve components, the largest supported tuple
        #[derive(Component)]
        struct W0;
        #[derive(Component)]
        struct W1;
        #[derive(Component)]
        struct W2;
        #[derive(Component)]
        struct W3;
        #[derive(Component)]
        struct W4;
        #[derive(Component)]
        struct W5;
        #[derive(Component)]
        struct W6;
        #[derive(Component)]
        struct W7;
        #[derive(Component)]
        struct W8;
        #[derive(Component)]
        struct W9;
        #[derive(Component)]
        struct W10;
        #[derive(Component)]
        struct W11;

        // When
        let forward = <(W0, W1, W2, W3, W4, W5, W6, W7, W8, W9, W10, W11)>::signature();
        let reversed = <(W11, W10, W9, W8, W7, W6, W5, W4, W3, W2, W1, W0)>::signature();

        // Then - full width resolves, and stays permutation-invariant
        assert_eq!(forward.len(), 12);
        assert_eq!(forward, reversed);
    }

    #[test]
    fn tuple_ids_are_in_declaration_order() {
        // Given
        let first = component_id::<First>();
        let second = component_id::<Second>();

        // When
        let ids = <(Second, First)>::component_ids();

        // Then
        assert_eq!(ids, vec![second, first]);
    }
}
