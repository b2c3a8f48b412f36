//! Precomputed relations between view signatures and archetypes.
//!
//! A view matches every archetype whose component set is a superset of the
//! view's set. Scanning all archetypes per query would be wasteful, so the
//! relation is baked once: the first time an archetype or view signature is
//! observed, the tables are cross-updated so that
//! `view_archetypes[view]` is always the complete, current list of matching
//! archetype ids.
//!
//! The list for a view is partitioned so that the archetype whose set equals
//! the view's set (the exact match, at most one) sits at the front; iteration
//! exploits this for the common exact-signature case.
//!
//! # Concurrency
//!
//! Both assure operations are idempotent and thread-safe. The fast path is a
//! lock-free read of the id map; the slow path takes the module's write lock,
//! re-checks, and performs the initialization once. Per-view archetype lists
//! are handed out as `Arc` snapshots so concurrent bakes never invalidate a
//! borrowed list.

use std::sync::{Arc, RwLock};

use dashmap::DashMap;

use crate::ecs::types::{ArchetypeId, MAX_ARCHETYPES, Signature, ViewId};

/// Relation tables indexed by archetype and view id.
#[derive(Default)]
struct Tables {
    /// Sorted component ids per archetype, indexed by `ArchetypeId`.
    archetype_components: Vec<Signature>,

    /// Sorted component ids per view, indexed by `ViewId`.
    view_components: Vec<Signature>,

    /// Matching archetypes per view, exact match first, indexed by `ViewId`.
    view_archetypes: Vec<Arc<Vec<ArchetypeId>>>,
}

/// Keeps track of which archetypes every view covers, ready for lookup.
pub struct ViewRelations {
    /// Signature to id, lock-free fast path. Entries are published only after
    /// the tables are consistent.
    archetype_ids: DashMap<Signature, ArchetypeId>,
    view_ids: DashMap<Signature, ViewId>,

    tables: RwLock<Tables>,
}

impl Default for ViewRelations {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewRelations {
    /// Creates the relation tables with the empty view pre-assured, which
    /// guarantees the empty signature is first in the view tables.
    pub fn new() -> Self {
        let relations = Self {
            archetype_ids: DashMap::new(),
            view_ids: DashMap::new(),
            tables: RwLock::new(Tables::default()),
        };

        relations.assure_view(&Signature::empty());
        relations
    }

    /// Returns the id for the archetype signature, baking it into the tables
    /// on first observation.
    pub fn assure_archetype(&self, signature: &Signature) -> ArchetypeId {
        // Fast path: already initialized.
        if let Some(existing) = self.archetype_ids.get(signature) {
            return *existing;
        }

        let mut tables = self.tables.write().unwrap();

        // Re-check: another thread may have initialized while we waited.
        if let Some(existing) = self.archetype_ids.get(signature) {
            return *existing;
        }

        let id = ArchetypeId::new(tables.archetype_components.len() as u32);
        assert!(
            id.index() < MAX_ARCHETYPES,
            "archetype cap ({MAX_ARCHETYPES}) exceeded"
        );

        tables.archetype_components.push(signature.clone());

        // Every already-initialized view that covers the new archetype picks
        // it up, exact matches at the front.
        let Tables {
            view_components,
            view_archetypes,
            ..
        } = &mut *tables;
        for (view, view_signature) in view_components.iter().enumerate() {
            if view_signature.is_subset_of(signature) {
                let list = Arc::make_mut(&mut view_archetypes[view]);
                if view_signature == signature {
                    list.insert(0, id);
                } else {
                    list.push(id);
                }
            }
        }

        log::trace!("baked archetype {:?} ({} components)", id, signature.len());

        self.archetype_ids.insert(signature.clone(), id);
        id
    }

    /// Returns the id for the view signature, baking it into the tables on
    /// first observation.
    pub fn assure_view(&self, signature: &Signature) -> ViewId {
        if let Some(existing) = self.view_ids.get(signature) {
            return *existing;
        }

        let mut tables = self.tables.write().unwrap();

        if let Some(existing) = self.view_ids.get(signature) {
            return *existing;
        }

        let id = ViewId::new(tables.view_components.len() as u32);
        assert!(
            id.index() < MAX_ARCHETYPES,
            "view cap ({MAX_ARCHETYPES}) exceeded"
        );

        // Scan all existing archetypes for matches, exact match first.
        let mut archetypes = Vec::new();
        for (archetype, archetype_signature) in tables.archetype_components.iter().enumerate() {
            if signature.is_subset_of(archetype_signature) {
                let archetype = ArchetypeId::new(archetype as u32);
                if signature == archetype_signature {
                    archetypes.insert(0, archetype);
                } else {
                    archetypes.push(archetype);
                }
            }
        }

        tables.view_components.push(signature.clone());
        tables.view_archetypes.push(Arc::new(archetypes));

        log::trace!("baked view {:?} ({} components)", id, signature.len());

        self.view_ids.insert(signature.clone(), id);
        id
    }

    /// Returns the list of archetype ids the view covers, as a cheap `Arc`
    /// snapshot. A snapshot reflects the archetypes known at the time it was
    /// taken; recreate views after structural changes.
    pub fn view_archetypes(&self, id: ViewId) -> Arc<Vec<ArchetypeId>> {
        let tables = self.tables.read().unwrap();
        Arc::clone(&tables.view_archetypes[id.index()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::types::ComponentId;

    fn signature(ids: &[u32]) -> Signature {
        Signature::new(ids.iter().map(|&id| ComponentId::new(id)).collect())
    }

    #[test]
    fn assure_archetype_is_idempotent() {
        // Given
        let relations = ViewRelations::new();
        let sig = signature(&[0, 1]);

        // When
        let first = relations.assure_archetype(&sig);
        let second = relations.assure_archetype(&sig);

        // Then
        assert_eq!(first, second);
    }

    #[test]
    fn assure_view_is_idempotent() {
        // Given
        let relations = ViewRelations::new();
        let sig = signature(&[2]);

        // When
        let first = relations.assure_view(&sig);
        let second = relations.assure_view(&sig);

        // Then
        assert_eq!(first, second);
    }

    #[test]
    fn permuted_signatures_resolve_to_same_archetype() {
        // Given
        let relations = ViewRelations::new();

        // When
        let abc = relations.assure_archetype(&signature(&[0, 1, 2]));
        let cab = relations.assure_archetype(&signature(&[2, 0, 1]));
        let bca = relations.assure_archetype(&signature(&[1, 2, 0]));

        // Then
        assert_eq!(abc, cab);
        assert_eq!(abc, bca);
    }

    #[test]
    fn view_matches_superset_archetypes() {
        // Given
        let relations = ViewRelations::new();
        let ab = relations.assure_archetype(&signature(&[0, 1]));
        let a = relations.assure_archetype(&signature(&[0]));
        let b = relations.assure_archetype(&signature(&[1]));

        // When
        let view = relations.assure_view(&signature(&[0]));
        let archetypes = relations.view_archetypes(view);

        // Then - the view over {A} covers {A} and {A, B} but not {B}
        assert!(archetypes.contains(&ab));
        assert!(archetypes.contains(&a));
        assert!(!archetypes.contains(&b));
        assert_eq!(archetypes.len(), 2);
    }

    #[test]
    fn existing_views_pick_up_new_archetypes() {
        // Given - the view exists before the archetype
        let relations = ViewRelations::new();
        let view = relations.assure_view(&signature(&[3]));
        assert!(relations.view_archetypes(view).is_empty());

        // When
        let archetype = relations.assure_archetype(&signature(&[3, 4]));

        // Then
        assert_eq!(relations.view_archetypes(view).as_slice(), &[archetype]);
    }

    #[test]
    fn exact_match_is_first() {
        // Given
        let relations = ViewRelations::new();
        relations.assure_archetype(&signature(&[0, 1]));
        relations.assure_archetype(&signature(&[0, 1, 2]));
        let exact = relations.assure_archetype(&signature(&[0]));

        // When
        let view = relations.assure_view(&signature(&[0]));
        let archetypes = relations.view_archetypes(view);

        // Then
        assert_eq!(archetypes.len(), 3);
        assert_eq!(archetypes[0], exact);
    }

    #[test]
    fn exact_match_is_first_when_baked_later() {
        // Given - view first, exact archetype after a non-exact one
        let relations = ViewRelations::new();
        let view = relations.assure_view(&signature(&[5]));
        relations.assure_archetype(&signature(&[5, 6]));

        // When
        let exact = relations.assure_archetype(&signature(&[5]));

        // Then
        let archetypes = relations.view_archetypes(view);
        assert_eq!(archetypes.len(), 2);
        assert_eq!(archetypes[0], exact);
    }

    #[test]
    fn empty_view_covers_every_archetype() {
        // Given
        let relations = ViewRelations::new();
        let a = relations.assure_archetype(&signature(&[0]));
        let bc = relations.assure_archetype(&signature(&[1, 2]));

        // When
        let view = relations.assure_view(&Signature::empty());
        let archetypes = relations.view_archetypes(view);

        // Then
        assert!(archetypes.contains(&a));
        assert!(archetypes.contains(&bc));
    }

    #[test]
    fn snapshot_is_stable_across_later_bakes() {
        // Given
        let relations = ViewRelations::new();
        let view = relations.assure_view(&signature(&[0]));
        relations.assure_archetype(&signature(&[0]));
        let snapshot = relations.view_archetypes(view);
        let before = snapshot.len();

        // When - a new matching archetype is baked after the snapshot
        relations.assure_archetype(&signature(&[0, 9]));

        // Then - the old snapshot is unchanged; a fresh one sees the update
        assert_eq!(snapshot.len(), before);
        assert_eq!(relations.view_archetypes(view).len(), before + 1);
    }

    #[test]
    fn concurrent_assure_same_signature_agrees() {
        // Given
        use std::thread;

        let relations = std::sync::Arc::new(ViewRelations::new());
        let sig = signature(&[7, 8]);

        // When
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let relations = std::sync::Arc::clone(&relations);
                let sig = sig.clone();
                thread::spawn(move || relations.assure_archetype(&sig))
            })
            .collect();
        let ids: Vec<ArchetypeId> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Then - every thread observed the same id
        assert!(ids.iter().all(|&id| id == ids[0]));
    }
}
