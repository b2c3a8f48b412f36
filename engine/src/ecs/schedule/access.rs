//! Bitset form of a system's declared component access.
//!
//! The dependency analysis hot path compares many access lists pairwise, so
//! the declared `(component, read_only)` pairs are folded once into a pair of
//! bitsets. Bit N set means component id N is accessed.

use fixedbitset::FixedBitSet;

use crate::ecs::view::ComponentAccess;

/// Read and write component sets of one system.
#[derive(Debug, Clone, Default)]
pub(crate) struct Access {
    /// Components accessed read-only.
    reads: FixedBitSet,

    /// Components accessed read-write.
    writes: FixedBitSet,
}

impl Access {
    /// Folds a declared access list into bitsets.
    pub(crate) fn from_declared(accesses: &[ComponentAccess]) -> Self {
        let mut access = Self::default();

        for declared in accesses {
            let index = declared.component.index();
            let set = if declared.read_only {
                &mut access.reads
            } else {
                &mut access.writes
            };
            set.grow(index + 1);
            set.insert(index);
        }

        access
    }

    /// Two systems have a dependency iff they name at least one common
    /// component and at least one of those accesses is not read-only.
    pub(crate) fn depends_on(&self, other: &Access) -> bool {
        !self.writes.is_disjoint(&other.writes)
            || !self.writes.is_disjoint(&other.reads)
            || !other.writes.is_disjoint(&self.reads)
    }
}
