//! Stages: labeled, ordered groups of systems.
//!
//! A stage is identified by a zero-sized marker type implementing [`Label`]
//! (define them with [`define_stage!`]). Within a stage, systems carry
//! optional explicit before/after constraints; *between* stages, the
//! scheduling order of the stage sequence is the constraint.
//!
//! Treat stages as immutable once scheduled: the scheduler caches baked step
//! graphs per stage sequence, and mutating a stage afterwards silently
//! invalidates those caches.

use std::any::TypeId;

use crate::ecs::schedule::system::{System, SystemHandle, SystemObject};

/// Wrapper struct over a type ID to cleanup the schedule code by providing an
/// opaque stage ID.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct Id(TypeId);

impl Id {
    /// Construct a new ID from a label type.
    #[inline]
    pub const fn new<L: Label>() -> Self {
        Self(TypeId::of::<L>())
    }
}

/// A marker trait for stage identifiers.
///
/// Stage labels are zero-sized types used to identify stages in a
/// [`Scheduler`](crate::ecs::schedule::Scheduler). The trait provides a
/// human-readable name for debugging and logging.
pub trait Label: 'static {
    /// Returns a human-readable name for this stage.
    fn name() -> &'static str;

    /// Get the stage ID for a label.
    fn id(self) -> Id;
}

/// Defines one or more stage label types.
///
/// For each identifier, the macro generates a zero-sized struct implementing
/// [`Label`]:
///
/// ```rust,ignore
/// use ember_engine::define_stage;
///
/// define_stage!(FixedUpdate, Update, Render);
///
/// scheduler.add_system(Update, movement_system);
/// scheduler.schedule(Update);
/// ```
#[macro_export]
macro_rules! define_stage {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
            pub struct $name;

            impl $crate::ecs::schedule::Label for $name {
                #[inline]
                fn name() -> &'static str {
                    stringify!($name)
                }

                fn id(self) -> $crate::ecs::schedule::Id {
                    $crate::ecs::schedule::Id::new::<Self>()
                }
            }
        )*
    };
}

/// Explicit ordering constraints of one registered system.
#[derive(Default)]
struct SystemInfo {
    run_after: Vec<SystemHandle>,
    run_before: Vec<SystemHandle>,
}

/// An ordered group of systems with optional explicit constraints between
/// them.
#[derive(Default)]
pub struct Stage {
    systems: Vec<SystemObject>,
    infos: Vec<SystemInfo>,
}

impl Stage {
    /// Creates an empty stage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a system, returning a builder for its ordering constraints.
    pub fn add_system(&mut self, system: impl System) -> SystemOrder<'_> {
        self.add_system_object(SystemObject::new(system))
    }

    /// Registers an already-wrapped system object.
    pub fn add_system_object(&mut self, system: SystemObject) -> SystemOrder<'_> {
        self.systems.push(system);
        self.infos.push(SystemInfo::default());
        let index = self.systems.len() - 1;

        SystemOrder { stage: self, index }
    }

    /// The registered systems, in registration order.
    #[inline]
    pub fn systems(&self) -> &[SystemObject] {
        &self.systems
    }

    /// Number of registered systems.
    #[inline]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns `true` if no system is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Whether an explicit constraint orders `before` ahead of `after`:
    /// either `before` declared `run_before(after)` or `after` declared
    /// `run_after(before)`. Unregistered handles order nothing.
    pub fn has_explicit_order(&self, before: SystemHandle, after: SystemHandle) -> bool {
        let Some(before_index) = self.index_of(before) else {
            return false;
        };
        let Some(after_index) = self.index_of(after) else {
            return false;
        };

        self.infos[before_index].run_before.contains(&after)
            || self.infos[after_index].run_after.contains(&before)
    }

    fn index_of(&self, handle: SystemHandle) -> Option<usize> {
        self.systems
            .iter()
            .position(|system| system.handle() == handle)
    }
}

/// Builder-pattern interface for ordering a just-registered system.
pub struct SystemOrder<'a> {
    stage: &'a mut Stage,
    index: usize,
}

impl SystemOrder<'_> {
    /// Handle of the system this builder orders, for use in later
    /// constraints.
    pub fn handle(&self) -> SystemHandle {
        self.stage.systems[self.index].handle()
    }

    /// Constrains this system to run after `other` (same stage).
    pub fn after(self, other: SystemHandle) -> Self {
        self.stage.infos[self.index].run_after.push(other);
        self
    }

    /// Constrains this system to run before `other` (same stage).
    pub fn before(self, other: SystemHandle) -> Self {
        self.stage.infos[self.index].run_before.push(other);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::schedule::system::query_system;
    use ember_macros::Component;

    #[derive(Component)]
    struct Marker;

    fn dummy_system() -> impl System {
        query_system::<&Marker, _>(|_view| {})
    }

    #[test]
    fn add_system_registers_in_order() {
        // Given
        let mut stage = Stage::new();

        // When
        let first = stage.add_system(dummy_system()).handle();
        let second = stage.add_system(dummy_system()).handle();

        // Then
        assert_eq!(stage.len(), 2);
        assert_eq!(stage.systems()[0].handle(), first);
        assert_eq!(stage.systems()[1].handle(), second);
    }

    #[test]
    fn run_after_creates_explicit_order() {
        // Given
        let mut stage = Stage::new();
        let first = stage.add_system(dummy_system()).handle();

        // When
        let second = stage.add_system(dummy_system()).after(first).handle();

        // Then
        assert!(stage.has_explicit_order(first, second));
        assert!(!stage.has_explicit_order(second, first));
    }

    #[test]
    fn run_before_creates_explicit_order() {
        // Given
        let mut stage = Stage::new();
        let first = stage.add_system(dummy_system()).handle();
        let second = stage.add_system(dummy_system()).handle();

        // When - a later registration declares it runs before the first
        let third = stage.add_system(dummy_system()).before(first).handle();

        // Then
        assert!(stage.has_explicit_order(third, first));
        assert!(!stage.has_explicit_order(first, third));
        assert!(!stage.has_explicit_order(second, third));
    }

    #[test]
    fn no_constraints_means_no_order() {
        // Given
        let mut stage = Stage::new();
        let a = stage.add_system(dummy_system()).handle();
        let b = stage.add_system(dummy_system()).handle();

        // Then
        assert!(!stage.has_explicit_order(a, b));
        assert!(!stage.has_explicit_order(b, a));
    }

    #[test]
    fn unregistered_handles_order_nothing() {
        // Given
        let mut stage = Stage::new();
        let registered = stage.add_system(dummy_system()).handle();

        let mut other_stage = Stage::new();
        let foreign = other_stage.add_system(dummy_system()).handle();

        // Then
        assert!(!stage.has_explicit_order(foreign, registered));
        assert!(!stage.has_explicit_order(registered, foreign));
    }

    crate::define_stage!(StageA, StageB);

    #[test]
    fn labels_have_distinct_ids() {
        // Then
        assert_ne!(StageA.id(), StageB.id());
        assert_eq!(StageA.id(), StageA.id());
        assert_eq!(StageA::name(), "StageA");
    }
}
