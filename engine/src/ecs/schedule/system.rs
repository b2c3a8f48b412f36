//! Systems: callable units with declared component access.
//!
//! A [`System`] declares which components it touches (and how) and, when
//! invoked with a [`Context`], produces the lazy task that does the work.
//! The declared access is the *sole* input to the scheduler's dependency
//! analysis; a system that touches components it did not declare breaks the
//! engine's aliasing discipline.
//!
//! Most systems are built from a view declaration and a closure:
//!
//! ```rust,ignore
//! let movement = query_system::<(&Velocity, &mut Position), _>(|view| {
//!     view.for_each(|_entity, (vel, pos)| {
//!         pos.x += vel.x;
//!     });
//! });
//! scheduler.add_system(Update, movement);
//! ```
//!
//! Hand-written `System` impls are the escape hatch for systems spanning
//! several views or doing their own task composition.

use std::{marker::PhantomData, sync::Arc};

use crate::{
    core::tasks::{ExecutorHandle, Task},
    ecs::{
        registry::Registry,
        schedule::access::Access,
        view::{ComponentAccess, Query, View},
    },
};

/// What a system receives when invoked: the world and a handle to the worker
/// pool it runs on.
#[derive(Clone)]
pub struct Context<'e> {
    registry: &'e Registry,
    executor: ExecutorHandle,
}

impl<'e> Context<'e> {
    pub(crate) fn new(registry: &'e Registry, executor: ExecutorHandle) -> Self {
        Self { registry, executor }
    }

    /// The registry systems read from and write to.
    #[inline]
    pub fn registry(&self) -> &'e Registry {
        self.registry
    }

    /// Obtains a view for the declared components.
    ///
    /// Sound for components the running system declared: the scheduler fences
    /// conflicting accesses from other stages, and same-stage conflicts only
    /// exist where the application explicitly opted in (see the scheduler
    /// docs on sibling races).
    pub fn view<Q: Query>(&self) -> View<'e, Q> {
        // SAFETY: the scheduler's dependency fences uphold the access
        // discipline for declared components.
        unsafe { self.registry.view_unchecked() }
    }

    /// Handle to the worker pool driving this tick.
    #[inline]
    pub fn executor(&self) -> &ExecutorHandle {
        &self.executor
    }
}

/// A callable unit declaring its component accesses and producing a task per
/// invocation.
pub trait System: Send + Sync + 'static {
    /// Diagnostic name, used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// The declared component accesses. Called once; the result is cached by
    /// [`SystemObject`].
    fn data_access(&self) -> Vec<ComponentAccess>;

    /// Produces the task performing one update. The task is lazy; the
    /// scheduler drives it on the worker pool.
    fn run<'e>(&'e self, ctx: Context<'e>) -> Task<'e, ()>;
}

/// Pointer identity of a registered system, used in explicit-order relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemHandle(usize);

/// A ref-counted system with its access list resolved once.
#[derive(Clone)]
pub struct SystemObject {
    system: Arc<dyn System>,
    access: Arc<Vec<ComponentAccess>>,
    bits: Arc<Access>,
}

impl SystemObject {
    /// Wraps a system, resolving and caching its declared access.
    pub fn new(system: impl System) -> Self {
        let access = system.data_access();
        let bits = Access::from_declared(&access);

        Self {
            system: Arc::new(system),
            access: Arc::new(access),
            bits: Arc::new(bits),
        }
    }

    /// Stable identity of this system object.
    #[inline]
    pub fn handle(&self) -> SystemHandle {
        SystemHandle(Arc::as_ptr(&self.system) as *const () as usize)
    }

    /// Diagnostic name of the wrapped system.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.system.name()
    }

    /// The cached declared accesses.
    #[inline]
    pub fn data_access(&self) -> &[ComponentAccess] {
        &self.access
    }

    /// Whether this system and `other` touch a common component with at
    /// least one write.
    #[inline]
    pub fn has_dependency(&self, other: &SystemObject) -> bool {
        self.bits.depends_on(&other.bits)
    }

    /// Invokes the wrapped system.
    pub(crate) fn run_task<'e>(&'e self, ctx: Context<'e>) -> Task<'e, ()> {
        self.system.run(ctx)
    }
}

/// A system built from a view declaration `Q` and a closure over the view.
pub struct QuerySystem<Q, F> {
    f: F,
    _marker: PhantomData<fn(Q) -> Q>,
}

/// Builds a [`QuerySystem`] from a closure over a view of `Q`.
pub fn query_system<Q, F>(f: F) -> QuerySystem<Q, F>
where
    Q: Query + 'static,
    F: for<'v> Fn(View<'v, Q>) + Send + Sync + 'static,
{
    QuerySystem {
        f,
        _marker: PhantomData,
    }
}

impl<Q, F> System for QuerySystem<Q, F>
where
    Q: Query + 'static,
    F: for<'v> Fn(View<'v, Q>) + Send + Sync + 'static,
{
    fn data_access(&self) -> Vec<ComponentAccess> {
        Q::accesses()
    }

    fn run<'e>(&'e self, ctx: Context<'e>) -> Task<'e, ()> {
        Task::new(move || {
            (self.f)(ctx.view::<Q>());
        })
    }
}
