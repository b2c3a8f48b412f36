//! Dependency-aware parallel scheduling of systems.
//!
//! The [`Scheduler`] consumes a sequence of stages, derives a dependency DAG
//! from the systems' declared component accesses, and drives the resulting
//! steps on the worker pool with as much parallelism as the dependencies
//! allow.
//!
//! # Usage
//!
//! ```rust,ignore
//! define_stage!(Simulate, Render);
//!
//! let mut scheduler = Scheduler::new();
//! scheduler.add_system(Simulate, movement_system);
//! scheduler.add_system(Simulate, collision_system);
//! scheduler.add_system(Render, draw_system);
//!
//! let executor = Executor::default();
//! loop {
//!     scheduler.schedule(Simulate);
//!     scheduler.schedule(Render);
//!     scheduler.run_all(&registry, &executor);
//! }
//! ```
//!
//! # Ordering model
//!
//! A stage acts as a barrier *for dependent pairs only*: a system cannot run
//! before a system of an earlier stage that shares a component access with
//! at least one writer. Independent systems flow freely across stage
//! boundaries.
//!
//! Within one stage, no ordering is inferred. Two same-stage systems without
//! an explicit `after`/`before` constraint are siblings **even if both write
//! the same component**: they may run in any order, including concurrently,
//! and their writes may interleave. Declaring intra-stage intent is the
//! application author's responsibility. If two systems must not race, put
//! them in different stages or constrain them explicitly.
//!
//! # Step caching
//!
//! Building the step DAG is expensive; running from cache is nearly free.
//! The scheduler records every distinct sequence of [`schedule`] calls
//! between [`run_all`] invocations in a trie keyed by stage identity and
//! bakes the step list once per sequence. Stages must be treated as
//! immutable once scheduled: mutating a stage afterwards silently
//! invalidates the cached graphs.
//!
//! # Execution
//!
//! Each step becomes a shared task gated by a counter initialized to its
//! dependency count, with one trigger continuation per dependency. A step is
//! submitted to the pool the moment its last dependency finishes; the
//! aggregate of all step tasks is awaited before `run_all` returns. The
//! completion of a dependency happens-before the dependent's executor
//! starts, and completion of the whole run happens-before `run_all` returns.
//!
//! # Failure
//!
//! A panicking system marks its step failed. Steps already eligible run to
//! completion; steps depending on the failed one (directly or transitively)
//! never start their system. The first panic payload is rethrown from
//! `run_all` on the calling thread.
//!
//! [`schedule`]: Scheduler::schedule
//! [`run_all`]: Scheduler::run_all

mod access;
pub mod graph;
pub mod stage;
pub mod system;

pub use graph::Step;
pub use stage::{Id, Label, Stage, SystemOrder};
pub use system::{Context, QuerySystem, System, SystemHandle, SystemObject, query_system};

use std::{
    collections::HashMap,
    panic,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    core::tasks::{Executor, SharedTask, WhenAllCounter, when_all},
    ecs::registry::Registry,
};

/// Runs registered stages' systems with maximum dependency-respecting
/// parallelism.
#[derive(Default)]
pub struct Scheduler {
    /// One stage per label.
    stages: HashMap<Id, Stage>,

    /// Baked step lists per distinct stage sequence.
    cache: Cache,
}

impl Scheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self {
            stages: HashMap::new(),
            cache: Cache::new(),
        }
    }

    /// Adds a system to the stage identified by `label`, returning the
    /// builder for explicit ordering constraints.
    pub fn add_system<L: Label>(&mut self, label: L, system: impl System) -> SystemOrder<'_> {
        self.stages
            .entry(label.id())
            .or_default()
            .add_system(system)
    }

    /// Appends the stage to the current run's stage sequence.
    ///
    /// The sequence is consumed (and its cursor reset) by [`run_all`];
    /// schedule the wanted stages before every run.
    ///
    /// [`run_all`]: Self::run_all
    pub fn schedule<L: Label>(&mut self, label: L) {
        let id = label.id();
        self.stages.entry(id).or_default();
        self.cache.add(id);
    }

    /// Returns the stage for a label, if any system was added or the stage
    /// was scheduled.
    pub fn stage<L: Label>(&self, label: L) -> Option<&Stage> {
        self.stages.get(&label.id())
    }

    /// Bakes (or fetches) the step list for the scheduled sequence without
    /// running it. Mainly useful for inspection and tests.
    pub fn bake(&mut self) -> &[Step] {
        self.cache.build(&self.stages)
    }

    /// Runs every scheduled stage's systems, driving the baked step graph on
    /// `executor` and blocking until the run completes.
    ///
    /// With nothing scheduled this is a no-op. A panic from a system resumes
    /// on this thread after the run drains; see the module docs.
    pub fn run_all(&mut self, registry: &Registry, executor: &Executor) {
        let steps = self.cache.build(&self.stages);
        execute_steps(steps, registry, executor);
    }
}

/// Trie of stage sequences with baked steps per node.
struct Cache {
    nodes: Vec<Node>,

    /// Index of the node for the sequence scheduled so far; 0 is the root.
    current: usize,
}

struct Node {
    parent: usize,
    stage: Option<Id>,
    children: Vec<usize>,
    steps: Option<Vec<Step>>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: 0,
                stage: None,
                children: Vec::new(),
                // The empty sequence bakes to no steps.
                steps: Some(Vec::new()),
            }],
            current: 0,
        }
    }

    /// Extends the current sequence by one stage, reusing an existing path
    /// when this sequence was seen before.
    fn add(&mut self, stage: Id) {
        let existing = self.nodes[self.current]
            .children
            .iter()
            .copied()
            .find(|&child| self.nodes[child].stage == Some(stage));

        self.current = match existing {
            Some(child) => child,
            None => {
                let child = self.nodes.len();
                self.nodes.push(Node {
                    parent: self.current,
                    stage: Some(stage),
                    children: Vec::new(),
                    steps: None,
                });
                self.nodes[self.current].children.push(child);
                child
            }
        };
    }

    /// Returns the baked steps for the current sequence, computing and
    /// memoizing them on first sight, and resets the cursor to the root.
    fn build(&mut self, stages: &HashMap<Id, Stage>) -> &[Step] {
        let current = self.current;
        self.current = 0;

        if self.nodes[current].steps.is_none() {
            let mut sequence = Vec::new();
            let mut walk = current;
            while walk != 0 {
                sequence.push(self.nodes[walk].stage.expect("non-root node without stage"));
                walk = self.nodes[walk].parent;
            }
            sequence.reverse();

            let stage_refs: Vec<&Stage> = sequence
                .iter()
                .map(|id| stages.get(id).expect("scheduled stage missing"))
                .collect();

            let steps = graph::compute_steps(&stage_refs);
            log::debug!(
                "baked schedule: {} stages, {} steps",
                stage_refs.len(),
                steps.len()
            );

            self.nodes[current].steps = Some(steps);
        }

        self.nodes[current].steps.as_ref().expect("steps just baked")
    }
}

/// Drives a baked step list to completion on the executor.
fn execute_steps(steps: &[Step], registry: &Registry, executor: &Executor) {
    if steps.is_empty() {
        return;
    }

    log::trace!("running {} steps", steps.len());

    // SAFETY: every task spawned below completes before the `wait` at the
    // bottom returns, and all task state is dropped before this frame ends,
    // so the erased borrow never outlives the registry.
    let registry: &'static Registry = unsafe { std::mem::transmute(registry) };

    let handle = executor.handle();

    let mut tasks: Vec<SharedTask<()>> = Vec::with_capacity(steps.len());
    let mut taints: Vec<Arc<AtomicBool>> = Vec::with_capacity(steps.len());

    for step in steps {
        // Set when a dependency failed or was itself skipped; the step then
        // completes without starting its system.
        let tainted = Arc::new(AtomicBool::new(false));

        // Dependencies are earlier steps, so their tasks already exist.
        let dependencies: Vec<(SharedTask<()>, Arc<AtomicBool>)> = step
            .dependencies()
            .iter()
            .map(|&dependency| (tasks[dependency].clone(), Arc::clone(&taints[dependency])))
            .collect();

        let system = step.system().clone();
        let context = Context::new(registry, handle.clone());
        let submit_handle = handle.clone();
        let launcher_tainted = Arc::clone(&tainted);

        // The step's shared task: on first await, gate the body behind a
        // counter of the dependencies, with one trigger per dependency.
        let task = SharedTask::deferred(move |this: SharedTask<()>| {
            let counter = Arc::new(WhenAllCounter::new(dependencies.len()));

            // Arm the submission first so a released counter (no or already
            // finished dependencies) submits immediately.
            {
                let tainted = Arc::clone(&launcher_tainted);
                let body = move || {
                    let outcome = if tainted.load(Ordering::Acquire) {
                        // A dependency failed; the executor never starts.
                        Ok(())
                    } else {
                        panic::catch_unwind(panic::AssertUnwindSafe(|| {
                            system.run_task(context.clone()).run();
                        }))
                    };
                    this.finish(outcome);
                };

                counter.await_with(move || submit_handle.execute(body));
            }

            // Triggers: each dependency's completion counts the gate down,
            // propagating failure and skips.
            for (dependency, dependency_taint) in dependencies {
                let counter = Arc::clone(&counter);
                let tainted = Arc::clone(&launcher_tainted);
                let probe = dependency.clone();
                dependency.await_with(move || {
                    if probe.failed() || dependency_taint.load(Ordering::Acquire) {
                        tainted.store(true, Ordering::Release);
                    }
                    counter.count_down();
                });
            }
        });

        tasks.push(task);
        taints.push(tainted);
    }

    // Awaiting starts everything; completion of the last step releases us.
    when_all(&tasks).wait();

    // Rethrow the first failure in step order on the caller.
    for task in &tasks {
        if task.failed()
            && let Some(payload) = task.take_panic()
        {
            panic::resume_unwind(payload);
        }
    }
}
