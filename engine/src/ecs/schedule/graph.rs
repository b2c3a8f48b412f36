//! Step-graph computation for a sequence of stages.
//!
//! Given the scheduled stage sequence, this module derives the dependency
//! DAG and bakes it into a flat, topologically ordered list of
//! [`Step`]s whose `dependencies` index into the same list. The runtime then
//! only has to count down per-step counters; all graph work happens here,
//! once per distinct stage sequence.
//!
//! # Edge rules
//!
//! A system `i` depends on a system `j` when `dependency(i, j)` holds (a
//! common component with at least one non-read-only access, see
//! [`SystemObject::has_dependency`]) *and* one of:
//!
//! - `j` is in an earlier stage (stages are barriers for dependent pairs), or
//! - `j` is in the same stage and an explicit constraint orders `j` before
//!   `i`. Constraints may reference systems registered later in the stage.
//!
//! Same-stage systems with neither constraint are siblings regardless of
//! component overlap: they are free to run in any order, including in
//! parallel. See the scheduler docs for the sibling-race contract.
//!
//! After Kahn's topological sort (a cycle in explicit orders is a
//! programming error and panics), a transitive reduction drops every direct
//! edge already reachable through another path, minimizing the number of
//! counters the runtime synchronizes on.

use crate::{
    containers::Deque,
    ecs::schedule::{stage::Stage, system::SystemObject},
};

/// One baked scheduler step: a system and the indices of the steps it must
/// wait for, both referring into the same topologically ordered list.
#[derive(Clone)]
pub struct Step {
    pub(crate) system: SystemObject,
    pub(crate) dependencies: Vec<usize>,
}

impl Step {
    /// The system this step executes.
    #[inline]
    pub fn system(&self) -> &SystemObject {
        &self.system
    }

    /// Indices of the steps this step waits for.
    #[inline]
    pub fn dependencies(&self) -> &[usize] {
        &self.dependencies
    }
}

/// Computes the baked step list for a stage sequence.
///
/// Expensive; results are cached per sequence by the scheduler.
pub(crate) fn compute_steps(stages: &[&Stage]) -> Vec<Step> {
    // Flatten into (system, owning stage) in sequence order.
    let mut flat: Vec<(&SystemObject, usize)> = Vec::new();
    for (stage_index, stage) in stages.iter().enumerate() {
        for system in stage.systems() {
            flat.push((system, stage_index));
        }
    }

    let count = flat.len();

    // Raw dependency edges, before ordering and reduction.
    let mut dependencies: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut dependants: Vec<Vec<usize>> = vec![Vec::new(); count];

    for i in 0..count {
        let (system, stage_index) = flat[i];

        for (j, &(other, other_stage)) in flat.iter().enumerate() {
            if i == j {
                continue;
            }

            let ordered = if other_stage < stage_index {
                true
            } else if other_stage == stage_index {
                stages[stage_index].has_explicit_order(other.handle(), system.handle())
            } else {
                false
            };

            if ordered && system.has_dependency(other) {
                dependencies[i].push(j);
                dependants[j].push(i);
            }
        }
    }

    // Kahn's algorithm over the raw edges.
    let mut in_degree: Vec<usize> = dependencies.iter().map(Vec::len).collect();

    let mut queue = Deque::with_capacity(count);
    for (index, &degree) in in_degree.iter().enumerate() {
        if degree == 0 {
            queue.push_back(index);
        }
    }

    let mut order: Vec<usize> = Vec::with_capacity(count);

    while let Some(index) = queue.pop_front() {
        order.push(index);

        for &dependant in &dependants[index] {
            in_degree[dependant] -= 1;
            if in_degree[dependant] == 0 {
                queue.push_back(dependant);
            }
        }
    }

    assert!(
        order.len() == count,
        "cycle detected in explicit stage order"
    );

    // Positions of the original indices in topological order.
    let mut position = vec![0usize; count];
    for (topo_index, &original) in order.iter().enumerate() {
        position[original] = topo_index;
    }

    // Rebuild steps in topological order, dropping transitively redundant
    // edges. Scanning candidate dependencies nearest-first lets a direct
    // predecessor absorb the further ones.
    let mut steps: Vec<Step> = Vec::with_capacity(count);

    for &original in &order {
        let mut mapped: Vec<usize> = dependencies[original]
            .iter()
            .map(|&dependency| position[dependency])
            .collect();
        mapped.sort_unstable_by(|a, b| b.cmp(a));

        let mut kept: Vec<usize> = Vec::with_capacity(mapped.len());
        for dependency in mapped {
            if !is_redundant(&steps, &kept, dependency) {
                kept.push(dependency);
            }
        }
        kept.sort_unstable();

        steps.push(Step {
            system: flat[original].0.clone(),
            dependencies: kept,
        });
    }

    steps
}

/// Whether `target` is already reachable from any of `dependencies` by
/// walking dependency edges backwards through `steps`.
fn is_redundant(steps: &[Step], dependencies: &[usize], target: usize) -> bool {
    for &dependency in dependencies {
        if dependency == target
            || is_redundant(steps, &steps[dependency].dependencies, target)
        {
            return true;
        }
    }

    false
}
