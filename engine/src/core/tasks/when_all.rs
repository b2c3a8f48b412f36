//! Completion aggregation over sets of shared tasks.
//!
//! [`when_all`] produces a [`WhenAll`] that completes when the last of the
//! given tasks completes. The implementation is a [`WhenAllCounter`]
//! initialized to the set size plus one trigger continuation per input that
//! counts down on that input's completion; attaching the trigger also starts
//! the input (awaiting is starting).
//!
//! [`WhenAllCounter`] is also used standalone by the scheduler: a step's work
//! is gated on a counter armed with one trigger per dependency step.

use std::sync::Arc;

use super::{latch::AsyncLatch, shared::SharedTask};

/// Count-down gate for a known number of completions.
///
/// A thin wrapper over [`AsyncLatch`] with the when-all vocabulary: one
/// count-down per completed input, released when all inputs completed.
pub struct WhenAllCounter {
    latch: AsyncLatch,
}

impl WhenAllCounter {
    /// Creates a counter expecting `count` completions.
    pub fn new(count: usize) -> Self {
        Self {
            latch: AsyncLatch::new(count),
        }
    }

    /// Records one completion.
    #[inline]
    pub fn count_down(&self) {
        self.latch.count_down();
    }

    /// Whether every expected completion has been recorded.
    #[inline]
    pub fn is_released(&self) -> bool {
        self.latch.is_released()
    }

    /// Defers `continuation` until the counter is released.
    pub fn await_with(&self, continuation: impl FnOnce() + Send + 'static) {
        self.latch.await_with(continuation);
    }

    /// Blocks until the counter is released.
    pub fn wait(&self) {
        self.latch.wait();
    }
}

/// Aggregate completion of a set of tasks; see [`when_all`].
pub struct WhenAll {
    counter: Arc<WhenAllCounter>,
}

impl WhenAll {
    /// Whether every input task has completed.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.counter.is_released()
    }

    /// Defers `continuation` until every input task has completed.
    pub fn await_with(&self, continuation: impl FnOnce() + Send + 'static) {
        self.counter.await_with(continuation);
    }

    /// Blocks the calling thread until every input task has completed.
    ///
    /// This is the bridge a tick's driver uses: completion of everything
    /// before `wait` returns is what orders one run against the next.
    pub fn wait(&self) {
        self.counter.wait();
    }
}

/// Builds the aggregate completion of `tasks`, starting any not yet started.
///
/// An empty set is immediately complete.
pub fn when_all<'t, T, I>(tasks: I) -> WhenAll
where
    T: Send + 'static,
    I: IntoIterator<Item = &'t SharedTask<T>>,
{
    let tasks: Vec<&SharedTask<T>> = tasks.into_iter().collect();

    let counter = Arc::new(WhenAllCounter::new(tasks.len()));

    // One trigger per input: awaiting starts the input, and its completion
    // counts the aggregate down.
    for task in &tasks {
        let counter = Arc::clone(&counter);
        task.await_with(move || counter.count_down());
    }

    WhenAll { counter }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tasks::{executor::Executor, task::Task};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn empty_set_is_immediately_complete() {
        // Given
        let all = when_all(std::iter::empty::<&SharedTask<()>>());

        // Then
        assert!(all.is_complete());
        all.wait(); // must not block
    }

    #[test]
    fn completes_when_last_task_completes() {
        // Given
        let executor = Executor::new(2);
        let handle = executor.handle();

        let tasks: Vec<SharedTask<u32>> = (0..4)
            .map(|index| SharedTask::scheduled(Task::new(move || index), &handle))
            .collect();

        // When
        let all = when_all(&tasks);
        all.wait();

        // Then
        assert!(all.is_complete());
        for (index, task) in tasks.iter().enumerate() {
            assert_eq!(task.result(), Some(index as u32));
        }
    }

    #[test]
    fn attaching_triggers_starts_lazy_tasks() {
        // Given - inline tasks: nothing has driven them yet
        let runs = std::sync::Arc::new(AtomicU32::new(0));
        let tasks: Vec<SharedTask<()>> = (0..3)
            .map(|_| {
                let runs = std::sync::Arc::clone(&runs);
                SharedTask::new(Task::new(move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                }))
            })
            .collect();
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        // When
        let all = when_all(&tasks);

        // Then - awaiting started every input
        assert!(all.is_complete());
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn counter_gates_until_all_count_downs() {
        // Given
        let counter = WhenAllCounter::new(2);
        let fired = std::sync::Arc::new(AtomicU32::new(0));

        let fired_clone = std::sync::Arc::clone(&fired);
        counter.await_with(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        // When / Then
        counter.count_down();
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        counter.count_down();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(counter.is_released());
    }

    #[test]
    fn completes_with_failed_members() {
        // Given
        let executor = Executor::new(2);
        let handle = executor.handle();

        let good = SharedTask::scheduled(Task::new(|| ()), &handle);
        let bad: SharedTask<()> =
            SharedTask::scheduled(Task::new(|| panic!("member failed")), &handle);

        // When - aggregation completes even though one member panicked
        let all = when_all([&good, &bad]);
        all.wait();

        // Then
        assert!(all.is_complete());
        assert!(bad.failed());
        assert!(!good.failed());
    }
}
