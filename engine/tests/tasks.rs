//! Task-primitive scenarios: shared-task fanout through a latch, aggregate
//! completion, blocking waits.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    thread,
    time::Duration,
};

use ember_engine::core::tasks::{
    AsyncLatch, Executor, SharedTask, Task, sync_wait, when_all,
};

/// Spin until `predicate` holds or a generous deadline passes.
fn eventually(predicate: impl Fn() -> bool) -> bool {
    for _ in 0..500 {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    predicate()
}

#[test]
fn shared_task_fanout_through_latch() {
    // Given - one shared task gated by a latch
    let executor = Executor::new(4);
    let handle = executor.handle();

    let gate = Arc::new(AsyncLatch::new(1));
    let gated = {
        let gate = Arc::clone(&gate);
        SharedTask::scheduled(
            Task::new(move || {
                gate.wait();
                42
            }),
            &handle,
        )
    };

    // Four tasks await the gated task
    let observations = Arc::new(AtomicU32::new(0));
    let awaiting: Vec<SharedTask<()>> = (0..4)
        .map(|_| {
            let gated = gated.clone();
            let observations = Arc::clone(&observations);
            SharedTask::scheduled(
                Task::new(move || {
                    let result_probe = gated.clone();
                    let observations = Arc::clone(&observations);
                    gated.await_with(move || {
                        // Each awaiter observes the result exactly once.
                        assert_eq!(result_probe.result(), Some(42));
                        observations.fetch_add(1, Ordering::SeqCst);
                    });
                }),
                &handle,
            )
        })
        .collect();

    // All four have registered, none resumed yet
    when_all(&awaiting).wait();
    assert_eq!(observations.load(Ordering::SeqCst), 0);
    assert!(!gated.is_ready());

    // When - a fifth party counts the latch down
    gate.count_down();

    // Then - all four awaiters resume with the result
    assert!(eventually(|| observations.load(Ordering::SeqCst) == 4));
    assert!(gated.is_ready());
}

#[test]
fn when_all_completes_after_the_slowest() {
    // Given
    let executor = Executor::new(4);
    let handle = executor.handle();

    let finished = Arc::new(AtomicU32::new(0));
    let tasks: Vec<SharedTask<()>> = (0..6u64)
        .map(|index| {
            let finished = Arc::clone(&finished);
            SharedTask::scheduled(
                Task::new(move || {
                    thread::sleep(Duration::from_millis(5 * (index % 3)));
                    finished.fetch_add(1, Ordering::SeqCst);
                }),
                &handle,
            )
        })
        .collect();

    // When
    when_all(&tasks).wait();

    // Then
    assert_eq!(finished.load(Ordering::SeqCst), 6);
}

#[test]
fn sync_wait_bridges_worker_results() {
    // Given
    let executor = Executor::new(2);

    // When - a task composed of mapped stages runs on the pool
    let task = Task::new(|| 6).map(|value| value * 7);
    let result = sync_wait(task, &executor);

    // Then
    assert_eq!(result, 42);
}

#[test]
fn latch_gates_many_waiters_across_threads() {
    // Given
    let latch = Arc::new(AsyncLatch::new(3));
    let resumed = Arc::new(AtomicU32::new(0));

    for _ in 0..5 {
        let resumed = Arc::clone(&resumed);
        latch.await_with(move || {
            resumed.fetch_add(1, Ordering::SeqCst);
        });
    }

    // When - three threads each count down once
    let counters: Vec<_> = (0..3)
        .map(|_| {
            let latch = Arc::clone(&latch);
            thread::spawn(move || latch.count_down())
        })
        .collect();
    for counter in counters {
        counter.join().unwrap();
    }

    // Then
    assert!(latch.is_released());
    assert_eq!(resumed.load(Ordering::SeqCst), 5);
}

#[test]
fn shared_task_result_is_shared_not_moved() {
    // Given - a clonable result observed by several consumers
    let executor = Executor::new(2);
    let task = SharedTask::scheduled(Task::new(|| String::from("shared")), &executor.handle());

    task.wait();

    // Then - every consumer clones the same value
    for _ in 0..3 {
        assert_eq!(task.result().as_deref(), Some("shared"));
    }
}
