//! Count-down-to-zero synchronization for tasks.
//!
//! An [`AsyncLatch`] is initialized with a count. Awaiting the latch defers a
//! continuation until the count reaches zero; [`AsyncLatch::count_down`]
//! decrements it. Once released, later awaits run their continuation
//! immediately and further count-downs are idempotent.
//!
//! Latches are one-shot: a released latch cannot be re-armed.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::channel::bounded;

/// State value: not released, no waiters.
const OPEN: usize = 0;

/// State value: released.
const RELEASED: usize = 1;

// Any other state value is a `*mut Waiter` head of the waiter list. Waiter
// boxes are aligned well above 2, so the sentinels can never collide with a
// real pointer.

/// A waiter node: an intrusive singly-linked list entry holding the deferred
/// continuation.
struct Waiter {
    next: usize,
    run: Box<dyn FnOnce() + Send>,
}

/// One-shot count-down latch with a lock-free waiter list.
pub struct AsyncLatch {
    counter: AtomicUsize,

    /// States: `OPEN` (no waiters), `RELEASED`, or a `*mut Waiter` list head.
    state: AtomicUsize,
}

// SAFETY: the waiter list is only mutated through CAS and consumed once on
// the releasing thread; continuations are `Send`.
unsafe impl Send for AsyncLatch {}
unsafe impl Sync for AsyncLatch {}

impl AsyncLatch {
    /// Creates a latch that releases after `count` count-downs. A zero count
    /// starts released.
    pub fn new(count: usize) -> Self {
        Self {
            counter: AtomicUsize::new(count),
            state: AtomicUsize::new(if count == 0 { RELEASED } else { OPEN }),
        }
    }

    /// Decrements the counter; the waiter list is resumed when it reaches
    /// zero. Counting down past zero is allowed and does nothing.
    pub fn count_down(&self) {
        // The release transition happens exactly once: only the count-down
        // that observes 1 performs it. Underflow past zero wraps and can
        // never observe 1 again.
        if self.counter.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Release publishes prior writes to waiters; acquire sees the
            // complete waiter list.
            let old = self.state.swap(RELEASED, Ordering::AcqRel);
            resume_waiters(old);
        }
    }

    /// Whether the latch has been released.
    #[inline]
    pub fn is_released(&self) -> bool {
        self.state.load(Ordering::Acquire) == RELEASED
    }

    /// Defers `continuation` until the latch is released.
    ///
    /// If the latch is already released the continuation runs immediately on
    /// the calling thread; otherwise it runs on the thread performing the
    /// releasing count-down, in reverse registration order.
    pub fn await_with(&self, continuation: impl FnOnce() + Send + 'static) {
        if self.is_released() {
            continuation();
            return;
        }

        let waiter = Box::into_raw(Box::new(Waiter {
            next: OPEN,
            run: Box::new(continuation),
        }));

        let mut old = self.state.load(Ordering::Acquire);

        loop {
            if old == RELEASED {
                // Released while we prepared the node; run inline.
                // SAFETY: the node never made it onto the list.
                let waiter = unsafe { Box::from_raw(waiter) };
                (waiter.run)();
                return;
            }

            // SAFETY: the node is not yet shared.
            unsafe { (*waiter).next = old };

            match self.state.compare_exchange_weak(
                old,
                waiter as usize,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(current) => old = current,
            }
        }
    }

    /// Blocks the calling thread until the latch is released.
    pub fn wait(&self) {
        if self.is_released() {
            return;
        }

        let (sender, receiver) = bounded::<()>(1);
        self.await_with(move || {
            let _ = sender.send(());
        });

        // A send may still have raced ahead of registration; recv covers both.
        let _ = receiver.recv();
    }
}

impl Drop for AsyncLatch {
    fn drop(&mut self) {
        let state = *self.state.get_mut();

        debug_assert!(
            state == OPEN || state == RELEASED,
            "latch dropped with registered waiters"
        );

        // Free any never-resumed waiters without running them.
        let mut current = state;
        while current != OPEN && current != RELEASED {
            // SAFETY: exclusive access; nodes on the list are live boxes.
            let waiter = unsafe { Box::from_raw(current as *mut Waiter) };
            current = waiter.next;
        }
    }
}

/// Runs every waiter of a detached list, most recent first.
fn resume_waiters(mut state: usize) {
    while state != OPEN && state != RELEASED {
        // SAFETY: the list was detached by the releasing swap; every node is
        // a live box traversed exactly once.
        let waiter = unsafe { Box::from_raw(state as *mut Waiter) };
        state = waiter.next;
        (waiter.run)();
    }
}
