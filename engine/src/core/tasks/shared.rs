//! Multi-consumer shared tasks.
//!
//! A [`SharedTask`] wraps a lazy task for any number of consumers. Cloning is
//! a reference-count bump. The first await starts the work (exactly once);
//! every await registers a continuation that runs when the task completes.
//!
//! # State machine
//!
//! The task moves through four states, tracked in one atomic word:
//!
//! - *not started*: nothing has awaited yet,
//! - *started, no waiters*: the work is running,
//! - *started, waiters*: a lock-free list of registered continuations,
//! - *ready*: completed; the result (or panic) is published.
//!
//! Transitions are CAS-driven. The first awaiter wins the start CAS and
//! launches the work *before* adding itself as a waiter, so a chain of
//! synchronously-completing awaits never recurses through the waiter list.
//! The ready transition is a release exchange that detaches the waiter list;
//! waiters resume in reverse registration order on the completing thread,
//! and every awaiter observes the result with acquire ordering.
//!
//! # Failure
//!
//! A panicking body is captured, the task still becomes ready (continuations
//! run), and the payload can be reclaimed once with
//! [`SharedTask::take_panic`] to be rethrown.

use std::{
    any::Any,
    cell::UnsafeCell,
    panic,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use crossbeam::channel::bounded;

use super::{executor::ExecutorHandle, task::Task};

/// State value: never awaited.
const NOT_STARTED: usize = 0;

/// State value: started, no waiters registered.
const STARTED: usize = 1;

/// State value: completed.
const READY: usize = 2;

// Any other state value is a `*mut Waiter` list head; waiter boxes are
// aligned well above 2.

struct Waiter {
    next: usize,
    run: Box<dyn FnOnce() + Send>,
}

/// How the work is launched when the first awaiter wins the start CAS.
enum Start<T> {
    /// Run the body inline on the awaiting thread.
    Inline(Box<dyn FnOnce() -> T + Send>),

    /// Submit the body to the worker pool.
    Scheduled(ExecutorHandle, Box<dyn FnOnce() -> T + Send>),

    /// Hand control to a launcher which will eventually call `finish`.
    /// Used by the scheduler to gate a step's body on its dependency counter.
    Deferred(Box<dyn FnOnce(SharedTask<T>) + Send>),
}

struct Inner<T> {
    state: AtomicUsize,

    /// Launch payload, taken exactly once by the start-CAS winner.
    start: UnsafeCell<Option<Start<T>>>,

    /// Written before the ready transition, read after it.
    result: UnsafeCell<Option<T>>,

    /// Panic payload of a failed body; reclaimed once.
    panic: Mutex<Option<Box<dyn Any + Send>>>,

    /// Set (before ready) when the body panicked.
    failed: AtomicBool,
}

// SAFETY: the unsafe cells are accessed under the state machine's exclusive
// phases: `start` only by the start-CAS winner, `result` written before the
// release ready-transition and read after an acquire of READY.
unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

/// A lazy, ref-counted task usable by multiple consumers.
pub struct SharedTask<T = ()> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SharedTask<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> SharedTask<T> {
    fn with_start(start: Start<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicUsize::new(NOT_STARTED),
                start: UnsafeCell::new(Some(start)),
                result: UnsafeCell::new(None),
                panic: Mutex::new(None),
                failed: AtomicBool::new(false),
            }),
        }
    }

    /// Shares a task; the body runs inline on whichever thread awaits first.
    pub fn new(task: Task<'static, T>) -> Self {
        Self::with_start(Start::Inline(task.into_body()))
    }

    /// Shares a task; the body runs on the worker pool once awaited.
    pub fn scheduled(task: Task<'static, T>, handle: &ExecutorHandle) -> Self {
        Self::with_start(Start::Scheduled(handle.clone(), task.into_body()))
    }

    /// Shares a task whose completion is signalled explicitly: the launcher
    /// runs on first await and must eventually call
    /// [`finish`](Self::finish) on the clone it receives.
    pub(crate) fn deferred(launch: impl FnOnce(SharedTask<T>) + Send + 'static) -> Self {
        Self::with_start(Start::Deferred(Box::new(launch)))
    }

    /// Whether the task has completed (successfully or by panic).
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == READY
    }

    /// Whether the task completed by panicking. Meaningful once ready.
    #[inline]
    pub fn failed(&self) -> bool {
        self.inner.failed.load(Ordering::Acquire)
    }

    /// Starts the work if nothing has yet.
    fn ensure_started(&self) {
        if self
            .inner
            .state
            .compare_exchange(NOT_STARTED, STARTED, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        // We won the start CAS; the payload is exclusively ours.
        // SAFETY: only the CAS winner reaches this take.
        let start = unsafe { (*self.inner.start.get()).take() }.expect("start payload missing");

        match start {
            Start::Inline(body) => self.run_body(body),
            Start::Scheduled(handle, body) => {
                let this = self.clone();
                handle.execute(move || this.run_body(body));
            }
            Start::Deferred(launch) => launch(self.clone()),
        }
    }

    fn run_body(&self, body: Box<dyn FnOnce() -> T + Send>) {
        let outcome = panic::catch_unwind(panic::AssertUnwindSafe(body));
        self.finish(outcome);
    }

    /// Publishes the outcome and resumes every waiter, most recent first.
    pub(crate) fn finish(&self, outcome: Result<T, Box<dyn Any + Send>>) {
        match outcome {
            // SAFETY: written once, before the ready transition below.
            Ok(value) => unsafe { *self.inner.result.get() = Some(value) },
            Err(payload) => {
                *self.inner.panic.lock().unwrap() = Some(payload);
                self.inner.failed.store(true, Ordering::Release);
            }
        }

        // Release publishes the result; acquire sees the full waiter list.
        let old = self.inner.state.swap(READY, Ordering::AcqRel);

        debug_assert!(old != NOT_STARTED, "task finished before being started");
        debug_assert!(old != READY, "task finished twice");

        let mut current = old;
        while current != STARTED && current != READY && current != NOT_STARTED {
            // SAFETY: the list was detached by the ready swap; each node is
            // traversed exactly once.
            let waiter = unsafe { Box::from_raw(current as *mut Waiter) };
            current = waiter.next;
            (waiter.run)();
        }
    }

    /// Awaits the task: starts it if necessary and defers `continuation`
    /// until it is ready.
    ///
    /// If the task is already ready the continuation runs immediately on the
    /// calling thread (no suspension); otherwise it runs on the completing
    /// thread.
    pub fn await_with(&self, continuation: impl FnOnce() + Send + 'static) {
        // Starting before registering avoids unbounded recursion on chains
        // of synchronously-completing awaits.
        self.ensure_started();

        let mut old = self.inner.state.load(Ordering::Acquire);

        if old == READY {
            continuation();
            return;
        }

        let waiter = Box::into_raw(Box::new(Waiter {
            next: STARTED,
            run: Box::new(continuation),
        }));

        loop {
            if old == READY {
                // Completed while registering; resume synchronously.
                // SAFETY: the node never made it onto the list.
                let waiter = unsafe { Box::from_raw(waiter) };
                (waiter.run)();
                return;
            }

            // SAFETY: the node is not yet shared.
            unsafe { (*waiter).next = old };

            match self.inner.state.compare_exchange_weak(
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

    /// Blocks the calling thread until the task is ready, starting it if
    /// necessary.
    pub fn wait(&self) {
        if self.is_ready() {
            return;
        }

        let (sender, receiver) = bounded::<()>(1);
        self.await_with(move || {
            let _ = sender.send(());
        });
        let _ = receiver.recv();
    }

    /// Clones the result out of a ready, successful task.
    pub fn result(&self) -> Option<T>
    where
        T: Clone + Sync,
    {
        if !self.is_ready() || self.failed() {
            return None;
        }

        // SAFETY: READY was observed with acquire; the result is immutable
        // from here on.
        unsafe { (*self.inner.result.get()).clone() }
    }

    /// Reclaims the panic payload of a failed task, once.
    pub fn take_panic(&self) -> Option<Box<dyn Any + Send>> {
        if !self.is_ready() {
            return None;
        }
        self.inner.panic.lock().unwrap().take()
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        // Free never-resumed waiters without running them. Reachable only if
        // a deferred task was dropped before its launcher finished.
        let state = *self.state.get_mut();
        let mut current = state;
        while current != NOT_STARTED && current != STARTED && current != READY {
            // SAFETY: exclusive access during drop.
            let waiter = unsafe { Box::from_raw(current as *mut Waiter) };
            current = waiter.next;
        }
    }
}
