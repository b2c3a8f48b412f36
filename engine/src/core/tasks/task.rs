//! Lazy single-owner tasks and the blocking bridge.
//!
//! A [`Task`] is a unit of deferred work: nothing happens until it is driven.
//! It is move-only and runs at most once; a dropped task that was never
//! driven simply drops its closure. The result is carried in place, no heap
//! allocation beyond the closure itself.
//!
//! [`sync_wait`] bridges task land and blocking land: it drives a task on the
//! executor pool and blocks the calling thread until the result is available,
//! rethrowing any panic from the task body on the caller.

use std::{any::Any, panic};

use crossbeam::channel::bounded;

use super::executor::Executor;

/// A lazy, move-only unit of work producing a `T`.
///
/// The lifetime parameter allows tasks to borrow from their environment;
/// such tasks can only be driven by mechanisms that provably outlive the
/// borrow, like [`Task::run`] or [`sync_wait`].
pub struct Task<'a, T> {
    body: Box<dyn FnOnce() -> T + Send + 'a>,
}

impl<'a, T: 'a> Task<'a, T> {
    /// Wraps a closure into a task. The closure does not run until the task
    /// is driven.
    pub fn new(f: impl FnOnce() -> T + Send + 'a) -> Self {
        Self { body: Box::new(f) }
    }

    /// A task that is immediately ready with `value`.
    pub fn ready(value: T) -> Self
    where
        T: Send + 'a,
    {
        Self::new(move || value)
    }

    /// Drives the task to completion on the current thread.
    pub fn run(self) -> T {
        (self.body)()
    }

    /// Chains a transformation onto the task's result.
    pub fn map<U: 'a>(self, f: impl FnOnce(T) -> U + Send + 'a) -> Task<'a, U> {
        Task::new(move || f((self.body)()))
    }

    pub(crate) fn into_body(self) -> Box<dyn FnOnce() -> T + Send + 'a> {
        self.body
    }
}

/// Drives `task` on the executor pool and blocks until it completes.
///
/// A panic inside the task unwinds the worker-side job, is captured, and
/// resumes on the calling thread.
pub fn sync_wait<'a, T: Send + 'a>(task: Task<'a, T>, executor: &Executor) -> T {
    type Outcome<T> = Result<T, Box<dyn Any + Send>>;

    let (sender, receiver) = bounded::<Outcome<T>>(1);

    let job: Box<dyn FnOnce() + Send + 'a> = Box::new(move || {
        let outcome = panic::catch_unwind(panic::AssertUnwindSafe(|| task.run()));
        let _ = sender.send(outcome);
    });

    // SAFETY: the receive below blocks until the job has run to completion
    // and sent its outcome, so nothing borrowed by the task outlives this
    // call. Same erasure the scheduler uses for per-run step closures.
    let job: Box<dyn FnOnce() + Send + 'static> = unsafe { std::mem::transmute(job) };

    executor.execute_boxed(job);

    match receiver.recv() {
        Ok(Ok(value)) => value,
        Ok(Err(payload)) => panic::resume_unwind(payload),
        Err(_) => panic!("executor shut down while waiting for a task"),
    }
}
