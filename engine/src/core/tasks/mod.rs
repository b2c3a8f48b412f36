//! Task primitives: worker pool, lazy tasks, shared tasks, latches.
//!
//! The engine's unit of concurrency is a lazy [`Task`]: a closure that does
//! not run until something drives it. Tasks are driven in one of three ways:
//!
//! - [`Task::run`] executes inline on the current thread,
//! - [`sync_wait`] submits to the [`Executor`] pool and blocks until done,
//! - [`SharedTask`] wraps a task for multiple consumers; awaiting it starts
//!   it (at most once) and registers a continuation to run on completion.
//!
//! Completion signalling uses [`AsyncLatch`] (count-down-to-zero, one-shot)
//! and [`WhenAllCounter`]/[`when_all`] (complete when the last of a set
//! completes). The scheduler composes these into dependency fences: a step's
//! task is gated on a counter that its dependencies' trigger continuations
//! count down.
//!
//! # Suspension points
//!
//! Continuation registration (`await_with`) is the only suspension-like
//! operation; everything else is synchronous and must not block. A
//! continuation runs either inline (the awaited thing is already complete)
//! or on whichever thread completes it.
//!
//! # Ordering guarantees
//!
//! Completing a [`SharedTask`] performs a release transition and every
//! awaiter observes it with an acquire, so all memory effects of the task
//! body happen-before any continuation. [`sync_wait`] gives the same
//! guarantee to the blocking caller.
//!
//! Cancellation and timeouts are not supported at this layer.

pub mod executor;
pub mod latch;
pub mod shared;
pub mod task;
pub mod when_all;

pub use executor::{Executor, ExecutorHandle};
pub use latch::AsyncLatch;
pub use shared::SharedTask;
pub use task::{Task, sync_wait};
pub use when_all::{WhenAll, WhenAllCounter, when_all};
