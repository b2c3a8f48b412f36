//! Ember: a game-engine runtime core built around an archetype ECS and a
//! dependency-aware parallel system scheduler.
//!
//! The two load-bearing subsystems are:
//!
//! - [`ecs::Registry`], an archetype-based entity-component store. Entities
//!   are grouped by their exact component set; every archetype owns dense
//!   columnar storage, and multi-component queries iterate matching
//!   archetypes through [`ecs::View`]s.
//! - [`ecs::schedule::Scheduler`], which derives a dependency DAG from the
//!   systems' declared component accesses and drives it on the
//!   [`core::tasks::Executor`] worker pool with maximum parallelism.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use ember_engine::{define_stage, ecs::{Registry, schedule::{Scheduler, query_system}}};
//! use ember_engine::core::tasks::Executor;
//! use ember_macros::Component;
//!
//! #[derive(Component)]
//! struct Position { x: f32 }
//!
//! #[derive(Component)]
//! struct Velocity { x: f32 }
//!
//! define_stage!(Update);
//!
//! let mut registry = Registry::new();
//! registry.create((Position { x: 0.0 }, Velocity { x: 1.0 }));
//!
//! let mut scheduler = Scheduler::new();
//! scheduler.add_system(Update, query_system::<(&Velocity, &mut Position), _>(|view| {
//!     view.for_each(|_entity, (vel, pos)| pos.x += vel.x);
//! }));
//!
//! let executor = Executor::default();
//! scheduler.schedule(Update);
//! scheduler.run_all(&registry, &executor);
//! ```

// Allows our proc macros to resolve `::ember_engine` paths when used from
// within this crate's own tests.
extern crate self as ember_engine;

pub mod containers;
pub mod core;
pub mod ecs;
