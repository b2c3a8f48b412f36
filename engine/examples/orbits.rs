//! A tiny orbital simulation exercising the registry and the scheduler.
//!
//! Bodies with a position and velocity are pulled toward the origin; a
//! separate render stage prints a coarse summary. Integration and gravity
//! share components and are ordered explicitly; the tracer runs in a later
//! stage and is fenced behind both.
//!
//! Run with: `cargo run --example orbits`

use ember_engine::{
    core::tasks::Executor,
    define_stage,
    ecs::{
        Registry,
        schedule::{Scheduler, query_system},
    },
};
use ember_macros::Component;

#[derive(Component, Debug)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Component, Debug)]
struct Velocity {
    x: f32,
    y: f32,
}

#[derive(Component)]
struct Mass(f32);

define_stage!(Simulate, Trace);

fn main() {
    let mut registry = Registry::new();

    // A ring of bodies with tangential starting velocities.
    for index in 0..8 {
        let angle = index as f32 * std::f32::consts::TAU / 8.0;
        registry.create((
            Position {
                x: angle.cos() * 10.0,
                y: angle.sin() * 10.0,
            },
            Velocity {
                x: -angle.sin(),
                y: angle.cos(),
            },
            Mass(1.0 + index as f32 * 0.1),
        ));
    }

    // One massless marker that only the tracer sees.
    registry.create((Position { x: 0.0, y: 0.0 },));

    let mut scheduler = Scheduler::new();

    let gravity = scheduler
        .add_system(
            Simulate,
            query_system::<(&Position, &Mass, &mut Velocity), _>(|view| {
                view.for_each(|_entity, (position, mass, velocity)| {
                    let distance = (position.x * position.x + position.y * position.y)
                        .sqrt()
                        .max(1.0);
                    let pull = mass.0 / (distance * distance);
                    velocity.x -= position.x / distance * pull;
                    velocity.y -= position.y / distance * pull;
                });
            }),
        )
        .handle();

    scheduler
        .add_system(
            Simulate,
            query_system::<(&Velocity, &mut Position), _>(|view| {
                view.for_each(|_entity, (velocity, position)| {
                    position.x += velocity.x * 0.1;
                    position.y += velocity.y * 0.1;
                });
            }),
        )
        .after(gravity);

    scheduler.add_system(
        Trace,
        query_system::<&Position, _>(|view| {
            let mut spread = 0.0f32;
            let mut count = 0usize;
            view.for_each(|_entity, position| {
                spread += (position.x * position.x + position.y * position.y).sqrt();
                count += 1;
            });
            println!("bodies: {count}, mean radius: {:.2}", spread / count as f32);
        }),
    );

    let executor = Executor::default();

    for _tick in 0..10 {
        scheduler.schedule(Simulate);
        scheduler.schedule(Trace);
        scheduler.run_all(&registry, &executor);
    }
}
