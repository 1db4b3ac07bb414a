//! Multiverse Physics – batched rigid-body core for Rust.
//!
//! Many independent worlds share one immutable shape/mass database. Each
//! world runs a broadphase pass per step followed by XPBD substeps
//! (integrate, narrowphase, positional solve, velocity reconstruction,
//! velocity solve). Worlds are stepped in parallel; everything inside a
//! world happens in order.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod utils;
pub mod world;

use std::sync::Arc;
use std::time::Instant;

pub use glam::{Quat, Vec3};

pub use crate::collision::{
    contact::{Contact, ContactBuffer, ContactPoint},
    events::{CandidateCollision, CollisionEvent},
    sat::{Manifold, ManifoldGenerator, ReferenceSide, SatManifoldGenerator},
};
pub use crate::config::{OverflowPolicy, PhysicsConfig};
pub use crate::core::{
    hull::ConvexHull,
    object::{CollisionPrimitive, ObjectDesc, ObjectId, ObjectManager, PrimitiveKind, RigidBodyMetadata},
    soa::{BodyDesc, BodyRef},
    types::Velocity,
};
pub use crate::error::{PhysicsError, Result};
pub use crate::utils::{allocator::EntityId, profiling::PhysicsProfiler};
pub use crate::world::PhysicsWorld;

use crate::utils::logging::{warn_if_step_budget_exceeded, ScopedTimer};

/// Batch driver owning every world and the shared object database.
pub struct PhysicsEngine {
    config: PhysicsConfig,
    objects: Arc<ObjectManager>,
    generator: Arc<dyn ManifoldGenerator>,
    worlds: Vec<PhysicsWorld>,
    profiler: PhysicsProfiler,
}

impl PhysicsEngine {
    /// Creates an engine with no worlds. Fails if the configuration is invalid.
    pub fn new(config: PhysicsConfig, objects: ObjectManager) -> Result<Self> {
        config.validate()?;
        log::info!(
            "physics engine: {} object type(s), {} substep(s) of {:.4} s",
            objects.len(),
            config.num_substeps,
            config.substep_dt()
        );
        Ok(Self {
            config,
            objects: Arc::new(objects),
            generator: Arc::new(SatManifoldGenerator),
            worlds: Vec::new(),
            profiler: PhysicsProfiler::default(),
        })
    }

    /// Adds an empty world and returns its index.
    pub fn add_world(&mut self) -> Result<usize> {
        let world = PhysicsWorld::new(self.config.clone(), Arc::clone(&self.objects))?
            .with_manifold_generator(Arc::clone(&self.generator));
        self.worlds.push(world);
        Ok(self.worlds.len() - 1)
    }

    pub fn world(&self, index: usize) -> Option<&PhysicsWorld> {
        self.worlds.get(index)
    }

    pub fn world_mut(&mut self, index: usize) -> Option<&mut PhysicsWorld> {
        self.worlds.get_mut(index)
    }

    pub fn worlds(&self) -> &[PhysicsWorld] {
        &self.worlds
    }

    pub fn worlds_mut(&mut self) -> &mut [PhysicsWorld] {
        &mut self.worlds
    }

    pub fn world_count(&self) -> usize {
        self.worlds.len()
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn objects(&self) -> &ObjectManager {
        &self.objects
    }

    /// Swaps the hull manifold routine in every current and future world.
    pub fn set_manifold_generator(&mut self, generator: Arc<dyn ManifoldGenerator>) {
        for world in &mut self.worlds {
            world.set_manifold_generator(Arc::clone(&generator));
        }
        self.generator = generator;
    }

    /// Profile of the last [`PhysicsEngine::step`], summed over all worlds.
    pub fn profiler(&self) -> &PhysicsProfiler {
        &self.profiler
    }

    /// Steps every world once. Worlds run in parallel with the `parallel`
    /// feature. The first error encountered is returned; other worlds may or
    /// may not have completed their step by then.
    pub fn step(&mut self) -> Result<()> {
        let _timer = ScopedTimer::new("engine::step");
        let start = Instant::now();

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            self.worlds.par_iter_mut().try_for_each(PhysicsWorld::step)?;
        }

        #[cfg(not(feature = "parallel"))]
        {
            for world in &mut self.worlds {
                world.step()?;
            }
        }

        self.profiler.reset();
        for world in &self.worlds {
            self.profiler.merge(world.profiler());
        }
        warn_if_step_budget_exceeded(start.elapsed(), self.config.delta_t * 1000.0);
        Ok(())
    }
}
