use std::sync::Arc;
use std::time::Instant;

use glam::{Quat, Vec3};
use log::debug;

use crate::{
    collision::{
        broadphase::BroadPhase,
        contact::{Contact, ContactBuffer},
        events::{CandidateCollision, CollisionEvent, EventCollector},
        narrowphase::Narrowphase,
        sat::{ManifoldGenerator, SatManifoldGenerator},
    },
    config::PhysicsConfig,
    core::{
        object::ObjectManager,
        soa::{BodiesSoA, BodyDesc, BodyRef},
        types::Velocity,
    },
    dynamics::{integrator::Integrator, solver::ContactSolver},
    error::{PhysicsError, Result},
    utils::{
        allocator::EntityId,
        logging::ScopedTimer,
        profiling::{PhysicsProfiler, StageTimer},
    },
};

/// One independent simulated world: its bodies, solver state, candidate
/// pairs and collision events.
///
/// Worlds share the immutable shape/mass database and nothing else, so any
/// number of them can be stepped concurrently.
pub struct PhysicsWorld {
    config: PhysicsConfig,
    objects: Arc<ObjectManager>,
    generator: Arc<dyn ManifoldGenerator>,
    bodies: BodiesSoA,
    broadphase: BroadPhase,
    candidates: Vec<CandidateCollision>,
    contacts: ContactBuffer,
    collector: EventCollector,
    events: Vec<CollisionEvent>,
    last_contacts: Vec<Contact>,
    integrator: Integrator,
    solver: ContactSolver,
    profiler: PhysicsProfiler,
    steps: u64,
}

impl PhysicsWorld {
    pub fn new(config: PhysicsConfig, objects: Arc<ObjectManager>) -> Result<Self> {
        config.validate()?;
        let h = config.substep_dt();
        Ok(Self {
            objects,
            generator: Arc::new(SatManifoldGenerator),
            bodies: BodiesSoA::new(config.max_dynamic_objects),
            broadphase: BroadPhase::new(config.broadphase_cell_size),
            candidates: Vec::new(),
            contacts: ContactBuffer::new(config.max_contacts_per_world),
            collector: EventCollector::default(),
            events: Vec::new(),
            last_contacts: Vec::new(),
            integrator: Integrator::new(h, config.gravity),
            solver: ContactSolver::new(&config),
            profiler: PhysicsProfiler::default(),
            steps: 0,
            config,
        })
    }

    /// Replaces the hull manifold routine used by the narrowphase.
    pub fn with_manifold_generator(mut self, generator: Arc<dyn ManifoldGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn set_manifold_generator(&mut self, generator: Arc<dyn ManifoldGenerator>) {
        self.generator = generator;
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn objects(&self) -> &ObjectManager {
        &self.objects
    }

    /// Adds a body whose object id must already be registered.
    pub fn add_body(&mut self, desc: BodyDesc) -> Result<EntityId> {
        if !self.objects.contains(desc.object) {
            return Err(PhysicsError::UnknownObject(desc.object));
        }
        let id = self.bodies.insert(desc)?;
        debug!("added body {id} (object {:?})", desc.object);
        Ok(id)
    }

    pub fn remove_body(&mut self, id: EntityId) -> Result<()> {
        self.bodies.remove(id)?;
        debug!("removed body {id}");
        Ok(())
    }

    pub fn body(&self, id: EntityId) -> Option<BodyRef<'_>> {
        self.bodies.get(id)
    }

    pub fn bodies(&self) -> &BodiesSoA {
        &self.bodies
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn set_position(&mut self, id: EntityId, position: Vec3) -> Result<()> {
        self.bodies.set_position(id, position)
    }

    pub fn set_rotation(&mut self, id: EntityId, rotation: Quat) -> Result<()> {
        self.bodies.set_rotation(id, rotation)
    }

    pub fn set_velocity(&mut self, id: EntityId, velocity: Velocity) -> Result<()> {
        self.bodies.set_velocity(id, velocity)
    }

    /// Deduplicated contacting pairs from the most recent step.
    pub fn events(&self) -> &[CollisionEvent] {
        &self.events
    }

    /// Contacts solved in the final substep of the most recent step, with
    /// their accumulated multipliers.
    pub fn last_contacts(&self) -> &[Contact] {
        &self.last_contacts
    }

    pub fn profiler(&self) -> &PhysicsProfiler {
        &self.profiler
    }

    /// Number of completed calls to [`PhysicsWorld::step`].
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Drops all transient per-step state. Bodies are kept.
    pub fn reset(&mut self) {
        self.broadphase.clear();
        self.candidates.clear();
        self.contacts.clear();
        self.contacts.reset_dropped();
        self.collector.clear();
        self.events.clear();
        self.last_contacts.clear();
        self.profiler.reset();
    }

    /// Advances the world by `delta_t`: one broadphase pass followed by
    /// `num_substeps` rounds of integrate, narrowphase, positional solve,
    /// velocity reconstruction and velocity solve.
    ///
    /// On error the contact buffer and candidates are still cleared, so the
    /// world can be stepped again.
    pub fn step(&mut self) -> Result<()> {
        let _timer = ScopedTimer::new("world::step");
        let start = Instant::now();
        let mut profiler = PhysicsProfiler::default();

        self.collector.clear();
        self.events.clear();
        self.contacts.clear();
        self.contacts.reset_dropped();

        let result = self
            .run_broadphase(&mut profiler)
            .and_then(|()| self.run_substeps(&mut profiler));

        self.contacts.clear();
        self.candidates.clear();
        self.events = self.collector.drain_unique();

        profiler.body_count = self.bodies.len();
        profiler.event_count = self.events.len();
        profiler.total_step_time = start.elapsed();
        self.profiler = profiler;

        result?;
        self.steps += 1;
        debug!(
            "step {}: {} bodies, {} candidates, {} contacts, {} events",
            self.steps,
            profiler.body_count,
            profiler.candidate_count,
            profiler.contact_count,
            profiler.event_count
        );
        Ok(())
    }

    fn run_broadphase(&mut self, profiler: &mut PhysicsProfiler) -> Result<()> {
        let _timer = ScopedTimer::new("broadphase");
        let _stage = StageTimer::new(&mut profiler.broad_phase_time);
        BroadPhase::refresh_aabbs(&mut self.bodies, &self.objects, self.config.delta_t)?;
        self.broadphase.find_pairs(&self.bodies, &mut self.candidates);
        profiler.candidate_count = self.candidates.len();
        Ok(())
    }

    fn run_substeps(&mut self, profiler: &mut PhysicsProfiler) -> Result<()> {
        let narrowphase = Narrowphase::new(
            &self.objects,
            self.generator.as_ref(),
            self.config.contact_overflow,
        );

        for _ in 0..self.config.num_substeps {
            {
                let _timer = ScopedTimer::new("integrate");
                let _stage = StageTimer::new(&mut profiler.integrator_time);
                self.integrator.substep(&mut self.bodies, &self.objects)?;
            }

            {
                let _timer = ScopedTimer::new("narrowphase");
                let _stage = StageTimer::new(&mut profiler.narrow_phase_time);
                profiler.dropped_contacts += narrowphase.run(
                    &self.bodies,
                    &self.candidates,
                    &self.contacts,
                    &self.collector,
                )?;
            }

            // Appends land in completion order; solve in pair order so a
            // step does not depend on thread scheduling.
            let contacts = self.contacts.contacts_mut();
            contacts.sort_unstable_by_key(Contact::pair);
            profiler.contact_count += contacts.len();

            {
                let _timer = ScopedTimer::new("solve_positions");
                let _stage = StageTimer::new(&mut profiler.position_solve_time);
                self.solver
                    .solve_positions(&mut self.bodies, &self.objects, contacts)?;
            }

            {
                let _timer = ScopedTimer::new("solve_velocities");
                let _stage = StageTimer::new(&mut profiler.velocity_solve_time);
                self.integrator
                    .reconstruct_velocities(&mut self.bodies, &self.objects)?;
                self.solver
                    .solve_velocities(&mut self.bodies, &self.objects, contacts)?;
            }

            self.last_contacts.clear();
            self.last_contacts.extend_from_slice(contacts);
            self.contacts.clear();
        }
        Ok(())
    }
}
