use glam::{Quat, Vec3};

use super::aabb::Aabb;
use super::object::ObjectId;
use super::types::{SubstepState, Velocity};
use crate::error::{PhysicsError, Result};
use crate::utils::allocator::{EntityId, SlotAllocator};

/// Description of a body to insert into a world.
#[derive(Debug, Clone, Copy)]
pub struct BodyDesc {
    pub object: ObjectId,
    pub position: Vec3,
    pub rotation: Quat,
    /// Per-axis scale; only hull primitives honour it.
    pub scale: Vec3,
    pub velocity: Velocity,
}

impl BodyDesc {
    pub fn new(object: ObjectId) -> Self {
        Self {
            object,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            velocity: Velocity::default(),
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation.normalize();
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_velocity(mut self, velocity: Velocity) -> Self {
        self.velocity = velocity;
        self
    }
}

/// Structure-of-arrays body storage for one world.
///
/// Columns are indexed by slot; freed slots keep stale data and are skipped
/// through the allocator's liveness flags.
#[derive(Debug, Default, Clone)]
pub struct BodiesSoA {
    slots: SlotAllocator,
    capacity: usize,

    pub(crate) ids: Vec<EntityId>,
    pub(crate) object_ids: Vec<ObjectId>,
    pub(crate) positions: Vec<Vec3>,
    pub(crate) rotations: Vec<Quat>,
    pub(crate) scales: Vec<Vec3>,
    pub(crate) velocities: Vec<Velocity>,
    pub(crate) substeps: Vec<SubstepState>,
    /// World-space bounds from the last broadphase refresh.
    pub(crate) aabbs: Vec<Aabb>,
}

impl BodiesSoA {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn insert(&mut self, desc: BodyDesc) -> Result<EntityId> {
        if self.len() >= self.capacity {
            return Err(PhysicsError::BodyLimitReached {
                capacity: self.capacity,
            });
        }

        let (id, reused) = self.slots.allocate();
        let substep = SubstepState::at_rest(desc.position, desc.rotation, desc.velocity);
        if reused {
            let i = id.index();
            self.ids[i] = id;
            self.object_ids[i] = desc.object;
            self.positions[i] = desc.position;
            self.rotations[i] = desc.rotation;
            self.scales[i] = desc.scale;
            self.velocities[i] = desc.velocity;
            self.substeps[i] = substep;
            self.aabbs[i] = Aabb::empty();
        } else {
            self.ids.push(id);
            self.object_ids.push(desc.object);
            self.positions.push(desc.position);
            self.rotations.push(desc.rotation);
            self.scales.push(desc.scale);
            self.velocities.push(desc.velocity);
            self.substeps.push(substep);
            self.aabbs.push(Aabb::empty());
        }
        Ok(id)
    }

    pub fn remove(&mut self, id: EntityId) -> Result<()> {
        if self.slots.free(id) {
            Ok(())
        } else {
            Err(PhysicsError::InvalidEntity(id))
        }
    }

    pub fn is_valid(&self, id: EntityId) -> bool {
        self.slots.is_valid(id)
    }

    pub fn len(&self) -> usize {
        self.slots.live_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of storage slots, including freed ones.
    pub fn slot_count(&self) -> usize {
        self.ids.len()
    }

    pub fn is_alive_slot(&self, index: usize) -> bool {
        self.slots.alive_slots().get(index).copied().unwrap_or(false)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.ids.clear();
        self.object_ids.clear();
        self.positions.clear();
        self.rotations.clear();
        self.scales.clear();
        self.velocities.clear();
        self.substeps.clear();
        self.aabbs.clear();
    }

    pub fn get(&self, id: EntityId) -> Option<BodyRef<'_>> {
        self.is_valid(id).then(|| BodyRef {
            soa: self,
            index: id.index(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = BodyRef<'_>> {
        (0..self.slot_count())
            .filter(move |&i| self.is_alive_slot(i))
            .map(move |index| BodyRef { soa: self, index })
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.iter().map(|body| body.id())
    }

    pub fn set_position(&mut self, id: EntityId, position: Vec3) -> Result<()> {
        let i = self.checked_index(id)?;
        self.positions[i] = position;
        Ok(())
    }

    pub fn set_rotation(&mut self, id: EntityId, rotation: Quat) -> Result<()> {
        let i = self.checked_index(id)?;
        self.rotations[i] = rotation.normalize();
        Ok(())
    }

    pub fn set_velocity(&mut self, id: EntityId, velocity: Velocity) -> Result<()> {
        let i = self.checked_index(id)?;
        self.velocities[i] = velocity;
        Ok(())
    }

    fn checked_index(&self, id: EntityId) -> Result<usize> {
        if self.is_valid(id) {
            Ok(id.index())
        } else {
            Err(PhysicsError::InvalidEntity(id))
        }
    }

    /// Runs `f` once per live body, in parallel when the `parallel` feature
    /// is enabled. Each invocation owns its body's columns exclusively.
    ///
    /// Stops at the first error. With `parallel`, bodies other than the
    /// failing one may or may not have been visited.
    pub(crate) fn try_for_each_mut<F>(&mut self, f: F) -> Result<()>
    where
        F: Fn(BodyProxyMut<'_>) -> Result<()> + Send + Sync,
    {
        let alive = self.slots.alive_slots();

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            (
                alive.par_iter(),
                self.ids.par_iter(),
                self.object_ids.par_iter(),
                self.scales.par_iter(),
                self.positions.par_iter_mut(),
                self.rotations.par_iter_mut(),
                self.velocities.par_iter_mut(),
                self.substeps.par_iter_mut(),
                self.aabbs.par_iter_mut(),
            )
                .into_par_iter()
                .try_for_each(
                    |(alive, id, object, scale, position, rotation, velocity, substep, aabb)| {
                        if !*alive {
                            return Ok(());
                        }
                        f(BodyProxyMut {
                            id: *id,
                            object: *object,
                            scale: *scale,
                            position,
                            rotation,
                            velocity,
                            substep,
                            aabb,
                        })
                    },
                )?;
        }

        #[cfg(not(feature = "parallel"))]
        {
            for i in 0..self.ids.len() {
                if !alive[i] {
                    continue;
                }
                f(BodyProxyMut {
                    id: self.ids[i],
                    object: self.object_ids[i],
                    scale: self.scales[i],
                    position: &mut self.positions[i],
                    rotation: &mut self.rotations[i],
                    velocity: &mut self.velocities[i],
                    substep: &mut self.substeps[i],
                    aabb: &mut self.aabbs[i],
                })?;
            }
        }

        Ok(())
    }
}

/// Mutable view of one body's columns.
pub struct BodyProxyMut<'a> {
    pub id: EntityId,
    pub object: ObjectId,
    pub scale: Vec3,
    pub position: &'a mut Vec3,
    pub rotation: &'a mut Quat,
    pub velocity: &'a mut Velocity,
    pub substep: &'a mut SubstepState,
    pub aabb: &'a mut Aabb,
}

#[derive(Clone, Copy)]
pub struct BodyRef<'a> {
    soa: &'a BodiesSoA,
    index: usize,
}

impl<'a> BodyRef<'a> {
    pub fn id(&self) -> EntityId {
        self.soa.ids[self.index]
    }
    pub fn object(&self) -> ObjectId {
        self.soa.object_ids[self.index]
    }
    pub fn position(&self) -> Vec3 {
        self.soa.positions[self.index]
    }
    pub fn rotation(&self) -> Quat {
        self.soa.rotations[self.index]
    }
    pub fn scale(&self) -> Vec3 {
        self.soa.scales[self.index]
    }
    pub fn velocity(&self) -> Velocity {
        self.soa.velocities[self.index]
    }
    pub fn substep_state(&self) -> &'a SubstepState {
        &self.soa.substeps[self.index]
    }
    pub fn aabb(&self) -> Aabb {
        self.soa.aabbs[self.index]
    }
}
