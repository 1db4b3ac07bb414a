use std::collections::{HashMap, HashSet};

use glam::Vec3;

use super::events::CandidateCollision;
use crate::core::aabb::Aabb;
use crate::core::object::{CollisionPrimitive, ObjectManager};
use crate::core::soa::BodiesSoA;
use crate::error::Result;
use crate::utils::allocator::EntityId;

/// Bodies whose bounds cover more cells than this are tested against
/// everything instead of being rasterised into the grid.
const MAX_CELLS_PER_BODY: i64 = 512;

/// Fixed margin per axis, scaled by the squared step length.
const AABB_MARGIN_SCALE: f32 = 100.0;

type CellKey = (i32, i32, i32);

/// Uniform grid spatial partitioning used by the broadphase.
pub struct SpatialGrid {
    cell_size: f32,
    grid: HashMap<CellKey, Vec<(EntityId, Aabb)>>,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            grid: HashMap::new(),
        }
    }

    fn world_to_grid(&self, pos: Vec3) -> CellKey {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
            (pos.z / self.cell_size).floor() as i32,
        )
    }

    fn cell_range(&self, aabb: &Aabb) -> (CellKey, CellKey) {
        (self.world_to_grid(aabb.min), self.world_to_grid(aabb.max))
    }

    fn cell_count(&self, aabb: &Aabb) -> i64 {
        let (lo, hi) = self.cell_range(aabb);
        (hi.0 as i64 - lo.0 as i64 + 1)
            * (hi.1 as i64 - lo.1 as i64 + 1)
            * (hi.2 as i64 - lo.2 as i64 + 1)
    }

    pub fn insert(&mut self, entity_id: EntityId, aabb: Aabb) {
        let (min_cell, max_cell) = self.cell_range(&aabb);
        for x in min_cell.0..=max_cell.0 {
            for y in min_cell.1..=max_cell.1 {
                for z in min_cell.2..=max_cell.2 {
                    self.grid
                        .entry((x, y, z))
                        .or_default()
                        .push((entity_id, aabb));
                }
            }
        }
    }

    /// Empties every cell, dropping cells that stayed empty since the last
    /// clear.
    pub fn clear(&mut self) {
        self.grid.retain(|_, entries| {
            let keep = !entries.is_empty();
            entries.clear();
            keep
        });
    }

    pub fn occupied_cells(&self) -> usize {
        self.grid.values().filter(|entries| !entries.is_empty()).count()
    }

    fn overlapping_pairs(&self, seen: &mut HashSet<CandidateCollision>) {
        for entries in self.grid.values() {
            for (i, (id_a, aabb_a)) in entries.iter().enumerate() {
                for (id_b, aabb_b) in &entries[i + 1..] {
                    if aabb_a.overlaps(aabb_b) {
                        seen.insert(CandidateCollision::new(*id_a, *id_b));
                    }
                }
            }
        }
    }
}

/// Broadphase driver: refreshes bounds and emits candidate pairs.
pub struct BroadPhase {
    grid: SpatialGrid,
    unbounded: Vec<EntityId>,
    oversized: Vec<(EntityId, Aabb)>,
    bounded: Vec<(EntityId, Aabb)>,
    seen: HashSet<CandidateCollision>,
}

impl BroadPhase {
    pub fn new(cell_size: f32) -> Self {
        Self {
            grid: SpatialGrid::new(cell_size),
            unbounded: Vec::new(),
            oversized: Vec::new(),
            bounded: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Recomputes every body's world-space bounds for a step of length `dt`:
    /// the rotated local box, stretched along the motion by twice the
    /// distance covered in one step and padded by a small fixed margin.
    /// Fails if a body refers to an unregistered object.
    pub fn refresh_aabbs(bodies: &mut BodiesSoA, objects: &ObjectManager, dt: f32) -> Result<()> {
        let margin = Vec3::splat(AABB_MARGIN_SCALE * dt * dt);
        bodies.try_for_each_mut(|body| {
            let record = objects.get(body.object)?;
            let local = match record.primitive {
                CollisionPrimitive::Hull(_) => record.aabb.scaled(body.scale),
                _ => record.aabb,
            };
            let mut world = local.transformed(*body.position, *body.rotation);
            if world.is_bounded() {
                let sweep = body.velocity.linear * (2.0 * dt);
                world.min += sweep.min(Vec3::ZERO) - margin;
                world.max += sweep.max(Vec3::ZERO) + margin;
            }
            *body.aabb = world;
            Ok(())
        })
    }

    /// Writes each overlapping unordered pair once into `out`, sorted.
    /// Unbounded bodies pair with every bounded body; two unbounded bodies
    /// never pair.
    pub fn find_pairs(&mut self, bodies: &BodiesSoA, out: &mut Vec<CandidateCollision>) {
        self.grid.clear();
        self.unbounded.clear();
        self.oversized.clear();
        self.bounded.clear();
        self.seen.clear();

        for body in bodies.iter() {
            let (id, aabb) = (body.id(), body.aabb());
            if aabb.min.cmpgt(aabb.max).any() {
                continue;
            }
            if !aabb.is_bounded() {
                self.unbounded.push(id);
                continue;
            }
            self.bounded.push((id, aabb));
            if self.grid.cell_count(&aabb) > MAX_CELLS_PER_BODY {
                self.oversized.push((id, aabb));
            } else {
                self.grid.insert(id, aabb);
            }
        }

        self.grid.overlapping_pairs(&mut self.seen);

        for (big, big_aabb) in &self.oversized {
            for (other, other_aabb) in &self.bounded {
                if big != other && big_aabb.overlaps(other_aabb) {
                    self.seen.insert(CandidateCollision::new(*big, *other));
                }
            }
        }

        for &plane in &self.unbounded {
            for (other, _) in &self.bounded {
                self.seen.insert(CandidateCollision::new(plane, *other));
            }
        }

        out.clear();
        out.extend(self.seen.iter().copied());
        out.sort_unstable();
        log::trace!(
            "broadphase: {} occupied cell(s), {} oversized, {} unbounded, {} pair(s)",
            self.grid.occupied_cells(),
            self.oversized.len(),
            self.unbounded.len(),
            out.len()
        );
    }

    pub fn clear(&mut self) {
        self.grid.clear();
        self.unbounded.clear();
        self.oversized.clear();
        self.bounded.clear();
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hull::ConvexHull;
    use crate::core::object::{ObjectDesc, ObjectId, RigidBodyMetadata};
    use crate::core::soa::BodyDesc;
    use crate::core::types::Velocity;
    use approx::assert_abs_diff_eq;

    fn objects() -> (ObjectManager, ObjectId, ObjectId, ObjectId) {
        let mut objects = ObjectManager::new();
        let sphere = objects.add_object(ObjectDesc::new(
            CollisionPrimitive::Sphere { radius: 0.5 },
            RigidBodyMetadata::dynamic_sphere(1.0, 0.5, 0.5, 0.3),
        ));
        let plane = objects.add_object(ObjectDesc::new(
            CollisionPrimitive::Plane,
            RigidBodyMetadata::fixed(0.5, 0.3),
        ));
        let cube = objects.add_object(ObjectDesc::new(
            CollisionPrimitive::Hull(ConvexHull::cuboid(Vec3::splat(0.5))),
            RigidBodyMetadata::dynamic_cuboid(1.0, Vec3::splat(0.5), 0.5, 0.3),
        ));
        (objects, sphere, plane, cube)
    }

    #[test]
    fn moving_body_bounds_stretch_along_velocity() {
        let (objects, sphere, _, _) = objects();
        let mut bodies = BodiesSoA::new(4);
        let id = bodies
            .insert(
                BodyDesc::new(sphere).with_velocity(Velocity::linear(Vec3::new(6.0, 0.0, 0.0))),
            )
            .expect("insert");
        let dt = 0.1;
        BroadPhase::refresh_aabbs(&mut bodies, &objects, dt).expect("registered objects");

        let aabb = bodies.get(id).expect("live").aabb();
        let margin = 100.0 * dt * dt;
        assert_abs_diff_eq!(aabb.max.x, 0.5 + 1.2 + margin, epsilon = 1e-5);
        assert_abs_diff_eq!(aabb.min.x, -0.5 - margin, epsilon = 1e-5);
        assert_abs_diff_eq!(aabb.max.y, 0.5 + margin, epsilon = 1e-5);
    }

    #[test]
    fn scaled_hull_bounds_follow_scale() {
        let (objects, _, _, cube) = objects();
        let mut bodies = BodiesSoA::new(4);
        let id = bodies
            .insert(BodyDesc::new(cube).with_scale(Vec3::new(2.0, 1.0, 1.0)))
            .expect("insert");
        BroadPhase::refresh_aabbs(&mut bodies, &objects, 0.0).expect("registered objects");
        let aabb = bodies.get(id).expect("live").aabb();
        assert_abs_diff_eq!(aabb.max.x, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(aabb.max.y, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn pairs_are_reported_once_and_planes_pair_with_everything() {
        let (objects, sphere, plane, _) = objects();
        let mut bodies = BodiesSoA::new(8);
        let ground = bodies.insert(BodyDesc::new(plane)).expect("insert");
        let ceiling = bodies
            .insert(BodyDesc::new(plane).with_position(Vec3::Z * 10.0))
            .expect("insert");
        // Straddles a cell boundary so both spheres share several cells.
        let a = bodies
            .insert(BodyDesc::new(sphere).with_position(Vec3::new(3.8, 3.8, 3.8)))
            .expect("insert");
        let b = bodies
            .insert(BodyDesc::new(sphere).with_position(Vec3::new(4.2, 4.2, 4.2)))
            .expect("insert");
        let far = bodies
            .insert(BodyDesc::new(sphere).with_position(Vec3::splat(40.0)))
            .expect("insert");

        BroadPhase::refresh_aabbs(&mut bodies, &objects, 1.0 / 60.0).expect("registered objects");
        let mut broadphase = BroadPhase::new(4.0);
        let mut pairs = Vec::new();
        broadphase.find_pairs(&bodies, &mut pairs);

        // Three spheres against two planes, plus the one overlapping sphere pair.
        assert_eq!(pairs.len(), 3 * 2 + 1);
        assert!(pairs.contains(&CandidateCollision::new(ceiling, far)));
        assert!(pairs.contains(&CandidateCollision::new(a, b)));
        assert!(!pairs.contains(&CandidateCollision::new(ground, ceiling)));
        assert!(!pairs.iter().any(|p| p == &CandidateCollision::new(a, far)));
    }

    #[test]
    fn oversized_bodies_still_find_neighbours() {
        let mut objects = ObjectManager::new();
        let slab = objects.add_object(ObjectDesc::new(
            CollisionPrimitive::Hull(ConvexHull::cuboid(Vec3::new(200.0, 200.0, 0.5))),
            RigidBodyMetadata::fixed(0.5, 0.3),
        ));
        let ball = objects.add_object(ObjectDesc::new(
            CollisionPrimitive::Sphere { radius: 0.5 },
            RigidBodyMetadata::dynamic_sphere(1.0, 0.5, 0.5, 0.3),
        ));
        let mut bodies = BodiesSoA::new(4);
        let floor = bodies.insert(BodyDesc::new(slab)).expect("insert");
        let sphere = bodies
            .insert(BodyDesc::new(ball).with_position(Vec3::new(150.0, -20.0, 0.9)))
            .expect("insert");

        BroadPhase::refresh_aabbs(&mut bodies, &objects, 1.0 / 60.0).expect("registered objects");
        let mut pairs = Vec::new();
        BroadPhase::new(4.0).find_pairs(&bodies, &mut pairs);
        assert_eq!(pairs, vec![CandidateCollision::new(floor, sphere)]);
    }
}
