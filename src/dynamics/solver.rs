//! XPBD contact solver: one positional pass and one velocity pass per
//! substep, with zero compliance.
//!
//! Contacts are processed serially in buffer order. Two contacts may share a
//! body, so each contact reads the pose left behind by the previous one;
//! running them concurrently would need colouring by body adjacency.

use glam::{Quat, Vec3};

use crate::collision::contact::Contact;
use crate::config::{PhysicsConfig, MAX_CONTACT_POINTS};
use crate::core::object::{ObjectManager, RigidBodyMetadata};
use crate::core::soa::BodiesSoA;
use crate::core::types::{SubstepState, Velocity};
use crate::error::{PhysicsError, Result};
use crate::utils::allocator::EntityId;
use crate::utils::math::{apply_local_rotation, generalized_inverse_mass};

const SLIP_EPSILON: f32 = 1e-9;

/// Working copy of one body while a contact is being resolved.
#[derive(Debug, Clone, Copy)]
struct SolverBody {
    index: usize,
    position: Vec3,
    rotation: Quat,
    velocity: Velocity,
    substep: SubstepState,
    metadata: RigidBodyMetadata,
}

impl SolverBody {
    fn load(bodies: &BodiesSoA, objects: &ObjectManager, id: EntityId) -> Result<Self> {
        if !bodies.is_valid(id) {
            return Err(PhysicsError::InvalidEntity(id));
        }
        let index = id.index();
        Ok(Self {
            index,
            position: bodies.positions[index],
            rotation: bodies.rotations[index],
            velocity: bodies.velocities[index],
            substep: bodies.substeps[index],
            metadata: objects.get(bodies.object_ids[index])?.metadata,
        })
    }

    fn is_movable(&self) -> bool {
        self.metadata.inv_mass > 0.0
    }

    fn world_point(&self, r: Vec3) -> Vec3 {
        self.position + self.rotation * r
    }

    /// Generalized inverse mass for a unit correction along world `dir`
    /// applied at body-frame offset `r`.
    fn weight(&self, r: Vec3, dir: Vec3) -> f32 {
        if !self.is_movable() {
            return 0.0;
        }
        generalized_inverse_mass(
            r,
            self.metadata.inv_mass,
            self.metadata.inv_inertia,
            self.rotation.inverse() * dir,
        )
    }

    fn apply_position_impulse(&mut self, r: Vec3, impulse: Vec3) {
        if !self.is_movable() {
            return;
        }
        self.position += impulse * self.metadata.inv_mass;
        let local = self.rotation.inverse() * impulse;
        self.rotation = apply_local_rotation(self.rotation, self.metadata.inv_inertia * r.cross(local));
    }

    fn apply_velocity_impulse(&mut self, r: Vec3, impulse: Vec3) {
        if !self.is_movable() {
            return;
        }
        self.velocity.linear += impulse * self.metadata.inv_mass;
        let local = self.rotation.inverse() * impulse;
        self.velocity.angular += self.rotation * (self.metadata.inv_inertia * r.cross(local));
    }

    fn store_pose(&self, bodies: &mut BodiesSoA) {
        if self.is_movable() {
            bodies.positions[self.index] = self.position;
            bodies.rotations[self.index] = self.rotation;
        }
    }

    fn store_velocity(&self, bodies: &mut BodiesSoA) {
        if self.is_movable() {
            bodies.velocities[self.index] = self.velocity;
        }
    }
}

/// Body-frame anchors of a contact point, relative to each body's
/// post-integration pose.
fn local_anchors(contact: &Contact, point: usize, a: &SolverBody, b: &SolverBody) -> (Vec3, Vec3) {
    let p = contact.points[point];
    let n = contact.normal;
    (
        a.substep.start.to_local(p.position + n * p.depth),
        b.substep.start.to_local(p.position - n * p.depth),
    )
}

/// Rigid correction of the pair along `dir`; returns the multiplier
/// increment, or `None` when neither body can move.
fn correct_positions(
    a: &mut SolverBody,
    b: &mut SolverBody,
    r1: Vec3,
    r2: Vec3,
    dir: Vec3,
    magnitude: f32,
) -> Option<f32> {
    let w = a.weight(r1, dir) + b.weight(r2, dir);
    if w <= 0.0 {
        return None;
    }
    let delta_lambda = -magnitude / w;
    a.apply_position_impulse(r1, dir * delta_lambda);
    b.apply_position_impulse(r2, -dir * delta_lambda);
    Some(delta_lambda)
}

/// Changes the relative velocity at the contact point by `magnitude` along
/// `dir`, splitting the change by generalized inverse mass.
fn correct_velocities(a: &mut SolverBody, b: &mut SolverBody, r1: Vec3, r2: Vec3, dir: Vec3, magnitude: f32) {
    let w = a.weight(r1, dir) + b.weight(r2, dir);
    if w <= 0.0 {
        return;
    }
    let impulse = dir * (magnitude / w);
    a.apply_velocity_impulse(r1, impulse);
    b.apply_velocity_impulse(r2, -impulse);
}

/// Per-world contact solver parameters.
#[derive(Debug, Clone, Copy)]
pub struct ContactSolver {
    /// Substep length.
    pub h: f32,
    pub restitution: f32,
    /// Below this pre-substep approach speed restitution is disabled.
    pub restitution_threshold: f32,
}

impl ContactSolver {
    pub fn new(config: &PhysicsConfig) -> Self {
        Self {
            h: config.substep_dt(),
            restitution: config.restitution,
            restitution_threshold: config.restitution_threshold(),
        }
    }

    /// Projects every contact once, in order, and records the accumulated
    /// normal and tangential multipliers on each contact. Within a contact,
    /// all normal pushes are applied before static friction.
    pub fn solve_positions(
        &self,
        bodies: &mut BodiesSoA,
        objects: &ObjectManager,
        contacts: &mut [Contact],
    ) -> Result<()> {
        for contact in contacts.iter_mut() {
            self.solve_contact_positions(bodies, objects, contact)?;
        }
        Ok(())
    }

    fn solve_contact_positions(
        &self,
        bodies: &mut BodiesSoA,
        objects: &ObjectManager,
        contact: &mut Contact,
    ) -> Result<()> {
        if contact.reference == contact.alternate {
            return Ok(());
        }
        let mut a = SolverBody::load(bodies, objects, contact.reference)?;
        let mut b = SolverBody::load(bodies, objects, contact.alternate)?;

        let n = contact.normal;
        let mut lambda_n = 0.0_f32;
        let mut pushed = [false; MAX_CONTACT_POINTS];

        for (i, was_pushed) in pushed.iter_mut().enumerate().take(contact.num_points) {
            let (r1, r2) = local_anchors(contact, i, &a, &b);
            let d = (a.world_point(r1) - b.world_point(r2)).dot(n);
            if d <= 0.0 {
                continue;
            }
            if let Some(delta) = correct_positions(&mut a, &mut b, r1, r2, n, d) {
                lambda_n += delta;
                *was_pushed = true;
            }
        }

        // Static friction runs once every normal push is in place, on the
        // anchor motion since before integration.
        let static_friction = 0.5 * (a.metadata.static_friction + b.metadata.static_friction);
        let bound = static_friction * lambda_n.abs();
        let mut lambda_t = 0.0_f32;

        for i in (0..contact.num_points).filter(|&i| pushed[i]) {
            let (r1, r2) = local_anchors(contact, i, &a, &b);
            let slip = (a.world_point(r1) - a.substep.prev.to_world(r1))
                - (b.world_point(r2) - b.substep.prev.to_world(r2));
            let slip_t = slip - n * slip.dot(n);
            let slip_len = slip_t.length();
            if slip_len <= SLIP_EPSILON {
                continue;
            }
            let t = slip_t / slip_len;
            let w = a.weight(r1, t) + b.weight(r2, t);
            if w <= 0.0 {
                continue;
            }
            let tentative = lambda_t - slip_len / w;
            if tentative.abs() <= bound {
                correct_positions(&mut a, &mut b, r1, r2, t, slip_len);
                lambda_t = tentative;
            }
        }

        a.store_pose(bodies);
        b.store_pose(bodies);
        contact.lambda_n = lambda_n;
        contact.lambda_t = lambda_t;
        Ok(())
    }

    /// Applies dynamic friction and restitution to the velocities rebuilt
    /// from the positional solve. Contacts with a zero normal multiplier
    /// are skipped.
    pub fn solve_velocities(
        &self,
        bodies: &mut BodiesSoA,
        objects: &ObjectManager,
        contacts: &[Contact],
    ) -> Result<()> {
        for contact in contacts {
            self.solve_contact_velocities(bodies, objects, contact)?;
        }
        Ok(())
    }

    fn solve_contact_velocities(
        &self,
        bodies: &mut BodiesSoA,
        objects: &ObjectManager,
        contact: &Contact,
    ) -> Result<()> {
        // Touching contacts that never needed a push get no velocity pass.
        if contact.reference == contact.alternate || contact.lambda_n == 0.0 {
            return Ok(());
        }
        let mut a = SolverBody::load(bodies, objects, contact.reference)?;
        let mut b = SolverBody::load(bodies, objects, contact.alternate)?;

        let n = contact.normal;
        let dynamic_friction = 0.5 * (a.metadata.dynamic_friction + b.metadata.dynamic_friction);
        let friction_limit = dynamic_friction * contact.lambda_n.abs() / self.h;

        for i in 0..contact.num_points {
            let (r1, r2) = local_anchors(contact, i, &a, &b);
            let r1_world = a.rotation * r1;
            let r2_world = b.rotation * r2;

            let v = a.velocity.at_point(r1_world) - b.velocity.at_point(r2_world);
            let vn = n.dot(v);
            let vt = v - n * vn;
            let vt_len = vt.length();

            if vt_len > 0.0 && friction_limit > 0.0 {
                let dir = vt / vt_len;
                correct_velocities(&mut a, &mut b, r1, r2, dir, -friction_limit.min(vt_len));
            }

            let v_bar = a.substep.velocity.at_point(r1_world) - b.substep.velocity.at_point(r2_world);
            let vn_bar = n.dot(v_bar);
            let e = if vn_bar.abs() <= self.restitution_threshold {
                0.0
            } else {
                self.restitution
            };
            let restitution = (-e * vn_bar).min(0.0) - vn;
            correct_velocities(&mut a, &mut b, r1, r2, n, restitution);
        }

        a.store_velocity(bodies);
        b.store_velocity(bodies);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::contact::ContactPoint;
    use crate::core::object::{CollisionPrimitive, ObjectDesc, ObjectId};
    use crate::core::soa::BodyDesc;
    use approx::assert_abs_diff_eq;

    const H: f32 = 1.0 / 240.0;

    struct Rig {
        objects: ObjectManager,
        bodies: BodiesSoA,
        solver: ContactSolver,
    }

    impl Rig {
        fn new() -> Self {
            let mut objects = ObjectManager::new();
            objects.add_object(ObjectDesc::new(
                CollisionPrimitive::Sphere { radius: 0.5 },
                RigidBodyMetadata::dynamic_sphere(1.0, 0.5, 0.5, 0.3),
            ));
            objects.add_object(ObjectDesc::new(
                CollisionPrimitive::Plane,
                RigidBodyMetadata::fixed(0.5, 0.3),
            ));
            Self {
                objects,
                bodies: BodiesSoA::new(8),
                solver: ContactSolver {
                    h: H,
                    restitution: 0.4,
                    restitution_threshold: 2.0 * 9.8 * H,
                },
            }
        }

        fn sphere(&mut self, position: Vec3, velocity: Velocity) -> EntityId {
            self.bodies
                .insert(
                    BodyDesc::new(ObjectId(0))
                        .with_position(position)
                        .with_velocity(velocity),
                )
                .expect("insert")
        }

        fn ground(&mut self) -> EntityId {
            self.bodies.insert(BodyDesc::new(ObjectId(1))).expect("insert")
        }
    }

    fn single_point(reference: EntityId, alternate: EntityId, normal: Vec3, point: Vec3, depth: f32) -> Contact {
        let mut contact = Contact::new(reference, alternate, normal);
        contact.push_point(ContactPoint::new(point, depth));
        contact
    }

    #[test]
    fn overlapping_spheres_are_pushed_apart_symmetrically() {
        let mut rig = Rig::new();
        let a = rig.sphere(Vec3::ZERO, Velocity::default());
        let b = rig.sphere(Vec3::new(0.0, 0.0, 0.9), Velocity::default());
        let mut contacts = [single_point(a, b, Vec3::Z, Vec3::new(0.0, 0.0, 0.45), 0.05)];

        rig.solver
            .solve_positions(&mut rig.bodies, &rig.objects, &mut contacts)
            .expect("solve");

        let pa = rig.bodies.get(a).expect("live").position();
        let pb = rig.bodies.get(b).expect("live").position();
        assert_abs_diff_eq!(pa.z, -0.05, epsilon = 1e-6);
        assert_abs_diff_eq!(pb.z, 0.95, epsilon = 1e-6);
        assert!((pb - pa).length() >= 1.0 - 1e-5);
        assert_abs_diff_eq!(contacts[0].lambda_n, -0.05, epsilon = 1e-6);
    }

    #[test]
    fn separated_contact_points_are_skipped() {
        let mut rig = Rig::new();
        let a = rig.sphere(Vec3::ZERO, Velocity::default());
        let b = rig.sphere(Vec3::new(0.0, 0.0, 1.2), Velocity::default());
        // Anchors sit 0.2 apart on the wrong side of each other.
        let mut contacts = [single_point(a, b, Vec3::Z, Vec3::new(0.0, 0.0, 0.6), -0.1)];
        rig.solver
            .solve_positions(&mut rig.bodies, &rig.objects, &mut contacts)
            .expect("solve");
        assert_eq!(rig.bodies.get(b).expect("live").position(), Vec3::new(0.0, 0.0, 1.2));
        assert_eq!(contacts[0].lambda_n, 0.0);
    }

    #[test]
    fn static_body_is_never_written() {
        let mut rig = Rig::new();
        let ground = rig.ground();
        let ball = rig.sphere(Vec3::new(0.0, 0.0, 0.4), Velocity::linear(Vec3::new(1.0, 0.0, -2.0)));
        rig.bodies.substeps[ball.index()].velocity.linear = Vec3::new(1.0, 0.0, -2.0);
        let mut contacts = [single_point(ball, ground, -Vec3::Z, Vec3::new(0.0, 0.0, -0.05), 0.05)];

        let before = rig.bodies.get(ground).map(|g| (g.position(), g.rotation(), g.velocity()));
        for _ in 0..5 {
            rig.solver
                .solve_positions(&mut rig.bodies, &rig.objects, &mut contacts)
                .expect("solve");
            rig.solver
                .solve_velocities(&mut rig.bodies, &rig.objects, &contacts)
                .expect("solve");
        }
        let after = rig.bodies.get(ground).map(|g| (g.position(), g.rotation(), g.velocity()));
        assert_eq!(before, after);

        let ball_z = rig.bodies.get(ball).expect("live").position().z;
        assert_abs_diff_eq!(ball_z, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn empty_buffer_leaves_velocities_alone() {
        let mut rig = Rig::new();
        let ball = rig.sphere(Vec3::ZERO, Velocity::new(Vec3::new(1.0, 2.0, 3.0), Vec3::X));
        rig.solver
            .solve_velocities(&mut rig.bodies, &rig.objects, &[])
            .expect("solve");
        assert_eq!(
            rig.bodies.get(ball).expect("live").velocity(),
            Velocity::new(Vec3::new(1.0, 2.0, 3.0), Vec3::X)
        );
    }

    #[test]
    fn fast_impact_bounces_with_restitution() {
        let mut rig = Rig::new();
        let ground = rig.ground();
        let ball = rig.sphere(Vec3::new(0.0, 0.0, 0.5), Velocity::linear(Vec3::new(0.0, 0.0, -5.0)));
        rig.bodies.substeps[ball.index()].velocity.linear = Vec3::new(0.0, 0.0, -5.0);
        let mut contact = single_point(ball, ground, -Vec3::Z, Vec3::ZERO, 0.0);
        contact.lambda_n = -1e-3;
        let contacts = [contact];

        rig.solver
            .solve_velocities(&mut rig.bodies, &rig.objects, &contacts)
            .expect("solve");
        let v = rig.bodies.get(ball).expect("live").velocity();
        assert_abs_diff_eq!(v.linear.z, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn slow_approach_does_not_bounce() {
        let mut rig = Rig::new();
        let ground = rig.ground();
        let slow = -0.5 * rig.solver.restitution_threshold;
        let ball = rig.sphere(Vec3::new(0.0, 0.0, 0.5), Velocity::linear(Vec3::new(0.0, 0.0, slow)));
        rig.bodies.substeps[ball.index()].velocity.linear = Vec3::new(0.0, 0.0, slow);
        let mut contact = single_point(ball, ground, -Vec3::Z, Vec3::ZERO, 0.0);
        contact.lambda_n = -1e-3;
        let contacts = [contact];

        rig.solver
            .solve_velocities(&mut rig.bodies, &rig.objects, &contacts)
            .expect("solve");
        let v = rig.bodies.get(ball).expect("live").velocity();
        assert_abs_diff_eq!(v.linear.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn contact_without_push_keeps_velocities() {
        let mut rig = Rig::new();
        let ground = rig.ground();
        let lifting = Velocity::linear(Vec3::new(0.5, 0.0, 0.3));
        let ball = rig.sphere(Vec3::new(0.0, 0.0, 0.5), lifting);
        let mut contacts = [single_point(ball, ground, -Vec3::Z, Vec3::ZERO, 0.0)];

        rig.solver
            .solve_positions(&mut rig.bodies, &rig.objects, &mut contacts)
            .expect("solve");
        assert_eq!(contacts[0].lambda_n, 0.0);
        rig.solver
            .solve_velocities(&mut rig.bodies, &rig.objects, &contacts)
            .expect("solve");
        assert_eq!(rig.bodies.get(ball).expect("live").velocity(), lifting);
    }

    #[test]
    fn static_friction_pulls_anchor_back_over_its_start() {
        let mut rig = Rig::new();
        let ground = rig.ground();
        let ball = rig.sphere(Vec3::new(0.002, 0.0, 0.49), Velocity::default());
        // Before integration the ball sat at the origin, touching the ground.
        rig.bodies.substeps[ball.index()].prev.position = Vec3::new(0.0, 0.0, 0.5);
        rig.bodies.substeps[ball.index()].prev.rotation = Quat::IDENTITY;
        rig.bodies.substeps[ball.index()].start.position = Vec3::new(0.002, 0.0, 0.49);
        rig.bodies.substeps[ball.index()].start.rotation = Quat::IDENTITY;
        let mut contacts = [single_point(
            ball,
            ground,
            -Vec3::Z,
            Vec3::new(0.002, 0.0, -0.005),
            0.005,
        )];

        rig.solver
            .solve_positions(&mut rig.bodies, &rig.objects, &mut contacts)
            .expect("solve");

        let body = rig.bodies.get(ball).expect("live");
        let contact_point = body.position() + body.rotation() * Vec3::new(0.0, 0.0, -0.5);
        assert_abs_diff_eq!(contacts[0].lambda_n, -0.01, epsilon = 1e-6);
        assert_abs_diff_eq!(body.position().z, 0.5, epsilon = 1e-6);
        // The anchor returns over its pre-integration position.
        assert_abs_diff_eq!(contact_point.x, 0.0, epsilon = 1e-5);
        assert!(contacts[0].lambda_t < 0.0);
        assert!(contacts[0].lambda_t.abs() <= 0.5 * contacts[0].lambda_n.abs());
    }

    #[test]
    fn dynamic_friction_slows_but_never_reverses_sliding() {
        let mut rig = Rig::new();
        let ground = rig.ground();
        let ball = rig.sphere(Vec3::new(0.0, 0.0, 0.5), Velocity::linear(Vec3::new(3.0, 0.0, 0.0)));
        let mut contact = single_point(ball, ground, -Vec3::Z, Vec3::ZERO, 0.0);
        contact.lambda_n = -0.01;

        rig.solver
            .solve_velocities(&mut rig.bodies, &rig.objects, &[contact])
            .expect("solve");
        let v = rig.bodies.get(ball).expect("live").velocity();
        let r = Vec3::new(0.0, 0.0, -0.5);
        // mu_d = 0.3, so the slip speed drops by 0.3 * 0.01 / h.
        assert_abs_diff_eq!(v.at_point(r).x, 3.0 - 0.3 * 0.01 / H, epsilon = 1e-4);
        assert!(v.linear.x > 0.0 && v.linear.x < 3.0);

        // A huge normal multiplier clamps friction to the slip speed.
        contact.lambda_n = -100.0;
        rig.solver
            .solve_velocities(&mut rig.bodies, &rig.objects, &[contact])
            .expect("solve");
        let v = rig.bodies.get(ball).expect("live").velocity();
        assert_abs_diff_eq!(v.at_point(r).x, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn stale_entity_is_reported() {
        let mut rig = Rig::new();
        let a = rig.sphere(Vec3::ZERO, Velocity::default());
        let b = rig.sphere(Vec3::Z, Velocity::default());
        rig.bodies.remove(b).expect("remove");
        let mut contacts = [single_point(a, b, Vec3::Z, Vec3::Z * 0.5, 0.01)];
        assert_eq!(
            rig.solver.solve_positions(&mut rig.bodies, &rig.objects, &mut contacts),
            Err(PhysicsError::InvalidEntity(b))
        );
    }
}
