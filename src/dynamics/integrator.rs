use glam::{Quat, Vec3};

use crate::core::object::{ObjectManager, RigidBodyMetadata};
use crate::core::soa::{BodiesSoA, BodyProxyMut};
use crate::core::types::{SubstepPrevState, SubstepStartState, SubstepVelocityState};
use crate::error::Result;
use crate::utils::math::{angular_velocity_between, invert_diagonal};

/// Advances bodies by one substep and rebuilds velocities after the
/// positional solve.
#[derive(Debug, Clone, Copy)]
pub struct Integrator {
    /// Substep length.
    pub h: f32,
    pub gravity: Vec3,
}

impl Integrator {
    pub fn new(h: f32, gravity: Vec3) -> Self {
        Self { h, gravity }
    }

    /// Snapshots the pre-step pose and velocity, applies gravity, moves the
    /// body, and snapshots the post-integration pose as the substep anchor.
    pub fn integrate_body(&self, body: &mut BodyProxyMut<'_>, metadata: &RigidBodyMetadata) {
        let h = self.h;
        body.substep.prev = SubstepPrevState::new(*body.position, *body.rotation);
        body.substep.velocity = SubstepVelocityState {
            linear: body.velocity.linear,
            angular: body.velocity.angular,
        };

        if metadata.inv_mass > 0.0 {
            body.velocity.linear += self.gravity * h;
        }
        *body.position += body.velocity.linear * h;

        // Gyroscopic term, no external torque: w += h * I^-1 (-(w x I w)),
        // evaluated in the body frame where the inertia is diagonal.
        let rotation = *body.rotation;
        if metadata.inv_inertia != Vec3::ZERO {
            let mut omega_local = rotation.inverse() * body.velocity.angular;
            let inertia = invert_diagonal(metadata.inv_inertia);
            let torque = -omega_local.cross(inertia * omega_local);
            omega_local += h * metadata.inv_inertia * torque;
            body.velocity.angular = rotation * omega_local;
        }

        if body.velocity.angular != Vec3::ZERO {
            let delta = Quat::from_scaled_axis(body.velocity.angular * h);
            *body.rotation = (delta * rotation).normalize();
        }

        body.substep.start = SubstepStartState::new(*body.position, *body.rotation);
    }

    /// Integrates every live body. Fails on the first body whose object id
    /// is not registered.
    pub fn substep(&self, bodies: &mut BodiesSoA, objects: &ObjectManager) -> Result<()> {
        bodies.try_for_each_mut(|mut body| {
            let record = objects.get(body.object)?;
            self.integrate_body(&mut body, &record.metadata);
            Ok(())
        })
    }

    /// Finite-difference velocity against the pre-integration pose.
    /// Bodies with zero inverse mass keep their velocity.
    pub fn reconstruct_body_velocity(&self, body: &mut BodyProxyMut<'_>, metadata: &RigidBodyMetadata) {
        if metadata.inv_mass == 0.0 {
            return;
        }
        let prev = body.substep.prev;
        body.velocity.linear = (*body.position - prev.position) / self.h;
        body.velocity.angular = angular_velocity_between(prev.rotation, *body.rotation, self.h);
    }

    pub fn reconstruct_velocities(&self, bodies: &mut BodiesSoA, objects: &ObjectManager) -> Result<()> {
        bodies.try_for_each_mut(|mut body| {
            let record = objects.get(body.object)?;
            self.reconstruct_body_velocity(&mut body, &record.metadata);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::object::{CollisionPrimitive, ObjectDesc};
    use crate::core::soa::BodyDesc;
    use crate::core::types::Velocity;
    use crate::error::PhysicsError;
    use approx::assert_abs_diff_eq;

    fn setup() -> (ObjectManager, BodiesSoA) {
        let mut objects = ObjectManager::new();
        objects.add_object(ObjectDesc::new(
            CollisionPrimitive::Sphere { radius: 0.5 },
            RigidBodyMetadata::dynamic_sphere(1.0, 0.5, 0.5, 0.3),
        ));
        objects.add_object(ObjectDesc::new(
            CollisionPrimitive::Plane,
            RigidBodyMetadata::fixed(0.5, 0.3),
        ));
        objects.add_object(ObjectDesc::new(
            CollisionPrimitive::Sphere { radius: 0.5 },
            RigidBodyMetadata::new(1.0, Vec3::new(1.0, 2.0, 4.0), 0.5, 0.3),
        ));
        (objects, BodiesSoA::new(16))
    }

    #[test]
    fn gravity_is_applied_before_position_update() {
        let (objects, mut bodies) = setup();
        let id = bodies
            .insert(BodyDesc::new(crate::core::object::ObjectId(0)).with_position(Vec3::Z))
            .expect("insert");
        let h = 0.01;
        Integrator::new(h, Vec3::new(0.0, 0.0, -10.0))
            .substep(&mut bodies, &objects)
            .expect("substep");

        let body = bodies.get(id).expect("live");
        assert_abs_diff_eq!(body.velocity().linear.z, -0.1, epsilon = 1e-6);
        assert_abs_diff_eq!(body.position().z, 1.0 - 0.001, epsilon = 1e-6);
        assert_eq!(body.substep_state().prev.position, Vec3::Z);
        assert_eq!(body.substep_state().velocity.linear, Vec3::ZERO);
        assert_eq!(body.substep_state().start.position, body.position());
    }

    #[test]
    fn static_bodies_do_not_move() {
        let (objects, mut bodies) = setup();
        let rotation = Quat::from_rotation_x(0.3);
        let id = bodies
            .insert(
                BodyDesc::new(crate::core::object::ObjectId(1))
                    .with_position(Vec3::new(1.0, 2.0, 3.0))
                    .with_rotation(rotation),
            )
            .expect("insert");
        let before = bodies.get(id).map(|b| (b.position(), b.rotation(), b.velocity()));
        let integrator = Integrator::new(1.0 / 240.0, Vec3::new(0.0, 0.0, -9.8));
        for _ in 0..10 {
            integrator.substep(&mut bodies, &objects).expect("substep");
            integrator
                .reconstruct_velocities(&mut bodies, &objects)
                .expect("reconstruct");
        }
        let after = bodies.get(id).map(|b| (b.position(), b.rotation(), b.velocity()));
        assert_eq!(before, after);
    }

    #[test]
    fn spinning_body_keeps_unit_rotation_and_velocity_round_trips() {
        let (objects, mut bodies) = setup();
        let id = bodies
            .insert(
                BodyDesc::new(crate::core::object::ObjectId(2))
                    .with_velocity(Velocity::new(Vec3::X, Vec3::new(0.3, 5.0, 1.0))),
            )
            .expect("insert");
        let integrator = Integrator::new(1.0 / 240.0, Vec3::ZERO);
        for _ in 0..500 {
            integrator.substep(&mut bodies, &objects).expect("substep");
            let rotation = bodies.get(id).expect("live").rotation();
            assert_abs_diff_eq!(rotation.length(), 1.0, epsilon = 1e-5);
        }

        let before = bodies.get(id).expect("live").velocity();
        integrator
            .reconstruct_velocities(&mut bodies, &objects)
            .expect("reconstruct");
        let after = bodies.get(id).expect("live").velocity();
        assert_abs_diff_eq!(after.linear.x, before.linear.x, epsilon = 1e-3);
        assert_abs_diff_eq!((after.angular - before.angular).length(), 0.0, epsilon = 1e-2);
    }

    #[test]
    fn unregistered_object_fails_the_pass() {
        let (objects, mut bodies) = setup();
        let ghost = bodies
            .insert(BodyDesc::new(crate::core::object::ObjectId(9)).with_position(Vec3::Z))
            .expect("insert");
        let integrator = Integrator::new(1.0 / 240.0, Vec3::new(0.0, 0.0, -9.8));

        assert_eq!(
            integrator.substep(&mut bodies, &objects),
            Err(PhysicsError::UnknownObject(crate::core::object::ObjectId(9)))
        );
        assert_eq!(
            integrator.reconstruct_velocities(&mut bodies, &objects),
            Err(PhysicsError::UnknownObject(crate::core::object::ObjectId(9)))
        );
        assert!(bodies.get(ghost).is_some());
    }
}
