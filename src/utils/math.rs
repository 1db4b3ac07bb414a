//! Additional math helpers layered on top of `glam`.

use glam::{Quat, Vec3};

/// Inverts each component of a diagonal, mapping zero to zero.
pub fn invert_diagonal(diag: Vec3) -> Vec3 {
    let inv = |v: f32| if v == 0.0 { 0.0 } else { 1.0 / v };
    Vec3::new(inv(diag.x), inv(diag.y), inv(diag.z))
}

/// Generalized inverse mass of a body for a correction along `n` applied at
/// `r`. Both vectors are expressed in the body frame, where the inverse
/// inertia is diagonal.
pub fn generalized_inverse_mass(r: Vec3, inv_mass: f32, inv_inertia: Vec3, n: Vec3) -> f32 {
    let r_cross_n = r.cross(n);
    inv_mass + (inv_inertia * r_cross_n).dot(r_cross_n)
}

/// Adds a small body-frame rotation `omega_local` to `rotation` using the
/// first-order quaternion update and renormalizes.
pub fn apply_local_rotation(rotation: Quat, omega_local: Vec3) -> Quat {
    let delta = rotation * Quat::from_xyzw(omega_local.x, omega_local.y, omega_local.z, 0.0);
    let q = Quat::from_xyzw(
        rotation.x + 0.5 * delta.x,
        rotation.y + 0.5 * delta.y,
        rotation.z + 0.5 * delta.z,
        rotation.w + 0.5 * delta.w,
    );
    q.normalize()
}

/// Angular velocity that carries `previous` onto `current` in time `dt`,
/// taking the shorter of the two equivalent rotations.
pub fn angular_velocity_between(previous: Quat, current: Quat, dt: f32) -> Vec3 {
    let delta = current * previous.inverse();
    let omega = 2.0 / dt * Vec3::new(delta.x, delta.y, delta.z);
    if delta.w >= 0.0 {
        omega
    } else {
        -omega
    }
}

/// Solid sphere inertia diagonal.
pub fn inertia_sphere(radius: f32, mass: f32) -> Vec3 {
    Vec3::splat(0.4 * mass * radius * radius)
}

/// Solid box inertia diagonal.
pub fn inertia_cuboid(half_extents: Vec3, mass: f32) -> Vec3 {
    let size = half_extents * 2.0;
    let factor = mass / 12.0;
    Vec3::new(
        factor * (size.y * size.y + size.z * size.z),
        factor * (size.x * size.x + size.z * size.z),
        factor * (size.x * size.x + size.y * size.y),
    )
}
