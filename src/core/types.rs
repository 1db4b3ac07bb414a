use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Linear and angular velocity of a rigid body. Both are world-space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: Vec3,
    pub angular: Vec3,
}

impl Default for Velocity {
    fn default() -> Self {
        Self {
            linear: Vec3::ZERO,
            angular: Vec3::ZERO,
        }
    }
}

impl Velocity {
    pub fn new(linear: Vec3, angular: Vec3) -> Self {
        Self { linear, angular }
    }

    pub fn linear(linear: Vec3) -> Self {
        Self {
            linear,
            angular: Vec3::ZERO,
        }
    }

    /// Velocity of the material point at world-space offset `r` from the center.
    pub fn at_point(&self, r: Vec3) -> Vec3 {
        self.linear + self.angular.cross(r)
    }
}

/// Pose captured before the current substep's integration. The finite
/// difference against it yields the post-solve velocity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubstepPrevState {
    pub position: Vec3,
    pub rotation: Quat,
}

/// Pose captured after integration and before narrowphase. Contact anchors
/// are expressed relative to it for the remainder of the substep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubstepStartState {
    pub position: Vec3,
    pub rotation: Quat,
}

/// Velocity captured before gravity is applied; the baseline for restitution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubstepVelocityState {
    pub linear: Vec3,
    pub angular: Vec3,
}

impl SubstepVelocityState {
    pub fn at_point(&self, r: Vec3) -> Vec3 {
        self.linear + self.angular.cross(r)
    }
}

macro_rules! pose_default {
    ($ty:ty) => {
        impl Default for $ty {
            fn default() -> Self {
                Self {
                    position: Vec3::ZERO,
                    rotation: Quat::IDENTITY,
                }
            }
        }

        impl $ty {
            pub fn new(position: Vec3, rotation: Quat) -> Self {
                Self { position, rotation }
            }

            /// Maps a body-frame offset into world space.
            pub fn to_world(&self, local: Vec3) -> Vec3 {
                self.position + self.rotation * local
            }

            /// Maps a world-space point into the body frame.
            pub fn to_local(&self, world: Vec3) -> Vec3 {
                self.rotation.inverse() * (world - self.position)
            }
        }
    };
}

pose_default!(SubstepPrevState);
pose_default!(SubstepStartState);

impl Default for SubstepVelocityState {
    fn default() -> Self {
        Self {
            linear: Vec3::ZERO,
            angular: Vec3::ZERO,
        }
    }
}

/// The three per-body snapshots the substep pipeline maintains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubstepState {
    pub prev: SubstepPrevState,
    pub start: SubstepStartState,
    pub velocity: SubstepVelocityState,
}

impl SubstepState {
    /// Snapshot for a body that has not been stepped yet.
    pub fn at_rest(position: Vec3, rotation: Quat, velocity: Velocity) -> Self {
        Self {
            prev: SubstepPrevState::new(position, rotation),
            start: SubstepStartState::new(position, rotation),
            velocity: SubstepVelocityState {
                linear: velocity.linear,
                angular: velocity.angular,
            },
        }
    }
}
