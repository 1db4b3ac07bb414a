//! Global configuration for the Multiverse Physics core.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, Result};

/// Default gravity vector applied in every world (Z-up).
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, 0.0, -9.8];

/// Default length of one simulation step (in seconds).
pub const DEFAULT_TIME_STEP: f32 = 1.0 / 60.0;

/// Number of substeps each step is divided into.
pub const DEFAULT_SUBSTEPS: u32 = 4;

/// Contact buffer capacity per world per substep.
pub const DEFAULT_MAX_CONTACTS: usize = 4096;

/// Upper bound on bodies per world, used to size broadphase storage.
pub const DEFAULT_MAX_DYNAMIC_OBJECTS: usize = 1024;

/// Restitution coefficient applied to every contact whose approach speed
/// exceeds the resting threshold.
pub const DEFAULT_RESTITUTION: f32 = 0.4;

/// Default cell size for the broad-phase uniform grid.
pub const DEFAULT_BROADPHASE_CELL_SIZE: f32 = 4.0;

/// Maximum number of points stored in a single contact manifold.
pub const MAX_CONTACT_POINTS: usize = 4;

/// Separation up to which two shapes still count as touching. Such contacts
/// carry a depth of zero or slightly below and produce no positional push.
pub const CONTACT_MARGIN: f32 = 1e-4;

/// What the narrowphase does when a manifold does not fit in the contact buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OverflowPolicy {
    /// Drop the manifold, bump the dropped counter and keep stepping.
    #[default]
    Drop,
    /// Abort the step with [`PhysicsError::CapacityExceeded`].
    Fail,
}

/// Options fixed when worlds are created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub max_contacts_per_world: usize,
    pub delta_t: f32,
    pub num_substeps: u32,
    pub gravity: Vec3,
    pub max_dynamic_objects: usize,
    pub restitution: f32,
    pub broadphase_cell_size: f32,
    pub contact_overflow: OverflowPolicy,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            max_contacts_per_world: DEFAULT_MAX_CONTACTS,
            delta_t: DEFAULT_TIME_STEP,
            num_substeps: DEFAULT_SUBSTEPS,
            gravity: Vec3::from_array(DEFAULT_GRAVITY),
            max_dynamic_objects: DEFAULT_MAX_DYNAMIC_OBJECTS,
            restitution: DEFAULT_RESTITUTION,
            broadphase_cell_size: DEFAULT_BROADPHASE_CELL_SIZE,
            contact_overflow: OverflowPolicy::default(),
        }
    }
}

impl PhysicsConfig {
    pub fn with_substeps(mut self, num_substeps: u32) -> Self {
        self.num_substeps = num_substeps;
        self
    }

    pub fn with_delta_t(mut self, delta_t: f32) -> Self {
        self.delta_t = delta_t;
        self
    }

    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_max_contacts(mut self, max_contacts: usize) -> Self {
        self.max_contacts_per_world = max_contacts;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.contact_overflow = policy;
        self
    }

    /// Length of a single substep.
    pub fn substep_dt(&self) -> f32 {
        self.delta_t / self.num_substeps.max(1) as f32
    }

    /// Normal approach speed below which restitution is suppressed.
    pub fn restitution_threshold(&self) -> f32 {
        2.0 * self.gravity.length() * self.substep_dt()
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_substeps == 0 {
            return Err(PhysicsError::InvalidConfig(
                "num_substeps must be at least 1".into(),
            ));
        }
        if self.max_contacts_per_world == 0 {
            return Err(PhysicsError::InvalidConfig(
                "max_contacts_per_world must be at least 1".into(),
            ));
        }
        if !self.delta_t.is_finite() || self.delta_t <= 0.0 {
            return Err(PhysicsError::InvalidConfig(format!(
                "delta_t must be positive and finite, got {}",
                self.delta_t
            )));
        }
        if !self.gravity.is_finite() {
            return Err(PhysicsError::InvalidConfig("gravity must be finite".into()));
        }
        if !(0.0..=1.0).contains(&self.restitution) {
            return Err(PhysicsError::InvalidConfig(format!(
                "restitution must lie in [0, 1], got {}",
                self.restitution
            )));
        }
        if !self.broadphase_cell_size.is_finite() || self.broadphase_cell_size <= 0.0 {
            return Err(PhysicsError::InvalidConfig(
                "broadphase_cell_size must be positive".into(),
            ));
        }
        Ok(())
    }
}
