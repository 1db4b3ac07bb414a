//! Core data: body storage, substep snapshots, and the shape/mass database.

pub mod aabb;
pub mod hull;
pub mod object;
pub mod soa;
pub mod types;

pub use aabb::Aabb;
pub use hull::{ConvexHull, HullFace};
pub use object::{
    CollisionPrimitive, ObjectDesc, ObjectId, ObjectManager, ObjectRecord, PrimitiveKind,
    RigidBodyMetadata,
};
pub use soa::{BodiesSoA, BodyDesc, BodyProxyMut, BodyRef};
pub use types::{
    SubstepPrevState, SubstepStartState, SubstepState, SubstepVelocityState, Velocity,
};
