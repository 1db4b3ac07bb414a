//! Collision detection: broadphase, narrowphase dispatch, hull manifolds, contacts.

pub mod broadphase;
pub mod clipping;
pub mod contact;
pub mod events;
pub mod narrowphase;
pub mod sat;

pub use broadphase::{BroadPhase, SpatialGrid};
pub use contact::{Contact, ContactBuffer, ContactPoint};
pub use events::{CandidateCollision, CollisionEvent, EventCollector};
pub use narrowphase::{Narrowphase, NarrowphaseScratch};
pub use sat::{
    CollisionMesh, HullScratch, Manifold, ManifoldGenerator, ManifoldScratch, ReferenceSide,
    SatManifoldGenerator, WorldPlane,
};
