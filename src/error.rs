//! Error types for the physics core.
//!
//! Everything the pipeline can refuse is a precondition violation rather than a
//! transient fault, so no variant is retried internally.

use thiserror::Error;

use crate::core::object::{ObjectId, PrimitiveKind};
use crate::utils::allocator::EntityId;

/// Unified error type returned by fallible physics operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    /// A contact buffer reservation did not fit in the remaining slots.
    #[error("contact buffer full: requested {requested} slot(s), capacity {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },

    /// The shape pair has no narrowphase routine.
    #[error("no narrowphase routine for {a:?} against {b:?}")]
    UnsupportedShapePair { a: PrimitiveKind, b: PrimitiveKind },

    /// The object id is not registered in the shape/mass database.
    #[error("object {0:?} is not registered")]
    UnknownObject(ObjectId),

    /// The entity handle is stale or was never issued by this world.
    #[error("entity {0} is not alive in this world")]
    InvalidEntity(EntityId),

    /// The world already holds its configured maximum number of bodies.
    #[error("body limit of {capacity} reached")]
    BodyLimitReached { capacity: usize },

    /// A convex hull description was rejected.
    #[error("invalid convex hull: {0}")]
    InvalidHull(String),

    /// A configuration value was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PhysicsError>;
