//! Utility helpers: entity allocation, math extensions, logging and profiling.

pub mod allocator;
pub mod logging;
pub mod math;
pub mod profiling;

pub use allocator::{EntityId, GenerationalId, SlotAllocator};
pub use math::*;
pub use profiling::PhysicsProfiler;
