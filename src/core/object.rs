//! Shape and mass database shared by every world.
//!
//! Each registered object type carries a collision primitive, its local
//! bounding box and the mass/friction data the solvers read. The database is
//! populated up front and treated as immutable while worlds are stepping.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::aabb::Aabb;
use super::hull::ConvexHull;
use crate::error::{PhysicsError, Result};
use crate::utils::math::{inertia_cuboid, inertia_sphere, invert_diagonal};

/// Index into the [`ObjectManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl ObjectId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Primitive type flag. The narrowphase ORs two flags to pick a routine, so
/// every value is a distinct bit.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Sphere = 1,
    Hull = 2,
    Plane = 4,
}

impl PrimitiveKind {
    pub fn flag(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone)]
pub enum CollisionPrimitive {
    Sphere { radius: f32 },
    /// Convex polyhedron; scaled per body.
    Hull(ConvexHull),
    /// Infinite plane through the body origin with normal along local +Z.
    Plane,
}

impl CollisionPrimitive {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            CollisionPrimitive::Sphere { .. } => PrimitiveKind::Sphere,
            CollisionPrimitive::Hull(_) => PrimitiveKind::Hull,
            CollisionPrimitive::Plane => PrimitiveKind::Plane,
        }
    }

    pub fn local_aabb(&self) -> Aabb {
        match self {
            CollisionPrimitive::Sphere { radius } => Aabb::from_half_extents(Vec3::splat(*radius)),
            CollisionPrimitive::Hull(hull) => hull.local_aabb(),
            CollisionPrimitive::Plane => Aabb::unbounded(),
        }
    }
}

/// Mass and friction data read by the integrator and both solvers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyMetadata {
    /// Zero means infinite mass; such bodies are never moved.
    pub inv_mass: f32,
    /// Diagonal of the inverse inertia tensor in the body frame.
    pub inv_inertia: Vec3,
    pub static_friction: f32,
    pub dynamic_friction: f32,
}

impl Default for RigidBodyMetadata {
    fn default() -> Self {
        Self::fixed(0.5, 0.3)
    }
}

impl RigidBodyMetadata {
    pub fn new(inv_mass: f32, inv_inertia: Vec3, static_friction: f32, dynamic_friction: f32) -> Self {
        Self {
            inv_mass,
            inv_inertia,
            static_friction,
            dynamic_friction,
        }
    }

    pub fn dynamic_sphere(mass: f32, radius: f32, static_friction: f32, dynamic_friction: f32) -> Self {
        Self::from_mass(mass, inertia_sphere(radius, mass), static_friction, dynamic_friction)
    }

    pub fn dynamic_cuboid(
        mass: f32,
        half_extents: Vec3,
        static_friction: f32,
        dynamic_friction: f32,
    ) -> Self {
        Self::from_mass(
            mass,
            inertia_cuboid(half_extents, mass),
            static_friction,
            dynamic_friction,
        )
    }

    /// Immovable body (ground planes, walls).
    pub fn fixed(static_friction: f32, dynamic_friction: f32) -> Self {
        Self::new(0.0, Vec3::ZERO, static_friction, dynamic_friction)
    }

    fn from_mass(mass: f32, inertia: Vec3, static_friction: f32, dynamic_friction: f32) -> Self {
        if mass <= 0.0 {
            return Self::fixed(static_friction, dynamic_friction);
        }
        Self::new(1.0 / mass, invert_diagonal(inertia), static_friction, dynamic_friction)
    }

    pub fn is_static(&self) -> bool {
        self.inv_mass == 0.0
    }
}

/// Registration input for [`ObjectManager::add_object`].
#[derive(Debug, Clone)]
pub struct ObjectDesc {
    pub primitive: CollisionPrimitive,
    pub metadata: RigidBodyMetadata,
}

impl ObjectDesc {
    pub fn new(primitive: CollisionPrimitive, metadata: RigidBodyMetadata) -> Self {
        Self {
            primitive,
            metadata,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObjectRecord {
    pub aabb: Aabb,
    pub primitive: CollisionPrimitive,
    pub metadata: RigidBodyMetadata,
}

#[derive(Debug, Default, Clone)]
pub struct ObjectManager {
    objects: Vec<ObjectRecord>,
}

impl ObjectManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(&mut self, desc: ObjectDesc) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(ObjectRecord {
            aabb: desc.primitive.local_aabb(),
            primitive: desc.primitive,
            metadata: desc.metadata,
        });
        log::debug!("registered object {:?} ({:?})", id, self.objects[id.index()].primitive.kind());
        id
    }

    pub fn get(&self, id: ObjectId) -> Result<&ObjectRecord> {
        self.objects
            .get(id.index())
            .ok_or(PhysicsError::UnknownObject(id))
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        id.index() < self.objects.len()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
