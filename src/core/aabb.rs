use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    /// Box covering all of space; used for planes.
    pub fn unbounded() -> Self {
        Self {
            min: Vec3::splat(f32::NEG_INFINITY),
            max: Vec3::splat(f32::INFINITY),
        }
    }

    pub fn from_half_extents(half_extents: Vec3) -> Self {
        Self::new(-half_extents, half_extents)
    }

    pub fn from_points(points: &[Vec3]) -> Self {
        let mut bounds = Self::empty();
        for &p in points {
            bounds.extend(p);
        }
        bounds
    }

    pub fn extend(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn is_bounded(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    pub fn extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    pub fn scaled(&self, scale: Vec3) -> Aabb {
        let a = self.min * scale;
        let b = self.max * scale;
        Aabb::new(a.min(b), a.max(b))
    }

    /// Bounds of this box after rotating it by `rotation` and moving it to
    /// `position` (Arvo's method). Unbounded boxes stay unbounded.
    pub fn transformed(&self, position: Vec3, rotation: Quat) -> Aabb {
        if !self.is_bounded() {
            return Aabb::unbounded();
        }

        let rot = Mat3::from_quat(rotation);
        let mut out = Aabb::new(position, position);
        for i in 0..3 {
            for j in 0..3 {
                // Row i, column j of the rotation matrix.
                let m = rot.col(j)[i];
                let e = m * self.min[j];
                let f = m * self.max[j];
                if e < f {
                    out.min[i] += e;
                    out.max[i] += f;
                } else {
                    out.min[i] += f;
                    out.max[i] += e;
                }
            }
        }
        out
    }
}
