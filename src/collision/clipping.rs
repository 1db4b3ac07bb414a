use glam::Vec3;

const EPSILON: f32 = 1e-4;

/// Half-space `normal · p <= distance`; points on the negative side are kept.
#[derive(Debug, Clone, Copy)]
pub struct ClipPlane {
    normal: Vec3,
    distance: f32,
}

impl ClipPlane {
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let n = normal.normalize_or_zero();
        Self {
            normal: n,
            distance: n.dot(point),
        }
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.distance
    }
}

/// Clips the polygon against each plane in turn (Sutherland-Hodgman),
/// leaving the result in `output`. `scratch` is reused between passes.
pub fn clip_polygon(
    vertices: &[Vec3],
    planes: &[ClipPlane],
    output: &mut Vec<Vec3>,
    scratch: &mut Vec<Vec3>,
) {
    output.clear();
    output.extend_from_slice(vertices);
    for plane in planes {
        std::mem::swap(output, scratch);
        clip_against_plane(scratch, *plane, output);
        if output.is_empty() {
            break;
        }
    }
}

fn clip_against_plane(vertices: &[Vec3], plane: ClipPlane, clipped: &mut Vec<Vec3>) {
    clipped.clear();
    if vertices.is_empty() {
        return;
    }

    for i in 0..vertices.len() {
        let current = vertices[i];
        let next = vertices[(i + 1) % vertices.len()];

        let current_dist = plane.signed_distance(current);
        let next_dist = plane.signed_distance(next);

        let current_inside = current_dist <= EPSILON;
        let next_inside = next_dist <= EPSILON;

        if current_inside && next_inside {
            clipped.push(next);
        } else if current_inside && !next_inside {
            if let Some(intersection) = line_plane_intersection(current, next, current_dist, next_dist)
            {
                clipped.push(intersection);
            }
        } else if !current_inside && next_inside {
            if let Some(intersection) = line_plane_intersection(current, next, current_dist, next_dist)
            {
                clipped.push(intersection);
            }
            clipped.push(next);
        }
    }
}

fn line_plane_intersection(
    start: Vec3,
    end: Vec3,
    start_dist: f32,
    end_dist: f32,
) -> Option<Vec3> {
    let denom = start_dist - end_dist;
    if denom.abs() <= EPSILON {
        return None;
    }
    let t = start_dist / denom;
    Some(start + (end - start) * t)
}

/// Side planes of a convex polygon wound counter-clockwise about `normal`,
/// each facing away from the polygon's interior.
pub fn polygon_side_planes(polygon: &[Vec3], normal: Vec3, planes: &mut Vec<ClipPlane>) {
    planes.clear();
    for i in 0..polygon.len() {
        let a = polygon[i];
        let b = polygon[(i + 1) % polygon.len()];
        planes.push(ClipPlane::from_point_normal(a, (b - a).cross(normal)));
    }
}
