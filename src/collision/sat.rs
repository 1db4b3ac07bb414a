//! Separating-axis manifolds for convex hulls.
//!
//! The narrowphase only needs "two transformed hulls in, one manifold out",
//! so the routine sits behind [`ManifoldGenerator`] and can be replaced.

use glam::{Quat, Vec3};

use super::clipping::{clip_polygon, polygon_side_planes, ClipPlane};
use super::contact::ContactPoint;
use crate::config::{CONTACT_MARGIN, MAX_CONTACT_POINTS};
use crate::core::hull::ConvexHull;

/// Prefer face contacts over edge contacts unless the edge axis separates
/// the hulls by at least this much more.
const EDGE_TOLERANCE: f32 = 1e-3;
/// Prefer the first hull's face unless the second's is clearly better.
const FACE_TOLERANCE: f32 = 1e-3;
const PARALLEL_EPSILON: f32 = 1e-6;

/// World-space vertex and face-normal buffers for one hull.
#[derive(Debug, Default, Clone)]
pub struct HullScratch {
    vertices: Vec<Vec3>,
    normals: Vec<Vec3>,
}

/// Hull placed in the world: topology from the hull, coordinates from scratch.
#[derive(Debug, Clone, Copy)]
pub struct CollisionMesh<'a> {
    pub hull: &'a ConvexHull,
    pub vertices: &'a [Vec3],
    pub normals: &'a [Vec3],
}

impl<'a> CollisionMesh<'a> {
    /// Applies scale, rotation and translation to every vertex. Face normals
    /// use the inverse-transpose of the scale. Scale components must be
    /// positive.
    pub fn transform(
        hull: &'a ConvexHull,
        position: Vec3,
        rotation: Quat,
        scale: Vec3,
        scratch: &'a mut HullScratch,
    ) -> Self {
        scratch.vertices.clear();
        scratch
            .vertices
            .extend(hull.vertices().iter().map(|v| position + rotation * (*v * scale)));
        scratch.normals.clear();
        scratch.normals.extend(
            hull.faces()
                .iter()
                .map(|face| (rotation * (face.normal / scale)).normalize_or_zero()),
        );

        let scratch: &'a HullScratch = scratch;
        Self {
            hull,
            vertices: &scratch.vertices,
            normals: &scratch.normals,
        }
    }

    fn centroid(&self) -> Vec3 {
        self.vertices.iter().copied().sum::<Vec3>() / self.vertices.len().max(1) as f32
    }

    fn project(&self, axis: Vec3) -> (f32, f32) {
        self.vertices
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                let d = axis.dot(*v);
                (lo.min(d), hi.max(d))
            })
    }

    fn face_polygon(&self, face: usize, out: &mut Vec<Vec3>) {
        out.clear();
        out.extend(
            self.hull.faces()[face]
                .indices
                .iter()
                .map(|&i| self.vertices[i as usize]),
        );
    }

    fn edge(&self, edge: usize) -> (Vec3, Vec3) {
        let [i, j] = self.hull.edges()[edge];
        (self.vertices[i as usize], self.vertices[j as usize])
    }
}

/// Infinite plane in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldPlane {
    pub point: Vec3,
    /// Unit normal; the solid side is behind it.
    pub normal: Vec3,
}

/// Which of the two inputs owns the manifold normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSide {
    First,
    Second,
}

/// Contact manifold returned by a [`ManifoldGenerator`]. `normal` points from
/// the reference side into the other side; point conventions match
/// [`Contact`](super::contact::Contact).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Manifold {
    pub points: [ContactPoint; MAX_CONTACT_POINTS],
    pub num_points: usize,
    pub normal: Vec3,
    pub reference: ReferenceSide,
}

impl Manifold {
    pub fn points(&self) -> &[ContactPoint] {
        &self.points[..self.num_points]
    }
}

/// Reusable buffers for manifold generation; one per narrowphase task.
#[derive(Debug, Default, Clone)]
pub struct ManifoldScratch {
    reference_polygon: Vec<Vec3>,
    incident_polygon: Vec<Vec3>,
    planes: Vec<ClipPlane>,
    clipped: Vec<Vec3>,
    clip_tmp: Vec<Vec3>,
    candidates: Vec<ContactPoint>,
}

pub trait ManifoldGenerator: Send + Sync {
    fn hull_hull(
        &self,
        a: &CollisionMesh<'_>,
        b: &CollisionMesh<'_>,
        scratch: &mut ManifoldScratch,
    ) -> Option<Manifold>;

    /// The plane is always the reference side.
    fn hull_plane(
        &self,
        hull: &CollisionMesh<'_>,
        plane: &WorldPlane,
        scratch: &mut ManifoldScratch,
    ) -> Option<Manifold>;
}

/// Face/edge separating-axis test with incident-face clipping.
#[derive(Debug, Default, Clone, Copy)]
pub struct SatManifoldGenerator;

impl ManifoldGenerator for SatManifoldGenerator {
    fn hull_hull(
        &self,
        a: &CollisionMesh<'_>,
        b: &CollisionMesh<'_>,
        scratch: &mut ManifoldScratch,
    ) -> Option<Manifold> {
        let (sep_a, face_a) = query_faces(a, b)?;
        if sep_a > CONTACT_MARGIN {
            return None;
        }
        let (sep_b, face_b) = query_faces(b, a)?;
        if sep_b > CONTACT_MARGIN {
            return None;
        }
        let edge = query_edges(a, b);
        if edge.map_or(false, |e| e.separation > CONTACT_MARGIN) {
            return None;
        }

        let face_separation = sep_a.max(sep_b);
        if let Some(edge) = edge.filter(|e| e.separation > face_separation + EDGE_TOLERANCE) {
            return edge_contact(a, b, &edge);
        }

        if sep_b > sep_a + FACE_TOLERANCE {
            face_contact(b, face_b, a, ReferenceSide::Second, scratch)
        } else {
            face_contact(a, face_a, b, ReferenceSide::First, scratch)
        }
    }

    fn hull_plane(
        &self,
        hull: &CollisionMesh<'_>,
        plane: &WorldPlane,
        scratch: &mut ManifoldScratch,
    ) -> Option<Manifold> {
        let n = plane.normal;
        scratch.candidates.clear();
        for v in hull.vertices {
            let s = n.dot(*v - plane.point);
            if s <= CONTACT_MARGIN {
                scratch
                    .candidates
                    .push(ContactPoint::new(*v - n * (s * 0.5), -s * 0.5));
            }
        }
        build_manifold(&scratch.candidates, n, ReferenceSide::Second)
    }
}

/// Deepest signed distance of `incident` behind any face of `reference`.
fn query_faces(reference: &CollisionMesh<'_>, incident: &CollisionMesh<'_>) -> Option<(f32, usize)> {
    let mut best: Option<(f32, usize)> = None;
    for (i, face) in reference.hull.faces().iter().enumerate() {
        let n = reference.normals[i];
        let origin = reference.vertices[face.indices[0] as usize];
        let separation = incident
            .vertices
            .iter()
            .map(|v| n.dot(*v - origin))
            .fold(f32::INFINITY, f32::min);
        if best.map_or(true, |(s, _)| separation > s) {
            best = Some((separation, i));
        }
    }
    best
}

#[derive(Debug, Clone, Copy)]
struct EdgeQuery {
    separation: f32,
    /// Unit axis oriented from the first hull toward the second.
    axis: Vec3,
    dir_a: Vec3,
    dir_b: Vec3,
}

fn query_edges(a: &CollisionMesh<'_>, b: &CollisionMesh<'_>) -> Option<EdgeQuery> {
    let offset = b.centroid() - a.centroid();
    let mut best: Option<EdgeQuery> = None;

    for ia in 0..a.hull.edges().len() {
        let (a0, a1) = a.edge(ia);
        let dir_a = a1 - a0;
        for ib in 0..b.hull.edges().len() {
            let (b0, b1) = b.edge(ib);
            let dir_b = b1 - b0;

            let cross = dir_a.cross(dir_b);
            let len = cross.length();
            if len <= PARALLEL_EPSILON * dir_a.length() * dir_b.length() {
                continue;
            }
            let mut axis = cross / len;
            if axis.dot(offset) < 0.0 {
                axis = -axis;
            }

            let (_, max_a) = a.project(axis);
            let (min_b, _) = b.project(axis);
            let separation = min_b - max_a;
            if best.map_or(true, |q| separation > q.separation) {
                best = Some(EdgeQuery {
                    separation,
                    axis,
                    dir_a,
                    dir_b,
                });
            }
        }
    }
    best
}

/// Edge of `mesh` parallel to `dir` lying furthest along `axis`.
fn supporting_edge(mesh: &CollisionMesh<'_>, dir: Vec3, axis: Vec3) -> Option<(Vec3, Vec3)> {
    let dir = dir.normalize_or_zero();
    let mut best: Option<(f32, (Vec3, Vec3))> = None;
    for i in 0..mesh.hull.edges().len() {
        let (p, q) = mesh.edge(i);
        let edge_dir = (q - p).normalize_or_zero();
        if edge_dir.cross(dir).length_squared() > 1e-6 {
            continue;
        }
        let reach = axis.dot((p + q) * 0.5);
        if best.map_or(true, |(r, _)| reach > r) {
            best = Some((reach, (p, q)));
        }
    }
    best.map(|(_, edge)| edge)
}

fn edge_contact(a: &CollisionMesh<'_>, b: &CollisionMesh<'_>, query: &EdgeQuery) -> Option<Manifold> {
    let (a0, a1) = supporting_edge(a, query.dir_a, query.axis)?;
    let (b0, b1) = supporting_edge(b, query.dir_b, -query.axis)?;
    let (on_a, on_b) = closest_points_on_segments(a0, a1, b0, b1);

    let penetration = (-query.separation).max(0.0);
    let mut manifold = Manifold {
        points: [ContactPoint::default(); MAX_CONTACT_POINTS],
        num_points: 1,
        normal: query.axis,
        reference: ReferenceSide::First,
    };
    manifold.points[0] = ContactPoint::new((on_a + on_b) * 0.5, penetration * 0.5);
    Some(manifold)
}

fn face_contact(
    reference: &CollisionMesh<'_>,
    reference_face: usize,
    incident: &CollisionMesh<'_>,
    side: ReferenceSide,
    scratch: &mut ManifoldScratch,
) -> Option<Manifold> {
    let n = reference.normals[reference_face];

    let incident_face = incident
        .normals
        .iter()
        .enumerate()
        .min_by(|(_, x), (_, y)| x.dot(n).total_cmp(&y.dot(n)))
        .map(|(i, _)| i)?;

    reference.face_polygon(reference_face, &mut scratch.reference_polygon);
    incident.face_polygon(incident_face, &mut scratch.incident_polygon);
    polygon_side_planes(&scratch.reference_polygon, n, &mut scratch.planes);
    clip_polygon(
        &scratch.incident_polygon,
        &scratch.planes,
        &mut scratch.clipped,
        &mut scratch.clip_tmp,
    );

    let origin = *scratch.reference_polygon.first()?;
    scratch.candidates.clear();
    for p in &scratch.clipped {
        let s = n.dot(*p - origin);
        if s <= CONTACT_MARGIN {
            scratch
                .candidates
                .push(ContactPoint::new(*p - n * (s * 0.5), -s * 0.5));
        }
    }
    build_manifold(&scratch.candidates, n, side)
}

fn build_manifold(candidates: &[ContactPoint], normal: Vec3, reference: ReferenceSide) -> Option<Manifold> {
    if candidates.is_empty() {
        return None;
    }
    let mut manifold = Manifold {
        points: [ContactPoint::default(); MAX_CONTACT_POINTS],
        num_points: 0,
        normal,
        reference,
    };
    for index in reduce_points(candidates, normal).into_iter().flatten() {
        manifold.points[manifold.num_points] = candidates[index];
        manifold.num_points += 1;
    }
    Some(manifold)
}

/// Picks up to four representative points: the deepest, the one furthest
/// from it, the one spanning the largest triangle with those two, and the
/// one lying furthest outside that triangle.
fn reduce_points(points: &[ContactPoint], normal: Vec3) -> [Option<usize>; MAX_CONTACT_POINTS] {
    let mut chosen = [None; MAX_CONTACT_POINTS];
    if points.len() <= MAX_CONTACT_POINTS {
        for (slot, i) in chosen.iter_mut().zip(0..points.len()) {
            *slot = Some(i);
        }
        return chosen;
    }

    let argmax = |score: &dyn Fn(usize) -> f32, taken: &[Option<usize>]| -> Option<usize> {
        (0..points.len())
            .filter(|i| !taken.contains(&Some(*i)))
            .max_by(|&x, &y| score(x).total_cmp(&score(y)))
    };

    let p = |i: usize| points[i].position;

    chosen[0] = argmax(&|i| points[i].depth, &chosen[..]);
    let Some(i0) = chosen[0] else {
        return chosen;
    };
    chosen[1] = argmax(&|i| (p(i) - p(i0)).length_squared(), &chosen[..]);
    let Some(i1) = chosen[1] else {
        return chosen;
    };
    chosen[2] = argmax(&|i| (p(i1) - p(i0)).cross(p(i) - p(i0)).dot(normal).abs(), &chosen[..]);
    let Some(i2) = chosen[2] else {
        return chosen;
    };

    let winding = (p(i1) - p(i0)).cross(p(i2) - p(i0));
    let outside = |i: usize| {
        let q = p(i);
        [(i0, i1), (i1, i2), (i2, i0)]
            .iter()
            .map(|&(s, e)| (p(e) - p(s)).cross(q - p(s)).dot(winding))
            .fold(f32::INFINITY, f32::min)
    };
    chosen[3] = argmax(&|i| -outside(i), &chosen[..]);
    chosen
}

fn closest_points_on_segments(p1: Vec3, q1: Vec3, p2: Vec3, q2: Vec3) -> (Vec3, Vec3) {
    const EPS: f32 = 1e-9;
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.dot(d1);
    let e = d2.dot(d2);
    let f = d2.dot(r);

    if a <= EPS && e <= EPS {
        return (p1, p2);
    }

    let (s, t) = if a <= EPS {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(r);
        if e <= EPS {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let s = if denom > EPS {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let t = (b * s + f) / e;
            if t < 0.0 {
                ((-c / a).clamp(0.0, 1.0), 0.0)
            } else if t > 1.0 {
                (((b - c) / a).clamp(0.0, 1.0), 1.0)
            } else {
                (s, t)
            }
        }
    };

    (p1 + d1 * s, p2 + d2 * t)
}
