//! Narrowphase dispatch: candidate pair in, at most one contact manifold out.

use glam::{Quat, Vec3};

use super::contact::{Contact, ContactBuffer, ContactPoint};
use super::events::{CandidateCollision, EventCollector};
use super::sat::{
    CollisionMesh, HullScratch, Manifold, ManifoldGenerator, ManifoldScratch, ReferenceSide,
    WorldPlane,
};
use crate::config::{OverflowPolicy, CONTACT_MARGIN};
use crate::core::object::{CollisionPrimitive, ObjectManager};
use crate::core::soa::{BodiesSoA, BodyRef};
use crate::error::{PhysicsError, Result};
use crate::utils::allocator::EntityId;

/// Per-task scratch space; reused across the pairs one task processes.
#[derive(Debug, Default)]
pub struct NarrowphaseScratch {
    first: HullScratch,
    second: HullScratch,
    manifold: ManifoldScratch,
}

#[derive(Debug, Clone, Copy)]
struct Pose {
    id: EntityId,
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
}

impl From<BodyRef<'_>> for Pose {
    fn from(body: BodyRef<'_>) -> Self {
        Self {
            id: body.id(),
            position: body.position(),
            rotation: body.rotation(),
            scale: body.scale(),
        }
    }
}

/// Borrowed inputs for one world's narrowphase.
pub struct Narrowphase<'a> {
    pub objects: &'a ObjectManager,
    pub generator: &'a dyn ManifoldGenerator,
    pub overflow: OverflowPolicy,
}

impl<'a> Narrowphase<'a> {
    pub fn new(
        objects: &'a ObjectManager,
        generator: &'a dyn ManifoldGenerator,
        overflow: OverflowPolicy,
    ) -> Self {
        Self {
            objects,
            generator,
            overflow,
        }
    }

    /// Tests every candidate pair and appends the resulting manifolds to
    /// `buffer`. Returns the number of manifolds dropped for lack of space.
    /// Only stored manifolds produce a collision event.
    pub fn run(
        &self,
        bodies: &BodiesSoA,
        candidates: &[CandidateCollision],
        buffer: &ContactBuffer,
        events: &EventCollector,
    ) -> Result<usize> {
        let dropped_before = buffer.dropped();

        let process = |scratch: &mut NarrowphaseScratch, pair: &CandidateCollision| -> Result<()> {
            let Some(contact) = self.collide(bodies, pair, scratch)? else {
                return Ok(());
            };
            let (reference, alternate) = (contact.reference, contact.alternate);
            match buffer.push(contact) {
                Ok(_) => {
                    events.record(reference, alternate);
                    Ok(())
                }
                Err(err) => match self.overflow {
                    OverflowPolicy::Drop => {
                        buffer.record_dropped();
                        Ok(())
                    }
                    OverflowPolicy::Fail => Err(err),
                },
            }
        };

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            candidates
                .par_iter()
                .try_for_each_init(NarrowphaseScratch::default, process)?;
        }

        #[cfg(not(feature = "parallel"))]
        {
            let mut scratch = NarrowphaseScratch::default();
            for pair in candidates {
                process(&mut scratch, pair)?;
            }
        }

        let dropped = buffer.dropped() - dropped_before;
        if dropped > 0 {
            log::warn!(
                "contact buffer full ({} slots): dropped {} manifold(s)",
                buffer.capacity(),
                dropped
            );
        }
        Ok(dropped)
    }

    /// Runs the shape test for one pair. The pair is ordered by primitive
    /// flag first, so each unordered shape combination has one routine.
    pub fn collide(
        &self,
        bodies: &BodiesSoA,
        pair: &CandidateCollision,
        scratch: &mut NarrowphaseScratch,
    ) -> Result<Option<Contact>> {
        let body_a = bodies.get(pair.a).ok_or(PhysicsError::InvalidEntity(pair.a))?;
        let body_b = bodies.get(pair.b).ok_or(PhysicsError::InvalidEntity(pair.b))?;
        let record_a = self.objects.get(body_a.object())?;
        let record_b = self.objects.get(body_b.object())?;

        let (mut first, mut second) = (Pose::from(body_a), Pose::from(body_b));
        let (mut prim_first, mut prim_second) = (&record_a.primitive, &record_b.primitive);
        if prim_first.kind().flag() > prim_second.kind().flag() {
            std::mem::swap(&mut first, &mut second);
            std::mem::swap(&mut prim_first, &mut prim_second);
        }

        let contact = self.dispatch(&first, prim_first, &second, prim_second, scratch)?;
        Ok(contact.filter(|c| !c.is_empty()))
    }

    /// Shape test for a pair already ordered by primitive flag (sphere,
    /// hull, plane). Pairs in the opposite order are rejected.
    fn dispatch(
        &self,
        first: &Pose,
        prim_first: &CollisionPrimitive,
        second: &Pose,
        prim_second: &CollisionPrimitive,
        scratch: &mut NarrowphaseScratch,
    ) -> Result<Option<Contact>> {
        use CollisionPrimitive::{Hull, Plane, Sphere};

        let contact = match (prim_first, prim_second) {
            (Sphere { radius: ra }, Sphere { radius: rb }) => sphere_sphere(first, *ra, second, *rb),
            (Sphere { radius }, Plane) => sphere_plane(first, *radius, second),
            (Hull(hull_a), Hull(hull_b)) => {
                let a = CollisionMesh::transform(
                    hull_a,
                    first.position,
                    first.rotation,
                    first.scale,
                    &mut scratch.first,
                );
                let b = CollisionMesh::transform(
                    hull_b,
                    second.position,
                    second.rotation,
                    second.scale,
                    &mut scratch.second,
                );
                self.generator
                    .hull_hull(&a, &b, &mut scratch.manifold)
                    .map(|m| manifold_contact(&m, first.id, second.id))
            }
            (Hull(hull), Plane) => {
                let mesh = CollisionMesh::transform(
                    hull,
                    first.position,
                    first.rotation,
                    first.scale,
                    &mut scratch.first,
                );
                self.generator
                    .hull_plane(&mesh, &plane_of(second), &mut scratch.manifold)
                    .map(|m| manifold_contact(&m, first.id, second.id))
            }
            (Plane, Plane) => None,
            (Sphere { .. }, Hull(_))
            | (Hull(_), Sphere { .. })
            | (Plane, Sphere { .. })
            | (Plane, Hull(_)) => {
                return Err(PhysicsError::UnsupportedShapePair {
                    a: prim_first.kind(),
                    b: prim_second.kind(),
                })
            }
        };
        Ok(contact)
    }
}

fn plane_of(body: &Pose) -> WorldPlane {
    WorldPlane {
        point: body.position,
        normal: (body.rotation * Vec3::Z).normalize(),
    }
}

fn sphere_sphere(a: &Pose, ra: f32, b: &Pose, rb: f32) -> Option<Contact> {
    let offset = b.position - a.position;
    let distance = offset.length();
    if distance <= 0.0 || distance > ra + rb + CONTACT_MARGIN {
        return None;
    }

    let n = offset / distance;
    let on_a = a.position + n * ra;
    let on_b = b.position - n * rb;

    let mut contact = Contact::new(a.id, b.id, n);
    contact.push_point(ContactPoint::new(
        (on_a + on_b) * 0.5,
        (ra + rb - distance) * 0.5,
    ));
    Some(contact)
}

/// The sphere is the reference; the normal points down into the plane.
fn sphere_plane(sphere: &Pose, radius: f32, plane: &Pose) -> Option<Contact> {
    let WorldPlane { point, normal } = plane_of(plane);
    let height = normal.dot(sphere.position - point);
    if height > radius + CONTACT_MARGIN {
        return None;
    }

    let mut contact = Contact::new(sphere.id, plane.id, -normal);
    contact.push_point(ContactPoint::new(
        sphere.position - normal * ((radius + height) * 0.5),
        (radius - height) * 0.5,
    ));
    Some(contact)
}

fn manifold_contact(manifold: &Manifold, first: EntityId, second: EntityId) -> Contact {
    let (reference, alternate) = match manifold.reference {
        ReferenceSide::First => (first, second),
        ReferenceSide::Second => (second, first),
    };
    let mut contact = Contact::new(reference, alternate, manifold.normal);
    for point in manifold.points() {
        contact.push_point(*point);
    }
    contact
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::events::CollisionEvent;
    use crate::collision::sat::SatManifoldGenerator;
    use crate::core::hull::ConvexHull;
    use crate::core::object::{ObjectDesc, ObjectId, PrimitiveKind, RigidBodyMetadata};
    use crate::core::soa::BodyDesc;
    use approx::assert_abs_diff_eq;

    struct Scene {
        objects: ObjectManager,
        bodies: BodiesSoA,
        sphere: ObjectId,
        plane: ObjectId,
        cube: ObjectId,
    }

    impl Scene {
        fn new() -> Self {
            let mut objects = ObjectManager::new();
            let sphere = objects.add_object(ObjectDesc::new(
                CollisionPrimitive::Sphere { radius: 0.5 },
                RigidBodyMetadata::dynamic_sphere(1.0, 0.5, 0.5, 0.3),
            ));
            let plane = objects.add_object(ObjectDesc::new(
                CollisionPrimitive::Plane,
                RigidBodyMetadata::fixed(0.5, 0.3),
            ));
            let cube = objects.add_object(ObjectDesc::new(
                CollisionPrimitive::Hull(ConvexHull::cuboid(Vec3::splat(0.5))),
                RigidBodyMetadata::dynamic_cuboid(1.0, Vec3::splat(0.5), 0.5, 0.3),
            ));
            Self {
                objects,
                bodies: BodiesSoA::new(64),
                sphere,
                plane,
                cube,
            }
        }

        fn add(&mut self, object: ObjectId, position: Vec3) -> EntityId {
            self.bodies
                .insert(BodyDesc::new(object).with_position(position))
                .expect("scene has room")
        }

        fn collide(&self, a: EntityId, b: EntityId) -> Result<Option<Contact>> {
            let generator = SatManifoldGenerator;
            let narrowphase = Narrowphase::new(&self.objects, &generator, OverflowPolicy::Drop);
            narrowphase.collide(
                &self.bodies,
                &CandidateCollision { a, b },
                &mut NarrowphaseScratch::default(),
            )
        }
    }

    #[test]
    fn overlapping_spheres_report_half_penetration() {
        for distance in [0.05_f32, 0.3, 0.7, 0.99] {
            let mut scene = Scene::new();
            let a = scene.add(scene.sphere, Vec3::ZERO);
            let b = scene.add(scene.sphere, Vec3::new(0.0, distance, 0.0));

            let contact = scene
                .collide(a, b)
                .expect("sphere pair is supported")
                .expect("spheres overlap");
            assert_eq!(contact.num_points, 1);
            assert_eq!((contact.reference, contact.alternate), (a, b));
            assert_abs_diff_eq!(contact.normal.length(), 1.0, epsilon = 1e-6);
            assert_abs_diff_eq!(contact.normal.y, 1.0, epsilon = 1e-6);
            assert_abs_diff_eq!(contact.points[0].depth, (1.0 - distance) / 2.0, epsilon = 1e-6);
            assert_abs_diff_eq!(contact.points[0].position.y, distance / 2.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn touching_spheres_keep_a_zero_depth_contact() {
        let mut scene = Scene::new();
        let a = scene.add(scene.sphere, Vec3::ZERO);
        let touching = scene.add(scene.sphere, Vec3::new(1.0, 0.0, 0.0));
        let apart = scene.add(scene.sphere, Vec3::new(0.0, 1.01, 0.0));
        let coincident = scene.add(scene.sphere, Vec3::ZERO);

        let contact = scene
            .collide(a, touching)
            .expect("supported")
            .expect("touching spheres are in contact");
        assert_abs_diff_eq!(contact.points[0].depth, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(contact.points[0].position.x, 0.5, epsilon = 1e-6);

        assert!(scene.collide(a, apart).expect("supported").is_none());
        assert!(scene.collide(a, coincident).expect("supported").is_none());
    }

    #[test]
    fn sphere_below_plane_surface_points_into_plane() {
        let mut scene = Scene::new();
        let ground = scene.add(scene.plane, Vec3::ZERO);
        let ball = scene.add(scene.sphere, Vec3::new(1.0, 2.0, 0.4));

        // Candidate order must not matter: the sphere is always reference.
        let contact = scene
            .collide(ground, ball)
            .expect("supported")
            .expect("sphere dips 0.1 below the surface");
        assert_eq!((contact.reference, contact.alternate), (ball, ground));
        assert_abs_diff_eq!(contact.normal.z, -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(contact.points[0].depth, 0.05, epsilon = 1e-6);
        assert_abs_diff_eq!(contact.points[0].position.z, -0.05, epsilon = 1e-6);
        assert_abs_diff_eq!(contact.points[0].position.x, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn tilted_plane_uses_its_rotated_z_axis() {
        let mut scene = Scene::new();
        let ground = scene
            .bodies
            .insert(
                BodyDesc::new(scene.plane)
                    .with_rotation(Quat::from_rotation_x(std::f32::consts::FRAC_PI_2)),
            )
            .expect("insert");
        // Plane normal is now -Y; sphere centred 0.3 in front of it.
        let ball = scene.add(scene.sphere, Vec3::new(0.0, -0.3, 5.0));
        let contact = scene
            .collide(ball, ground)
            .expect("supported")
            .expect("overlap");
        assert_abs_diff_eq!(contact.normal.y, 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(contact.points[0].depth, 0.1, epsilon = 1e-5);
    }

    #[test]
    fn resting_sphere_touches_plane() {
        let mut scene = Scene::new();
        let ground = scene.add(scene.plane, Vec3::ZERO);
        let ball = scene.add(scene.sphere, Vec3::new(0.0, 0.0, 0.5));
        let hovering = scene.add(scene.sphere, Vec3::new(3.0, 0.0, 0.51));

        let contact = scene
            .collide(ball, ground)
            .expect("supported")
            .expect("resting sphere touches the plane");
        assert_abs_diff_eq!(contact.points[0].depth, 0.0, epsilon = 1e-6);
        assert!(scene.collide(hovering, ground).expect("supported").is_none());
    }

    #[test]
    fn sphere_against_hull_is_an_error() {
        let mut scene = Scene::new();
        let ball = scene.add(scene.sphere, Vec3::ZERO);
        let cube = scene.add(scene.cube, Vec3::new(0.0, 0.0, 0.8));
        assert_eq!(
            scene.collide(cube, ball),
            Err(PhysicsError::UnsupportedShapePair {
                a: PrimitiveKind::Sphere,
                b: PrimitiveKind::Hull
            })
        );
    }

    #[test]
    fn pairs_out_of_flag_order_are_rejected() {
        let mut scene = Scene::new();
        let ground = scene.add(scene.plane, Vec3::ZERO);
        let ball = scene.add(scene.sphere, Vec3::new(0.0, 0.0, 0.4));
        let generator = SatManifoldGenerator;
        let narrowphase = Narrowphase::new(&scene.objects, &generator, OverflowPolicy::Drop);
        let plane = scene.objects.get(scene.plane).expect("plane").primitive.clone();
        let sphere = scene.objects.get(scene.sphere).expect("sphere").primitive.clone();
        let pose = |id| Pose::from(scene.bodies.get(id).expect("live"));

        assert_eq!(
            narrowphase.dispatch(
                &pose(ground),
                &plane,
                &pose(ball),
                &sphere,
                &mut NarrowphaseScratch::default()
            ),
            Err(PhysicsError::UnsupportedShapePair {
                a: PrimitiveKind::Plane,
                b: PrimitiveKind::Sphere
            })
        );
    }

    #[test]
    fn plane_pairs_never_collide() {
        let mut scene = Scene::new();
        let a = scene.add(scene.plane, Vec3::ZERO);
        let b = scene.add(scene.plane, Vec3::new(0.0, 0.0, -0.1));
        assert!(scene.collide(a, b).expect("no-op").is_none());
    }

    #[test]
    fn cube_on_plane_makes_plane_the_reference() {
        let mut scene = Scene::new();
        let ground = scene.add(scene.plane, Vec3::ZERO);
        let cube = scene.add(scene.cube, Vec3::new(0.0, 0.0, 0.45));
        let contact = scene
            .collide(cube, ground)
            .expect("supported")
            .expect("cube sinks 0.05");
        assert_eq!((contact.reference, contact.alternate), (ground, cube));
        assert_eq!(contact.num_points, 4);
        assert_abs_diff_eq!(contact.normal.z, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn run_fills_buffer_records_events_and_drops_overflow() {
        let mut scene = Scene::new();
        let ground = scene.add(scene.plane, Vec3::ZERO);
        let balls: Vec<EntityId> = (0..3)
            .map(|i| scene.add(scene.sphere, Vec3::new(i as f32 * 3.0, 0.0, 0.45)))
            .collect();
        let candidates: Vec<CandidateCollision> = balls
            .iter()
            .map(|&ball| CandidateCollision::new(ground, ball))
            .collect();

        let generator = SatManifoldGenerator;
        let mut buffer = ContactBuffer::new(2);
        let mut events = EventCollector::default();
        let dropped = Narrowphase::new(&scene.objects, &generator, OverflowPolicy::Drop)
            .run(&scene.bodies, &candidates, &buffer, &events)
            .expect("drop policy never fails");

        assert_eq!(dropped, 1);
        assert_eq!(buffer.dropped(), 1);
        assert_eq!(buffer.contacts().len(), 2);
        // The dropped manifold reports no event.
        let stored: Vec<CollisionEvent> = buffer
            .contacts()
            .iter()
            .map(|c| CollisionEvent::new(c.reference, c.alternate))
            .collect();
        let mut reported = events.drain_unique();
        reported.sort_unstable();
        let mut expected = stored;
        expected.sort_unstable();
        assert_eq!(reported, expected);

        buffer.clear();
        let result = Narrowphase::new(&scene.objects, &generator, OverflowPolicy::Fail).run(
            &scene.bodies,
            &candidates,
            &buffer,
            &events,
        );
        assert!(matches!(result, Err(PhysicsError::CapacityExceeded { .. })));
    }
}
