use multiverse_physics::*;

fn main() -> Result<()> {
    let mut objects = ObjectManager::new();
    let ground = objects.add_object(ObjectDesc::new(
        CollisionPrimitive::Plane,
        RigidBodyMetadata::fixed(0.5, 0.3),
    ));
    let ball = objects.add_object(ObjectDesc::new(
        CollisionPrimitive::Sphere { radius: 0.5 },
        RigidBodyMetadata::dynamic_sphere(1.0, 0.5, 0.5, 0.3),
    ));

    let mut engine = PhysicsEngine::new(PhysicsConfig::default(), objects)?;
    let w = engine.add_world()?;
    let world = engine.world_mut(w).expect("world was just added");
    world.add_body(BodyDesc::new(ground))?;
    let body_id = world.add_body(BodyDesc::new(ball).with_position(Vec3::new(0.0, 0.0, 3.0)))?;

    for frame in 0..120 {
        engine.step()?;
        let world = engine.world(w).expect("world exists");
        if let Some(body) = world.body(body_id) {
            if frame % 10 == 0 {
                println!(
                    "frame {frame:3}: z = {:.3}, vz = {:+.3}",
                    body.position().z,
                    body.velocity().linear.z
                );
            }
        }
        for event in world.events() {
            if frame % 10 == 0 {
                println!("  contact between {} and {}", event.a, event.b);
            }
        }
    }
    Ok(())
}
