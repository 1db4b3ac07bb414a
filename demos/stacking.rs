use multiverse_physics::*;

fn main() -> Result<()> {
    let mut objects = ObjectManager::new();
    let ground = objects.add_object(ObjectDesc::new(
        CollisionPrimitive::Plane,
        RigidBodyMetadata::fixed(0.6, 0.4),
    ));
    let cube = objects.add_object(ObjectDesc::new(
        CollisionPrimitive::Hull(ConvexHull::cuboid(Vec3::splat(0.5))),
        RigidBodyMetadata::dynamic_cuboid(1.0, Vec3::splat(0.5), 0.6, 0.4),
    ));

    let config = PhysicsConfig::default().with_substeps(8);
    let mut engine = PhysicsEngine::new(config, objects)?;
    let w = engine.add_world()?;
    let world = engine.world_mut(w).expect("world was just added");
    world.add_body(BodyDesc::new(ground))?;

    let mut stack = Vec::new();
    for level in 0..5 {
        let position = Vec3::new(0.0, 0.0, 0.5 + level as f32);
        stack.push(world.add_body(BodyDesc::new(cube).with_position(position))?);
    }

    for _ in 0..120 {
        engine.step()?;
    }

    let world = engine.world(w).expect("world exists");
    println!("Simulated a stack of {} boxes for 2 seconds", stack.len());
    for id in stack {
        if let Some(body) = world.body(id) {
            println!("  {id}: {:?}", body.position());
        }
    }
    engine.profiler().report();
    Ok(())
}
