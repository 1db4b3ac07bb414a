use multiverse_physics::*;

const WORLDS: usize = 64;

fn main() -> Result<()> {
    let mut objects = ObjectManager::new();
    let ground = objects.add_object(ObjectDesc::new(
        CollisionPrimitive::Plane,
        RigidBodyMetadata::fixed(0.5, 0.3),
    ));
    let ball = objects.add_object(ObjectDesc::new(
        CollisionPrimitive::Sphere { radius: 0.25 },
        RigidBodyMetadata::dynamic_sphere(0.5, 0.25, 0.5, 0.3),
    ));

    let mut engine = PhysicsEngine::new(PhysicsConfig::default(), objects)?;
    let mut probes = Vec::with_capacity(WORLDS);
    for i in 0..WORLDS {
        let w = engine.add_world()?;
        let world = engine.world_mut(w).expect("world was just added");
        world.add_body(BodyDesc::new(ground))?;
        // Each world launches its ball at a different angle.
        let angle = i as f32 / WORLDS as f32 * std::f32::consts::FRAC_PI_2;
        let velocity = Velocity::linear(Vec3::new(angle.cos(), 0.0, angle.sin()) * 6.0);
        probes.push(world.add_body(
            BodyDesc::new(ball)
                .with_position(Vec3::new(0.0, 0.0, 0.25))
                .with_velocity(velocity),
        )?);
    }

    for _ in 0..180 {
        engine.step()?;
    }

    let farthest = engine
        .worlds()
        .iter()
        .zip(&probes)
        .filter_map(|(world, &id)| world.body(id).map(|b| b.position().x))
        .fold(f32::NEG_INFINITY, f32::max);
    println!("{WORLDS} worlds stepped 3 seconds; farthest ball at x = {farthest:.2}");
    engine.profiler().report();
    Ok(())
}
