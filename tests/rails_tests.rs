use vehicle_physics::core::Grinder;
use vehicle_physics::*;

fn board() -> RigidBody {
    RigidBody::new(
        "board",
        5.0,
        Mat3::for_solid_box(Vec3::new(0.2, 0.05, 0.8), 5.0),
        Pose::from_position(DVec3::new(0.0, 1.0, 0.0)),
    )
    .with_velocity(Vec3::new(3.0, 0.0, 0.0), Vec3::ZERO)
    .with_grinder(Grinder::new(Vec3::new(0.0, -0.1, 0.0)))
}

fn rail_line() -> CollisionLine {
    CollisionLine::new(
        DVec3::new(-20.0, 0.85, 0.0),
        DVec3::new(20.0, 0.85, 0.0),
        PhysicsMaterial::rail(),
    )
}

fn engine(burn_in: f32) -> PhysicsEngine {
    PhysicsEngine::new(PhysicsEngineConfig {
        burn_in_duration: burn_in,
        ..Default::default()
    })
    .unwrap()
}

fn step(engine: &mut PhysicsEngine) {
    let dt = engine.config().dt;
    let time = engine.frame() as f64 * f64::from(dt);
    engine.advance_time(dt, time, None).unwrap();
}

#[test]
fn grinds_start_only_after_burn_in() {
    let mut engine = engine(0.2);
    engine
        .add_static_mesh(CollisionMesh::new("rail").with_line(rail_line()))
        .unwrap();
    let id = engine.add_body(board());

    engine.burn_in(0.2).unwrap();
    assert!(!engine.rails().is_grinding(id));

    // Reset the board onto the rail; burn-in let it fall.
    engine
        .respawn(id, Pose::from_position(DVec3::new(0.0, 1.0, 0.0)))
        .unwrap();
    step(&mut engine);
    assert!(engine.rails().is_grinding(id));
}

#[test]
fn grinding_board_stays_on_static_rail() {
    let mut engine = engine(0.0);
    engine
        .add_static_mesh(CollisionMesh::new("rail").with_line(rail_line()))
        .unwrap();
    let id = engine.add_body(board());

    for _ in 0..30 {
        step(&mut engine);
    }
    assert!(engine.rails().is_grinding(id));
    let body = engine.body(id).unwrap();
    let grind_point = body.pose().transform_point(Vec3::new(0.0, -0.1, 0.0));
    assert!((grind_point.y - 0.85).abs() < 0.1, "left the rail: {grind_point:?}");
    assert!(body.pose().position.x > 0.5, "board stopped sliding along the rail");
    // Static rails need no group link.
    assert!(engine.rails().links().is_empty());
}

#[test]
fn destroying_rail_body_ends_grind_before_next_pass() {
    let mut engine = engine(0.0);
    let rail = engine.add_body(
        RigidBody::fixed("rail", Pose::default())
            .with_mesh(CollisionMesh::new("rail").with_line(rail_line())),
    );
    let id = engine.add_body(board());

    step(&mut engine);
    assert!(engine.rails().is_grinding(id));
    assert_eq!(engine.rails().links(), vec![(id, rail)]);

    assert!(engine.remove_body(rail).is_some());
    step(&mut engine);
    assert!(!engine.rails().is_grinding(id));
    assert!(engine.rails().links().is_empty());
}

#[test]
fn moving_rail_is_only_pushed_once_groups_merge() {
    let mut engine = engine(0.0);
    engine.set_gravity(Vec3::ZERO);
    let id = engine.add_body(
        RigidBody::new(
            "board",
            5.0,
            Mat3::for_solid_box(Vec3::new(0.2, 0.05, 0.8), 5.0),
            Pose::from_position(DVec3::new(0.0, 1.0, 0.0)),
        )
        .with_grinder(Grinder::new(Vec3::new(0.0, -0.1, 0.0))),
    );
    let rail = engine.add_body(
        RigidBody::new(
            "rail",
            20.0,
            Mat3::for_solid_box(Vec3::new(2.0, 0.05, 0.05), 20.0),
            Pose::default(),
        )
        .with_mesh(CollisionMesh::new("rail").with_line(CollisionLine::new(
            DVec3::new(-2.0, 0.8, 0.0),
            DVec3::new(2.0, 0.8, 0.0),
            PhysicsMaterial::rail(),
        ))),
    );

    // Board and rail start apart; the grind links them for the next frame.
    step(&mut engine);
    assert_eq!(engine.profile().group_count, 2);
    assert!(engine.rails().is_grinding(id));
    assert_eq!(engine.rails().grind(id).unwrap().rail_body, Some(rail));
    assert_eq!(engine.body(rail).unwrap().pulses.v_com, Vec3::ZERO);

    step(&mut engine);
    assert_eq!(engine.profile().group_count, 1);
    assert_eq!(engine.rails().links(), vec![(id, rail)]);
}

#[test]
fn destroying_grinder_ends_grind() {
    let mut engine = engine(0.0);
    engine
        .add_static_mesh(CollisionMesh::new("rail").with_line(rail_line()))
        .unwrap();
    let id = engine.add_body(board());
    step(&mut engine);
    assert_eq!(engine.rails().len(), 1);

    engine.remove_body(id);
    step(&mut engine);
    assert!(engine.rails().is_empty());
}
