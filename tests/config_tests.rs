use vehicle_physics::*;

#[test]
fn missing_fields_take_defaults() {
    let config = PhysicsEngineConfig::from_json(
        r#"{ "resolve_collision_type": "penalty", "nsubsteps": 4, "bullet_line_substeps": 16 }"#,
    )
    .unwrap();
    assert_eq!(config.resolve_collision_type, ResolveCollisionType::Penalty);
    assert_eq!(config.substeps(PenetrationClass::Standard), 4);
    assert_eq!(config.substeps(PenetrationClass::BulletLine), 16);
    assert_eq!(config.dt, PhysicsEngineConfig::default().dt);
}

#[test]
fn serialized_config_loads_back() {
    let config = PhysicsEngineConfig {
        normal_vector_error_behavior: NormalVectorErrorBehavior::Zero,
        max_penetration: 0.1,
        ..Default::default()
    };
    let json = config.to_json().unwrap();
    assert!(json.contains("\"zero\""));
    assert_eq!(PhysicsEngineConfig::from_json(&json).unwrap(), config);
}

#[test]
fn unknown_names_fail_loudly() {
    let err = PhysicsEngineConfig::from_json(r#"{ "resolve_collision_type": "impulses" }"#)
        .unwrap_err();
    assert!(matches!(&err, ConfigError::Parse(msg) if msg.contains("impulses")));

    let err = PhysicsEngineConfig::from_json(r#"{ "substeps": 3 }"#).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn cross_field_constraints_are_checked() {
    let err = PhysicsEngineConfig::from_json(
        r#"{ "grind_threshold": 1.0, "grind_release_threshold": 0.5 }"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::InvalidValue { field: "grind_release_threshold", .. }
    ));

    let err = PhysicsEngine::new(PhysicsEngineConfig {
        dt: 0.0,
        ..Default::default()
    })
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { field: "dt", .. }));
}

#[test]
fn config_errors_are_not_fatal() {
    let err: PhysicsError = ConfigError::UnknownPenetrationClass("fast".into()).into();
    assert!(!err.is_fatal());
    assert!(err.to_string().contains("fast"));
}
