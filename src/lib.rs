//! Vehicle Physics – rigid-body vehicle simulation for Rust.
//!
//! This crate simulates rigid bodies against static collision geometry and
//! each other: a BVH-backed narrow phase produces contacts that a
//! sequential-pulse solver resolves alongside tire, suspension and rail
//! constraints. Bodies are grouped per frame and stepped with a substep
//! count chosen by their penetration class.

pub mod collision;
pub mod config;
pub mod core;
pub mod debug;
pub mod dynamics;
pub mod error;
pub mod physics_loop;
pub mod utils;
pub mod world;

pub use glam::{DVec3, Mat3, Quat, Vec2, Vec3};

pub use collision::{
    observer::{CollisionEvent, CollisionObserver, CollisionResponse, DamageEvent},
    queries::{Raycast, RaycastHit, RaycastQuery},
    rails::{GrindInfo, PermanentContacts, RailContacts},
};
pub use config::{
    NormalVectorErrorBehavior, PenetrationClass, PhysicsEngineConfig, ResolveCollisionType,
};
pub use core::{
    mesh::{CollisionLine, CollisionMesh, CollisionSphere, CollisionTriangle},
    rigidbody::RigidBody,
    static_world::StaticWorld,
    types::{InertiaTensorExt, PhysicsMaterial, Pose},
};
pub use debug::{Beacon, DebugContext};
pub use dynamics::{
    forces::{ControlInput, ExternalForceProvider, GravityProvider, WindProvider},
    tire::Tire,
    vehicle::{Vehicle, VehicleControls},
};
pub use error::{ConfigError, FatalInvariantViolation, GeometryError, PhysicsError, PhysicsResult};
pub use physics_loop::PhysicsLoop;
pub use utils::allocator::{Arena, BodyId};
pub use world::PhysicsEngine;
