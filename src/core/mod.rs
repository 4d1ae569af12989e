//! Core types describing bodies, collision geometry, and the world snapshot.

pub mod capabilities;
pub mod mesh;
pub mod pulses;
pub mod rigidbody;
pub mod static_world;
pub mod types;

pub use capabilities::{Capabilities, CapabilityRef, Damageable, Grinder};
pub use mesh::{
    Aabb, CollisionLine, CollisionMesh, CollisionSphere, CollisionTriangle, PrimitiveKind,
    PrimitiveRef,
};
pub use pulses::RigidBodyPulses;
pub use rigidbody::{DestructionNotifier, ExternalForces, RigidBody};
pub use static_world::StaticWorld;
pub use types::{ContactMaterial, InertiaTensorExt, MixingMode, PhysicsMaterial, Pose};
