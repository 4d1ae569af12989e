//! Collision detection modules: spatial index, narrow phase, contact constraints, rails, queries.

pub mod bvh;
pub mod contact;
pub mod detect;
pub mod narrowphase;
pub mod observer;
pub mod queries;
pub mod rails;
pub mod static_geometry;

pub use bvh::Bvh;
pub use contact::{ContactInfo, ContactPoint, ContactSet, Impact};
pub use detect::{Candidate, Detector};
pub use narrowphase::IntersectionInfo;
pub use observer::{CollisionEvent, CollisionObserver, CollisionResponse, DamageEvent, ObserverList};
pub use queries::{Raycast, RaycastHit, RaycastQuery};
pub use rails::{GrindInfo, PermanentContacts, RailContacts};
pub use static_geometry::{Primitive, StaticGeometry};
