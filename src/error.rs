//! Error kinds raised by the engine.
//!
//! Configuration problems are reported at load time through [`ConfigError`].
//! Recoverable geometric degeneracies surface as [`GeometryError`] only when
//! the caller selected [`NormalVectorErrorBehavior::Throw`]. Broken runtime
//! invariants are [`FatalInvariantViolation`]s and stop the run loop.
//!
//! [`NormalVectorErrorBehavior::Throw`]: crate::config::NormalVectorErrorBehavior::Throw

use glam::Vec3;
use thiserror::Error;

use crate::utils::allocator::BodyId;

/// Errors detected while loading or validating a [`PhysicsEngineConfig`](crate::config::PhysicsEngineConfig).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown resolve collision type \"{0}\" (expected \"penalty\" or \"sequential_pulses\")")]
    UnknownResolveCollisionType(String),

    #[error("unknown penetration class \"{0}\" (expected \"standard\" or \"bullet_line\")")]
    UnknownPenetrationClass(String),

    #[error("unknown normal vector error behavior \"{0}\" (expected \"throw\", \"warn\", \"skip\" or \"zero\")")]
    UnknownNormalVectorErrorBehavior(String),

    #[error("unknown gravity correction \"{0}\" (expected \"none\", \"gimbal\" or \"move\")")]
    UnknownGravityCorrection(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("bullet line substeps ({bullet_line}) must be a strict multiple of standard substeps ({standard})")]
    SubstepComposition { standard: usize, bullet_line: usize },

    #[error("could not parse configuration: {0}")]
    Parse(String),
}

/// Degenerate geometry reported under the `Throw` normal-vector policy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("degenerate normal vector in {context}")]
    DegenerateNormal { context: &'static str },

    #[error("degenerate triangle (area {area:e})")]
    DegenerateTriangle { area: f64 },
}

/// Runtime invariant failures. Continuing after one of these would corrupt
/// simulation state, so the run loop terminates.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FatalInvariantViolation {
    #[error("non-finite velocity on body {body:?}: v = {v:?}, w = {w:?}")]
    NonFiniteVelocity { body: BodyId, v: Vec3, w: Vec3 },

    #[error("impulse too large: |J| = {magnitude}")]
    ImpulseTooLarge { magnitude: f32 },

    #[error("constraint lambda out of range: {lambda}")]
    LambdaOutOfRange { lambda: f32 },

    #[error("group substep count {nsubsteps} does not divide the global substep count {max_substeps}")]
    GroupComposition { nsubsteps: usize, max_substeps: usize },

    #[error("body {body:?} is not part of the current collision group")]
    BodyNotInGroup { body: BodyId },

    #[error("stale body handle {body:?}")]
    StaleHandle { body: BodyId },

    #[error("physics thread panicked: {message}")]
    ThreadPanicked { message: String },
}

/// Umbrella error returned by engine operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Invariant(#[from] FatalInvariantViolation),
}

impl PhysicsError {
    /// Whether the error must terminate the simulation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PhysicsError::Invariant(_))
    }
}

pub type PhysicsResult<T> = Result<T, PhysicsError>;
