//! Engine configuration surface and its defaults.
//!
//! Every string-valued option is parsed strictly: an unknown value is a
//! [`ConfigError`], never a silent fallback to a default.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Fixed simulation timestep (in seconds).
pub const DEFAULT_TIME_STEP: f32 = 1.0 / 60.0;

/// Substeps per frame for groups of penetration class `standard`.
pub const DEFAULT_SUBSTEPS: usize = 8;

/// Substeps per frame for groups of penetration class `bullet_line`.
pub const DEFAULT_BULLET_LINE_SUBSTEPS: usize = 32;

/// Passes over all active contacts per substep.
pub const DEFAULT_SOLVER_ITERATIONS: usize = 5;

/// Largest penetration depth corrected within one substep (in meters).
pub const DEFAULT_MAX_PENETRATION: f32 = 0.2;

/// Duration of the settling phase run before the first frame (in seconds).
pub const DEFAULT_BURN_IN_DURATION: f32 = 0.5;

/// Penalty stiffness, scaled by the effective mass of the contact (1/s²).
pub const DEFAULT_PENALTY_STIFFNESS: f32 = 4000.0;

/// Penalty damping, scaled by the effective mass of the contact (1/s).
pub const DEFAULT_PENALTY_DAMPING: f32 = 40.0;

/// Baumgarte factor of the plane inequality constraint.
pub const DEFAULT_CONTACT_BETA: f32 = 0.05;

/// Overlap tolerated without positional correction (in meters).
pub const DEFAULT_CONTACT_SLOP: f32 = 0.005;

/// Upper bound of an accumulated contact impulse (N·s).
pub const DEFAULT_LAMBDA_MAX: f32 = 1e5;

/// A single impulse larger than this is treated as a broken simulation (N·s).
pub const DEFAULT_MAX_IMPULSE: f32 = 1e7;

/// Wall-clock backlog above which the run loop drops simulated time (in seconds).
pub const DEFAULT_MAX_RESIDUAL_TIME: f32 = 0.5;

/// How the contact model turns detected overlap into a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum ResolveCollisionType {
    Penalty,
    #[default]
    SequentialPulses,
}

/// Penetration class of a collision group. Ordered so that the stricter
/// class compares greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum PenetrationClass {
    #[default]
    Standard,
    BulletLine,
}

/// What to do when a normal vector cannot be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum NormalVectorErrorBehavior {
    /// Return a [`GeometryError`](crate::error::GeometryError).
    Throw,
    /// Log a warning and skip the primitive.
    #[default]
    Warn,
    /// Skip the primitive silently.
    Skip,
    /// Use a zero normal, which contributes no impulse.
    Zero,
}

/// Implements the string conversions shared by all config enums.
macro_rules! config_enum {
    ($name:ident, $err:ident, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::error::ConfigError::$err(other.to_string())),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::error::ConfigError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for &'static str {
            fn from(value: $name) -> Self {
                value.as_str()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use config_enum;

config_enum!(ResolveCollisionType, UnknownResolveCollisionType, {
    Penalty => "penalty",
    SequentialPulses => "sequential_pulses",
});

config_enum!(PenetrationClass, UnknownPenetrationClass, {
    Standard => "standard",
    BulletLine => "bullet_line",
});

config_enum!(NormalVectorErrorBehavior, UnknownNormalVectorErrorBehavior, {
    Throw => "throw",
    Warn => "warn",
    Skip => "skip",
    Zero => "zero",
});

/// Tunables of the physics engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhysicsEngineConfig {
    pub dt: f32,
    pub nsubsteps: usize,
    pub bullet_line_substeps: usize,
    pub solver_iterations: usize,
    pub resolve_collision_type: ResolveCollisionType,
    pub max_penetration: f32,
    pub burn_in_duration: f32,
    pub normal_vector_error_behavior: NormalVectorErrorBehavior,
    pub penalty_stiffness: f32,
    pub penalty_damping: f32,
    pub contact_beta: f32,
    pub contact_slop: f32,
    pub lambda_max: f32,
    pub max_impulse: f32,
    /// Default static friction coefficient of tire contacts.
    pub stiction_coefficient: f32,
    /// Default sliding friction coefficient of tire contacts.
    pub friction_coefficient: f32,
    /// Velocity below which slip ratios are regularized (m/s).
    pub tire_min_velocity: f32,
    pub grind_threshold: f32,
    pub grind_release_threshold: f32,
    pub grind_beta: f32,
    pub max_residual_time: f32,
    /// When false the run loop steps as fast as it can.
    pub fps_control: bool,
    /// Padding added to body bounds for the grouping broad phase (m).
    pub grouping_padding: f32,
}

impl Default for PhysicsEngineConfig {
    fn default() -> Self {
        Self {
            dt: DEFAULT_TIME_STEP,
            nsubsteps: DEFAULT_SUBSTEPS,
            bullet_line_substeps: DEFAULT_BULLET_LINE_SUBSTEPS,
            solver_iterations: DEFAULT_SOLVER_ITERATIONS,
            resolve_collision_type: ResolveCollisionType::default(),
            max_penetration: DEFAULT_MAX_PENETRATION,
            burn_in_duration: DEFAULT_BURN_IN_DURATION,
            normal_vector_error_behavior: NormalVectorErrorBehavior::default(),
            penalty_stiffness: DEFAULT_PENALTY_STIFFNESS,
            penalty_damping: DEFAULT_PENALTY_DAMPING,
            contact_beta: DEFAULT_CONTACT_BETA,
            contact_slop: DEFAULT_CONTACT_SLOP,
            lambda_max: DEFAULT_LAMBDA_MAX,
            max_impulse: DEFAULT_MAX_IMPULSE,
            stiction_coefficient: 1.0,
            friction_coefficient: 0.8,
            tire_min_velocity: 1.0,
            grind_threshold: 0.3,
            grind_release_threshold: 0.6,
            grind_beta: 0.2,
            max_residual_time: DEFAULT_MAX_RESIDUAL_TIME,
            fps_control: true,
            grouping_padding: 0.05,
        }
    }
}

impl PhysicsEngineConfig {
    /// Parses and validates a JSON configuration. Missing fields take their defaults.
    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(source).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Checks the cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("dt", self.dt)?;
        positive("max_penetration", self.max_penetration)?;
        positive("penalty_stiffness", self.penalty_stiffness)?;
        positive("lambda_max", self.lambda_max)?;
        positive("max_impulse", self.max_impulse)?;
        positive("max_residual_time", self.max_residual_time)?;
        positive("tire_min_velocity", self.tire_min_velocity)?;
        non_negative("burn_in_duration", self.burn_in_duration)?;
        non_negative("penalty_damping", self.penalty_damping)?;
        non_negative("contact_beta", self.contact_beta)?;
        non_negative("contact_slop", self.contact_slop)?;
        non_negative("grind_threshold", self.grind_threshold)?;
        non_negative("grouping_padding", self.grouping_padding)?;
        if self.nsubsteps == 0 {
            return Err(invalid("nsubsteps", "must be at least 1"));
        }
        if self.solver_iterations == 0 {
            return Err(invalid("solver_iterations", "must be at least 1"));
        }
        if self.bullet_line_substeps <= self.nsubsteps
            || self.bullet_line_substeps % self.nsubsteps != 0
        {
            return Err(ConfigError::SubstepComposition {
                standard: self.nsubsteps,
                bullet_line: self.bullet_line_substeps,
            });
        }
        if self.grind_release_threshold < self.grind_threshold {
            return Err(invalid(
                "grind_release_threshold",
                "must not be smaller than grind_threshold",
            ));
        }
        Ok(())
    }

    /// Substeps per frame for a penetration class.
    pub fn substeps(&self, class: PenetrationClass) -> usize {
        match class {
            PenetrationClass::Standard => self.nsubsteps,
            PenetrationClass::BulletLine => self.bullet_line_substeps,
        }
    }

    /// Speed up to which a line primitive of the given length cannot skip
    /// over a zero-thickness surface.
    pub fn max_tunnel_free_speed(&self, line_length: f32, class: PenetrationClass) -> f32 {
        line_length * self.substeps(class) as f32 / self.dt
    }
}

impl fmt::Display for PhysicsEngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dt={:.5} substeps={}/{} resolve={} max_penetration={}",
            self.dt,
            self.nsubsteps,
            self.bullet_line_substeps,
            self.resolve_collision_type,
            self.max_penetration
        )
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, &format!("must be positive and finite, got {value}")))
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, &format!("must be non-negative and finite, got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PhysicsEngineConfig::default().validate().is_ok());
    }

    #[test]
    fn enum_strings_parse_strictly() {
        assert_eq!(
            "penalty".parse::<ResolveCollisionType>(),
            Ok(ResolveCollisionType::Penalty)
        );
        assert_eq!(
            "bullet_line".parse::<PenetrationClass>(),
            Ok(PenetrationClass::BulletLine)
        );
        assert_eq!(
            "Penalty".parse::<ResolveCollisionType>(),
            Err(ConfigError::UnknownResolveCollisionType("Penalty".to_string()))
        );
        assert!(matches!(
            "bullet".parse::<PenetrationClass>(),
            Err(ConfigError::UnknownPenetrationClass(_))
        ));
    }

    #[test]
    fn penetration_classes_are_ordered_by_strictness() {
        assert!(PenetrationClass::BulletLine > PenetrationClass::Standard);
    }

    #[test]
    fn substep_counts_must_compose() {
        let config = PhysicsEngineConfig {
            nsubsteps: 8,
            bullet_line_substeps: 12,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::SubstepComposition {
                standard: 8,
                bullet_line: 12
            })
        );
    }
}
