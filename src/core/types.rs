use glam::{DVec3, Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Rigid placement in the scene. Positions are double precision so that
/// large open worlds keep sub-millimeter accuracy; orientations stay single.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: DVec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Pose {
    pub fn new(position: DVec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn from_position(position: DVec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn transform_point(&self, local: Vec3) -> DVec3 {
        self.position + (self.rotation * local).as_dvec3()
    }

    pub fn transform_vector(&self, local: Vec3) -> Vec3 {
        self.rotation * local
    }

    pub fn inverse_transform_point(&self, world: DVec3) -> Vec3 {
        self.rotation.inverse() * (world - self.position).as_vec3()
    }
}

/// Physical surface attributes attached to collision primitives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsMaterial {
    pub stiction_coefficient: f32,
    pub friction_coefficient: f32,
    pub restitution: f32,
    /// Rail that bodies may grind on.
    pub rail: bool,
    /// Thin, fast line such as a projectile trace.
    pub bullet_line: bool,
    /// Primitive takes part in tire contacts.
    pub drivable: bool,
    pub mixing: MixingMode,
}

impl Default for PhysicsMaterial {
    fn default() -> Self {
        Self {
            stiction_coefficient: 1.0,
            friction_coefficient: 0.8,
            restitution: 0.0,
            rail: false,
            bullet_line: false,
            drivable: true,
            mixing: MixingMode::default(),
        }
    }
}

impl PhysicsMaterial {
    pub fn asphalt() -> Self {
        Self::default()
    }

    pub fn ice() -> Self {
        Self {
            stiction_coefficient: 0.1,
            friction_coefficient: 0.05,
            ..Self::default()
        }
    }

    pub fn rail() -> Self {
        Self {
            stiction_coefficient: 0.05,
            friction_coefficient: 0.02,
            rail: true,
            drivable: false,
            ..Self::default()
        }
    }

    pub fn bullet() -> Self {
        Self {
            bullet_line: true,
            drivable: false,
            ..Self::default()
        }
    }

    /// Coefficients of a contact between two surfaces.
    pub fn combine(&self, other: &Self) -> ContactMaterial {
        let mode = self.mixing.resolve(other.mixing);
        ContactMaterial {
            stiction_coefficient: mode.combine(self.stiction_coefficient, other.stiction_coefficient),
            friction_coefficient: mode.combine(self.friction_coefficient, other.friction_coefficient),
            restitution: self.restitution.max(other.restitution),
        }
    }
}

/// Friction/restitution of one contact, after mixing both surfaces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactMaterial {
    pub stiction_coefficient: f32,
    pub friction_coefficient: f32,
    pub restitution: f32,
}

impl From<PhysicsMaterial> for ContactMaterial {
    fn from(material: PhysicsMaterial) -> Self {
        Self {
            stiction_coefficient: material.stiction_coefficient,
            friction_coefficient: material.friction_coefficient,
            restitution: material.restitution,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MixingMode {
    #[default]
    Average,
    Min,
    Max,
    GeometricMean,
}

impl MixingMode {
    fn combine(self, a: f32, b: f32) -> f32 {
        match self {
            MixingMode::Average => 0.5 * (a + b),
            MixingMode::Min => a.min(b),
            MixingMode::Max => a.max(b),
            MixingMode::GeometricMean => (a.abs() * b.abs()).sqrt(),
        }
    }

    fn resolve(self, other: MixingMode) -> MixingMode {
        if matches!(self, MixingMode::Average) {
            other
        } else {
            self
        }
    }
}

/// Helper methods for inertia calculations.
pub trait InertiaTensorExt {
    fn for_solid_box(half_extents: Vec3, mass: f32) -> Mat3;
    fn for_solid_sphere(radius: f32, mass: f32) -> Mat3;
}

impl InertiaTensorExt for Mat3 {
    fn for_solid_box(half_extents: Vec3, mass: f32) -> Mat3 {
        let l = half_extents * 2.0;
        let factor = mass / 12.0;
        Mat3::from_diagonal(Vec3::new(
            factor * (l.y * l.y + l.z * l.z),
            factor * (l.x * l.x + l.z * l.z),
            factor * (l.x * l.x + l.y * l.y),
        ))
    }

    fn for_solid_sphere(radius: f32, mass: f32) -> Mat3 {
        Mat3::from_diagonal(Vec3::splat(0.4 * mass * radius * radius))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixing_modes_combine_expected_values() {
        assert!((MixingMode::Average.combine(0.6, 0.2) - 0.4).abs() < 1e-5);
        assert!((MixingMode::Min.combine(0.6, 0.2) - 0.2).abs() < 1e-5);
        assert!((MixingMode::Max.combine(0.6, 0.2) - 0.6).abs() < 1e-5);
        let expected = (0.6_f32 * 0.2_f32).sqrt();
        assert!((MixingMode::GeometricMean.combine(0.6, 0.2) - expected).abs() < 1e-5);
    }

    #[test]
    fn non_default_mixing_wins() {
        let mut ice = PhysicsMaterial::ice();
        ice.mixing = MixingMode::Min;
        let contact = PhysicsMaterial::asphalt().combine(&ice);
        assert!((contact.friction_coefficient - 0.05).abs() < 1e-6);
    }

    #[test]
    fn pose_round_trips_points() {
        let pose = Pose::new(
            DVec3::new(1e6, 2.0, -3.0),
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
        );
        let local = Vec3::new(1.0, 2.0, 3.0);
        let back = pose.inverse_transform_point(pose.transform_point(local));
        assert!((back - local).length() < 1e-4);
    }
}
