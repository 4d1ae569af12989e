use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::config::config_enum;

/// What the controller asks an engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum EnginePowerIntent {
    #[default]
    Off,
    Idle,
    /// Signed power delivered at the wheels (W); negative reverses.
    Driving { surface_power: f32 },
}

/// Spinning power source with its own angular velocity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseRotor {
    pub name: String,
    /// Angular velocity (rad/s).
    pub w: f32,
    pub intent: EnginePowerIntent,
    pub max_power: f32,
    pub max_w: f32,
    /// Torque is computed from power as `P / max(|w|, min_w)`.
    pub min_w: f32,
    /// Friction torque per rad/s while idling or off.
    pub idle_friction: f32,
    /// Rotor revolutions per driven-wheel revolution.
    pub gear_ratio: f32,
}

impl BaseRotor {
    pub fn new(name: impl Into<String>, max_power: f32) -> Self {
        Self {
            name: name.into(),
            w: 0.0,
            intent: EnginePowerIntent::Off,
            max_power,
            max_w: 700.0,
            min_w: 30.0,
            idle_friction: 0.05,
            gear_ratio: 4.0,
        }
    }

    pub fn notify_off(&mut self) {
        self.intent = EnginePowerIntent::Off;
    }

    pub fn notify_idle(&mut self) {
        self.intent = EnginePowerIntent::Idle;
    }

    pub fn notify_driving(&mut self, surface_power: f32) {
        self.intent = EnginePowerIntent::Driving {
            surface_power: surface_power.clamp(-self.max_power, self.max_power),
        };
    }

    pub fn is_driving(&self) -> bool {
        matches!(self.intent, EnginePowerIntent::Driving { .. })
    }

    pub fn surface_power(&self) -> f32 {
        match self.intent {
            EnginePowerIntent::Driving { surface_power } => surface_power,
            _ => 0.0,
        }
    }

    /// Torque on the rotor shaft for the current intent.
    pub fn torque(&self) -> f32 {
        match self.intent {
            EnginePowerIntent::Off | EnginePowerIntent::Idle => -self.idle_friction * self.w,
            EnginePowerIntent::Driving { surface_power } => {
                if self.w.abs() >= self.max_w && self.w.signum() == surface_power.signum() {
                    return 0.0;
                }
                surface_power / self.w.abs().max(self.min_w)
            }
        }
    }

    /// Torque at the wheels after the gear train.
    pub fn wheel_torque(&self) -> f32 {
        self.torque() * self.gear_ratio
    }

    /// Couples the rotor to the average angular velocity of the wheels it drives.
    pub fn couple_to_wheels(&mut self, wheel_w: f32) {
        self.w = wheel_w * self.gear_ratio;
    }

    pub fn reset(&mut self) {
        self.w = 0.0;
        self.intent = EnginePowerIntent::Off;
    }
}

/// How a lift rotor compensates for the tilt of its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum GravityCorrection {
    /// Lift follows the rotor axis.
    #[default]
    None,
    /// Rotor is gimballed and always lifts against gravity.
    Gimbal,
    /// Lift follows the axis and is scaled so that its vertical part matches the nominal lift.
    Move,
}

config_enum!(GravityCorrection, UnknownGravityCorrection, {
    None => "none",
    Gimbal => "gimbal",
    Move => "move",
});

/// Rotor producing lift along an axis (helicopter or drone blades).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rotor {
    pub base: BaseRotor,
    /// Attachment point in body coordinates.
    pub position: Vec3,
    /// Lift axis in body coordinates.
    pub axis: Vec3,
    /// Lift force per watt (N/W).
    pub power2lift: f32,
    pub gravity_correction: GravityCorrection,
    /// Largest tilt compensated by [`GravityCorrection::Move`] (rad).
    pub max_tilt: f32,
}

impl Rotor {
    pub fn new(name: impl Into<String>, position: Vec3, max_power: f32, power2lift: f32) -> Self {
        Self {
            base: BaseRotor::new(name, max_power),
            position,
            axis: Vec3::Y,
            power2lift,
            gravity_correction: GravityCorrection::None,
            max_tilt: 0.5,
        }
    }

    /// World-space lift force for a body orientation.
    pub fn lift(&self, rotation: Quat, gravity: Vec3) -> Vec3 {
        let magnitude = self.base.surface_power().max(0.0) * self.power2lift;
        let axis = (rotation * self.axis).normalize_or_zero();
        let up = (-gravity).normalize_or_zero();
        match self.gravity_correction {
            GravityCorrection::None => axis * magnitude,
            GravityCorrection::Gimbal if up != Vec3::ZERO => up * magnitude,
            GravityCorrection::Gimbal => axis * magnitude,
            GravityCorrection::Move => {
                let cos_tilt = axis.dot(up).max(self.max_tilt.cos());
                if up == Vec3::ZERO || cos_tilt <= 0.0 {
                    axis * magnitude
                } else {
                    axis * (magnitude / cos_tilt)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driving_torque_follows_power() {
        let mut engine = BaseRotor::new("engine", 1e5);
        engine.notify_driving(6e3);
        engine.w = 100.0;
        assert!((engine.torque() - 60.0).abs() < 1e-4);
        engine.w = 0.0;
        assert!((engine.torque() - 6e3 / engine.min_w).abs() < 1e-3);
    }

    #[test]
    fn idle_rotor_slows_down() {
        let mut engine = BaseRotor::new("engine", 1e5);
        engine.w = 100.0;
        engine.notify_idle();
        assert!(engine.torque() < 0.0);
        engine.notify_off();
        assert!(!engine.is_driving());
    }

    #[test]
    fn rotor_spins_with_the_wheels_through_the_gears() {
        let mut engine = BaseRotor::new("engine", 1e5);
        engine.gear_ratio = 4.0;
        engine.couple_to_wheels(25.0);
        assert_eq!(engine.w, 100.0);
        engine.reset();
        assert_eq!(engine.w, 0.0);
    }

    #[test]
    fn gravity_correction_parses_strictly() {
        assert_eq!("gimbal".parse::<GravityCorrection>(), Ok(GravityCorrection::Gimbal));
        assert!("tilt".parse::<GravityCorrection>().is_err());
    }

    #[test]
    fn gimbal_lifts_against_gravity() {
        let mut rotor = Rotor::new("main", Vec3::ZERO, 1e4, 0.01);
        rotor.gravity_correction = GravityCorrection::Gimbal;
        rotor.base.notify_driving(1e4);
        let tilted = Quat::from_rotation_z(0.3);
        let lift = rotor.lift(tilted, Vec3::new(0.0, -9.8, 0.0));
        assert!((lift - Vec3::new(0.0, 100.0, 0.0)).length() < 1e-3);
    }
}
