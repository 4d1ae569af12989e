use glam::{DVec3, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::core::types::Pose;

use super::rotor::{BaseRotor, Rotor};
use super::tire::Tire;

/// Controller inputs for one vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleControls {
    pub engine_on: bool,
    /// Signed power at the wheels (W); zero idles the engine.
    pub surface_power: f32,
    /// Steering angle of steerable tires (rad).
    pub steer: f32,
    /// Brake pedal in `[0, 1]`.
    pub brake: f32,
    /// Power fed to lift rotors (W).
    pub rotor_power: f32,
}

/// Suspension ray of one tire, in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TireRay {
    pub tire: usize,
    pub origin: DVec3,
    pub direction: Vec3,
    pub length: f32,
    /// Rolling direction including steering.
    pub forward: Vec3,
}

/// Drivetrain, wheels and rotors of a body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub tires: Vec<Tire>,
    pub engine: Option<BaseRotor>,
    pub rotors: Vec<Rotor>,
    pub controls: VehicleControls,
}

impl Vehicle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tire(mut self, tire: Tire) -> Self {
        self.tires.push(tire);
        self
    }

    pub fn with_engine(mut self, engine: BaseRotor) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_rotor(mut self, rotor: Rotor) -> Self {
        self.rotors.push(rotor);
        self
    }

    /// Translates controller inputs into engine intents, steering and brakes.
    /// During burn-in engines are forced off and brakes fully applied.
    pub fn apply_controls(&mut self, controls: VehicleControls, burn_in: bool) {
        self.controls = controls;
        if let Some(engine) = self.engine.as_mut() {
            if burn_in || !controls.engine_on {
                engine.notify_off();
            } else if controls.surface_power == 0.0 {
                engine.notify_idle();
            } else {
                engine.notify_driving(controls.surface_power);
            }
        }
        let brake = if burn_in { 1.0 } else { controls.brake.clamp(0.0, 1.0) };
        for tire in &mut self.tires {
            if tire.steerable {
                tire.steering_angle = controls.steer;
            }
            tire.brake_torque = brake * tire.max_brake_torque;
        }
        for rotor in &mut self.rotors {
            if burn_in || !controls.engine_on {
                rotor.base.notify_off();
            } else {
                rotor.base.notify_driving(controls.rotor_power);
            }
        }
    }

    /// Forces every power source off.
    pub fn engines_off(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.notify_off();
        }
        for rotor in &mut self.rotors {
            rotor.base.notify_off();
        }
    }

    /// Advances drivetrain and wheels by one fixed step.
    pub fn advance_time(&mut self, dt: f32) {
        let driven = self.tires.iter().filter(|t| t.driven).count();
        let wheel_torque = match (&self.engine, driven) {
            (Some(engine), n) if n > 0 => engine.wheel_torque() / n as f32,
            _ => 0.0,
        };
        for tire in &mut self.tires {
            tire.drive_torque = if tire.driven { wheel_torque } else { 0.0 };
            tire.advance_time(dt);
        }
        if let Some(engine) = self.engine.as_mut() {
            if driven > 0 {
                let average_w = self
                    .tires
                    .iter()
                    .filter(|t| t.driven)
                    .map(|t| t.w)
                    .sum::<f32>()
                    / driven as f32;
                engine.couple_to_wheels(average_w);
            }
        }
    }

    /// Reinitializes all force-model state without touching the geometry.
    pub fn notify_reset(&mut self) {
        for tire in &mut self.tires {
            tire.notify_reset();
        }
        if let Some(engine) = self.engine.as_mut() {
            engine.reset();
        }
        for rotor in &mut self.rotors {
            rotor.base.reset();
        }
        self.controls = VehicleControls::default();
    }

    pub fn tire_rays(&self, pose: &Pose) -> Vec<TireRay> {
        self.tires
            .iter()
            .enumerate()
            .map(|(index, tire)| {
                let steering = Quat::from_axis_angle(tire.up.normalize(), tire.steering_angle);
                TireRay {
                    tire: index,
                    origin: pose.transform_point(tire.mount),
                    direction: pose.transform_vector(-tire.up).normalize(),
                    length: tire.suspension_length + tire.radius,
                    forward: pose.transform_vector(steering * tire.forward).normalize(),
                }
            })
            .collect()
    }

    /// World-space rotor forces and their points of application.
    pub fn rotor_forces(&self, pose: &Pose, gravity: Vec3) -> Vec<(Vec3, DVec3)> {
        self.rotors
            .iter()
            .map(|rotor| {
                (
                    rotor.lift(pose.rotation, gravity),
                    pose.transform_point(rotor.position),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn car() -> Vehicle {
        Vehicle::new()
            .with_engine(BaseRotor::new("engine", 1e5))
            .with_tire(Tire::new("rl", Vec3::new(-0.8, 0.0, 1.3), 0.33).with_driven(true))
            .with_tire(Tire::new("rr", Vec3::new(0.8, 0.0, 1.3), 0.33).with_driven(true))
            .with_tire(Tire::new("fl", Vec3::new(-0.8, 0.0, -1.3), 0.33).with_steerable(true))
    }

    #[test]
    fn driving_spins_driven_wheels_only() {
        let mut vehicle = car();
        vehicle.apply_controls(
            VehicleControls {
                engine_on: true,
                surface_power: 2e4,
                ..Default::default()
            },
            false,
        );
        vehicle.advance_time(1.0 / 60.0);
        assert!(vehicle.tires[0].w > 0.0);
        assert!(vehicle.tires[1].w > 0.0);
        assert_eq!(vehicle.tires[2].w, 0.0);
    }

    #[test]
    fn burn_in_forces_engine_off() {
        let mut vehicle = car();
        vehicle.apply_controls(
            VehicleControls {
                engine_on: true,
                surface_power: 2e4,
                steer: 0.2,
                ..Default::default()
            },
            true,
        );
        assert!(!vehicle.engine.as_ref().is_some_and(|e| e.is_driving()));
        assert_eq!(vehicle.tires[2].steering_angle, 0.2);
        assert_eq!(vehicle.tires[0].steering_angle, 0.0);
    }

    #[test]
    fn tire_rays_point_down() {
        let vehicle = car();
        let rays = vehicle.tire_rays(&Pose::from_position(DVec3::new(0.0, 1.0, 0.0)));
        assert_eq!(rays.len(), 3);
        for ray in rays {
            assert!((ray.direction - Vec3::NEG_Y).length() < 1e-6);
            assert!((ray.origin.y - 1.0).abs() < 1e-9);
        }
    }
}
