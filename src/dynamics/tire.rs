//! Tire slip model.
//!
//! Slip is mapped to a normalized friction coefficient through the magic
//! formula `D·sin(C·atan(B·x − E·(B·x − atan(B·x))))`. Inputs are slip
//! ratios and slip angles in radians, so `B` is pre-scaled accordingly.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::suspension::ShockAbsorber;

/// Pacejka curve constants: stiffness `b`, shape `c`, peak `d`, curvature `e`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MagicFormula {
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
}

impl Default for MagicFormula {
    fn default() -> Self {
        Self {
            b: 41.0,
            c: 1.4,
            d: 1.0,
            e: -0.2,
        }
    }
}

impl MagicFormula {
    pub fn eval(&self, x: f32) -> f32 {
        let bx = self.b * x;
        self.d * (self.c * (bx - self.e * (bx - bx.atan())).atan()).sin()
    }

    /// Slip at which the curve peaks, or infinity when it saturates without a peak.
    pub fn argmax(&self) -> f32 {
        if self.c <= 1.0 || self.b <= 0.0 {
            return f32::INFINITY;
        }
        // The peak sits where C·atan(phi) = pi/2; phi grows monotonically with B·x.
        let phi_peak = (std::f64::consts::FRAC_PI_2 / self.c as f64).tan();
        let e = self.e as f64;
        let phi = |u: f64| u - e * (u - u.atan());
        let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
        while phi(hi) < phi_peak {
            hi *= 2.0;
            if hi > 1e9 {
                return f32::INFINITY;
            }
        }
        for _ in 0..80 {
            let mid = 0.5 * (lo + hi);
            if phi(mid) < phi_peak {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        (0.5 * (lo + hi) / self.b as f64) as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MagicFormulaMode {
    /// Full curve, friction drops after the peak.
    #[default]
    Standard,
    /// Friction stays at its peak beyond the argmax.
    NoSlip,
}

/// Magic formula with its precomputed peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MagicFormulaArgmax {
    pub formula: MagicFormula,
    pub argmax: f32,
}

impl Default for MagicFormulaArgmax {
    fn default() -> Self {
        Self::new(MagicFormula::default())
    }
}

impl MagicFormulaArgmax {
    pub fn new(formula: MagicFormula) -> Self {
        Self {
            formula,
            argmax: formula.argmax(),
        }
    }

    pub fn call(&self, x: f32, mode: MagicFormulaMode) -> f32 {
        match mode {
            MagicFormulaMode::NoSlip if x.abs() > self.argmax => {
                self.formula.d * x.signum()
            }
            _ => self.formula.eval(x),
        }
    }
}

/// Longitudinal and lateral curves combined on a friction ellipse.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CombinedMagicFormula {
    pub longitudinal: MagicFormulaArgmax,
    pub lateral: MagicFormulaArgmax,
}

impl CombinedMagicFormula {
    /// Friction coefficients for `(slip ratio, slip angle)`.
    pub fn call(&self, slip: Vec2, mode: MagicFormulaMode) -> Vec2 {
        let normalized = Vec2::new(
            slip.x / self.longitudinal.argmax,
            slip.y / self.lateral.argmax,
        );
        let rho = normalized.length();
        if !rho.is_finite() || rho < 1e-9 {
            return Vec2::new(
                self.longitudinal.call(slip.x, mode),
                self.lateral.call(slip.y, mode),
            );
        }
        let direction = normalized / rho;
        Vec2::new(
            self.longitudinal.call(rho * self.longitudinal.argmax, mode) * direction.x,
            self.lateral.call(rho * self.lateral.argmax, mode) * direction.y,
        )
    }
}

/// One wheel: rotation state, steering, braking and its suspension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tire {
    pub name: String,
    /// Top of the suspension travel, in body coordinates.
    pub mount: Vec3,
    /// Rolling direction at zero steering, in body coordinates.
    pub forward: Vec3,
    /// Suspension axis, in body coordinates.
    pub up: Vec3,
    pub radius: f32,
    /// Rotational inertia of the wheel (kg·m²).
    pub inertia: f32,
    pub suspension_length: f32,
    pub driven: bool,
    pub steerable: bool,
    pub max_brake_torque: f32,
    /// Multiplier on the surface friction coefficients.
    pub grip: f32,
    pub magic_formula: CombinedMagicFormula,
    pub mode: MagicFormulaMode,
    pub shock_absorber: ShockAbsorber,
    /// Angular velocity (rad/s); positive rolls the vehicle forward.
    pub w: f32,
    pub steering_angle: f32,
    pub brake_torque: f32,
    pub drive_torque: f32,
    /// Last `(slip ratio, slip angle)` seen by the contact solver.
    pub slip: Vec2,
    pub ground_contact: bool,
}

impl Tire {
    pub fn new(name: impl Into<String>, mount: Vec3, radius: f32) -> Self {
        Self {
            name: name.into(),
            mount,
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            radius,
            inertia: 1.2,
            suspension_length: 0.3,
            driven: false,
            steerable: false,
            max_brake_torque: 3000.0,
            grip: 1.0,
            magic_formula: CombinedMagicFormula::default(),
            mode: MagicFormulaMode::Standard,
            shock_absorber: ShockAbsorber::new(4e4, 3e3),
            w: 0.0,
            steering_angle: 0.0,
            brake_torque: 0.0,
            drive_torque: 0.0,
            slip: Vec2::ZERO,
            ground_contact: false,
        }
    }

    pub fn with_driven(mut self, driven: bool) -> Self {
        self.driven = driven;
        self
    }

    pub fn with_steerable(mut self, steerable: bool) -> Self {
        self.steerable = steerable;
        self
    }

    pub fn with_shock_absorber(mut self, shock_absorber: ShockAbsorber) -> Self {
        self.shock_absorber = shock_absorber;
        self
    }

    /// Surface speed of the tread relative to the hub.
    pub fn surface_speed(&self) -> f32 {
        self.w * self.radius
    }

    /// `(w·r − v) / max(|v|, v_min)`: positive when the wheel spins faster than the ground passes.
    pub fn slip_ratio(&self, v_longitudinal: f32, min_velocity: f32) -> f32 {
        (self.surface_speed() - v_longitudinal) / v_longitudinal.abs().max(min_velocity)
    }

    /// Slip angle of the contact patch (rad).
    pub fn slip_angle(v_longitudinal: f32, v_lateral: f32, min_velocity: f32) -> f32 {
        (v_lateral / v_longitudinal.abs().max(min_velocity)).atan()
    }

    /// Normalized friction for `(slip ratio, slip angle)`.
    pub fn friction_coefficients(&self, slip: Vec2) -> Vec2 {
        self.magic_formula.call(slip, self.mode)
    }

    /// Largest normalized friction the patch can transmit in each direction.
    /// Below the peak of the curve the tire holds up to `D`; past it the
    /// capacity follows the falling branch of the combined curve.
    pub fn friction_capacity(&self, slip: Vec2) -> Vec2 {
        let peak = Vec2::new(
            self.magic_formula.longitudinal.formula.d,
            self.magic_formula.lateral.formula.d,
        );
        let normalized = Vec2::new(
            slip.x / self.magic_formula.longitudinal.argmax,
            slip.y / self.magic_formula.lateral.argmax,
        );
        if self.mode == MagicFormulaMode::NoSlip || !(normalized.length() > 1.0) {
            return peak;
        }
        self.friction_coefficients(slip).abs()
    }

    /// Applies a friction impulse at the contact patch to the wheel rotation.
    pub fn integrate_ground_impulse(&mut self, longitudinal_impulse: f32) {
        self.w -= longitudinal_impulse * self.radius / self.inertia;
    }

    /// Integrates drive and brake torque over one fixed step.
    pub fn advance_time(&mut self, dt: f32) {
        self.w += self.drive_torque / self.inertia * dt;
        let brake_dw = self.brake_torque.abs() / self.inertia * dt;
        if self.w.abs() <= brake_dw {
            self.w = 0.0;
        } else {
            self.w -= brake_dw * self.w.signum();
        }
    }

    /// Clears slip history, suspension state and wheel rotation.
    pub fn notify_reset(&mut self) {
        self.w = 0.0;
        self.steering_angle = 0.0;
        self.brake_torque = 0.0;
        self.drive_torque = 0.0;
        self.slip = Vec2::ZERO;
        self.ground_contact = false;
        self.shock_absorber.reset();
    }
}
