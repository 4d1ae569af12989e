use glam::{DVec3, Mat3, Quat, Vec3};

use crate::dynamics::penetration::PenetrationLimits;
use crate::utils::math::angular_velocity_to_quat;

use super::types::Pose;

/// Kinematic state of a rigid body as seen by the impulse solver.
///
/// Velocities are about the center of mass. Contact impulses go through
/// [`integrate_impulse`](Self::integrate_impulse), which keeps the total
/// correction of the current substep inside the body's
/// [`PenetrationLimits`]; external forces bypass that budget.
#[derive(Debug, Clone)]
pub struct RigidBodyPulses {
    pub mass: f32,
    /// Inertia tensor about the center of mass, in body coordinates.
    pub inertia: Mat3,
    /// Center of mass in body coordinates.
    pub com: Vec3,
    pub v_com: Vec3,
    pub w: Vec3,
    pub rotation: Quat,
    /// Center of mass in world coordinates.
    pub abs_com: DVec3,
    pub penetration_limits: PenetrationLimits,
    inverse_mass: f32,
    inverse_inertia: Mat3,
    abs_inverse_inertia: Mat3,
    force: Vec3,
    torque: Vec3,
    correction_v: Vec3,
    correction_w: Vec3,
}

impl RigidBodyPulses {
    pub fn new(mass: f32, inertia: Mat3, com: Vec3, pose: Pose) -> Self {
        let mut pulses = Self {
            mass,
            inertia,
            com,
            v_com: Vec3::ZERO,
            w: Vec3::ZERO,
            rotation: pose.rotation,
            abs_com: pose.transform_point(com),
            penetration_limits: PenetrationLimits::unlimited(),
            inverse_mass: 0.0,
            inverse_inertia: Mat3::ZERO,
            abs_inverse_inertia: Mat3::ZERO,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            correction_v: Vec3::ZERO,
            correction_w: Vec3::ZERO,
        };
        pulses.recompute_inverses();
        pulses
    }

    /// Immovable body: zero inverse mass and inertia.
    pub fn fixed(pose: Pose) -> Self {
        Self::new(f32::INFINITY, Mat3::ZERO, Vec3::ZERO, pose)
    }

    fn recompute_inverses(&mut self) {
        if !self.mass.is_finite() || self.mass <= 0.0 {
            self.inverse_mass = 0.0;
            self.inverse_inertia = Mat3::ZERO;
        } else {
            self.inverse_mass = 1.0 / self.mass;
            self.inverse_inertia = if self.inertia.determinant().abs() < f32::EPSILON {
                Mat3::ZERO
            } else {
                self.inertia.inverse()
            };
        }
        self.update_abs_inertia();
    }

    fn update_abs_inertia(&mut self) {
        let r = Mat3::from_quat(self.rotation);
        self.abs_inverse_inertia = r * self.inverse_inertia * r.transpose();
    }

    pub fn is_static(&self) -> bool {
        self.inverse_mass == 0.0
    }

    pub fn inverse_mass(&self) -> f32 {
        self.inverse_mass
    }

    /// Inverse inertia tensor in world coordinates.
    pub fn abs_inertia_inv(&self) -> Mat3 {
        self.abs_inverse_inertia
    }

    pub fn pose(&self) -> Pose {
        Pose {
            position: self.abs_com - (self.rotation * self.com).as_dvec3(),
            rotation: self.rotation,
        }
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.rotation = pose.rotation;
        self.abs_com = pose.transform_point(self.com);
        self.update_abs_inertia();
    }

    pub fn transform_to_world(&self, local: Vec3) -> DVec3 {
        self.abs_com + (self.rotation * (local - self.com)).as_dvec3()
    }

    pub fn velocity_at_position(&self, position: DVec3) -> Vec3 {
        self.v_com + self.w.cross((position - self.abs_com).as_vec3())
    }

    /// `1/m + (r×n)·I⁻¹(r×n)` for an impulse along `n` at `position`.
    pub fn inverse_effective_mass(&self, position: DVec3, n: Vec3) -> f32 {
        if self.is_static() {
            return 0.0;
        }
        let j2 = (position - self.abs_com).as_vec3().cross(n);
        self.inverse_mass + j2.dot(self.abs_inverse_inertia * j2)
    }

    pub fn effective_mass(&self, position: DVec3, n: Vec3) -> f32 {
        let k = self.inverse_effective_mass(position, n);
        if k == 0.0 {
            f32::INFINITY
        } else {
            1.0 / k
        }
    }

    /// Marks the start of a substep: the correction budget is refilled.
    pub fn begin_substep(&mut self) {
        self.correction_v = Vec3::ZERO;
        self.correction_w = Vec3::ZERO;
    }

    /// Applies a contact impulse at a world position, clamped so that the
    /// accumulated correction of this substep stays within the limits.
    pub fn integrate_impulse(&mut self, impulse: Vec3, position: DVec3, dt: f32) {
        if self.is_static() {
            return;
        }
        let dv = impulse * self.inverse_mass;
        let dw = self.abs_inverse_inertia * (position - self.abs_com).as_vec3().cross(impulse);
        self.integrate_delta_v(dv, dt);
        self.integrate_delta_w(dw, dt);
    }

    pub fn integrate_delta_v(&mut self, dv: Vec3, dt: f32) {
        let limit = self.penetration_limits.vmax_translation(dt);
        let total = (self.correction_v + dv).clamp_length_max(limit);
        self.v_com += total - self.correction_v;
        self.correction_v = total;
    }

    pub fn integrate_delta_w(&mut self, dw: Vec3, dt: f32) {
        let limit = self.penetration_limits.wmax(dt);
        let total = (self.correction_w + dw).clamp_length_max(limit);
        self.w += total - self.correction_w;
        self.correction_w = total;
    }

    /// Correction applied since [`begin_substep`](Self::begin_substep).
    pub fn correction(&self) -> (Vec3, Vec3) {
        (self.correction_v, self.correction_w)
    }

    pub fn apply_central_force(&mut self, force: Vec3) {
        self.force += force;
    }

    pub fn apply_force(&mut self, force: Vec3, position: DVec3) {
        self.force += force;
        self.torque += (position - self.abs_com).as_vec3().cross(force);
    }

    pub fn apply_torque(&mut self, torque: Vec3) {
        self.torque += torque;
    }

    pub fn clear_forces(&mut self) {
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
    }

    /// Turns the accumulated force and torque into velocity and clears them.
    pub fn integrate_forces(&mut self, dt: f32) {
        if !self.is_static() {
            self.v_com += self.force * (self.inverse_mass * dt);
            self.w += self.abs_inverse_inertia * self.torque * dt;
        }
        self.clear_forces();
    }

    /// Moves the body along its current velocities.
    pub fn advance_time(&mut self, dt: f32) {
        if self.is_static() {
            return;
        }
        self.abs_com += (self.v_com * dt).as_dvec3();
        self.rotation = (angular_velocity_to_quat(self.w, dt) * self.rotation).normalize();
        self.update_abs_inertia();
    }

    pub fn is_finite(&self) -> bool {
        self.v_com.is_finite() && self.w.is_finite()
    }

    pub fn energy(&self) -> f32 {
        if self.is_static() {
            return 0.0;
        }
        let r = Mat3::from_quat(self.rotation);
        let abs_inertia = r * self.inertia * r.transpose();
        0.5 * self.mass * self.v_com.length_squared() + 0.5 * self.w.dot(abs_inertia * self.w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::InertiaTensorExt;

    fn unit_sphere() -> RigidBodyPulses {
        RigidBodyPulses::new(
            2.0,
            Mat3::for_solid_sphere(1.0, 2.0),
            Vec3::ZERO,
            Pose::default(),
        )
    }

    #[test]
    fn central_impulse_changes_linear_velocity_only() {
        let mut pulses = unit_sphere();
        pulses.integrate_impulse(Vec3::new(4.0, 0.0, 0.0), DVec3::ZERO, 0.01);
        assert!((pulses.v_com - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-6);
        assert_eq!(pulses.w, Vec3::ZERO);
    }

    #[test]
    fn velocity_at_position_includes_rotation() {
        let mut pulses = unit_sphere();
        pulses.w = Vec3::new(0.0, 0.0, 1.0);
        let v = pulses.velocity_at_position(DVec3::new(1.0, 0.0, 0.0));
        assert!((v - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn effective_mass_of_central_contact_is_mass() {
        let pulses = unit_sphere();
        let m = pulses.effective_mass(DVec3::new(0.0, -1.0, 0.0), Vec3::Y);
        assert!((m - 2.0).abs() < 1e-5);
    }

    #[test]
    fn correction_budget_is_clamped_per_substep() {
        let mut pulses = unit_sphere();
        pulses.penetration_limits = PenetrationLimits::new(0.1, 1.0);
        let dt = 0.01;
        let vmax = pulses.penetration_limits.vmax_translation(dt);
        for _ in 0..10 {
            pulses.integrate_impulse(Vec3::new(100.0, 0.0, 0.0), DVec3::ZERO, dt);
        }
        assert!(pulses.v_com.length() <= vmax + 1e-4);
        pulses.begin_substep();
        pulses.integrate_impulse(Vec3::new(100.0, 0.0, 0.0), DVec3::ZERO, dt);
        assert!(pulses.v_com.length() > vmax);
    }

    #[test]
    fn fixed_body_ignores_impulses() {
        let mut pulses = RigidBodyPulses::fixed(Pose::default());
        pulses.integrate_impulse(Vec3::ONE, DVec3::X, 0.01);
        pulses.advance_time(1.0);
        assert_eq!(pulses.v_com, Vec3::ZERO);
        assert!(pulses.is_static());
    }

    #[test]
    fn energy_counts_linear_and_angular_terms() {
        let mut pulses = unit_sphere();
        pulses.v_com = Vec3::new(3.0, 0.0, 0.0);
        assert!((pulses.energy() - 9.0).abs() < 1e-5);

        // I = 2/5 m r^2 = 0.8 about every axis.
        pulses.v_com = Vec3::ZERO;
        pulses.w = Vec3::new(0.0, 5.0, 0.0);
        assert!((pulses.energy() - 10.0).abs() < 1e-4);
        let inv = pulses.abs_inertia_inv();
        assert!((inv.y_axis.y - 1.25).abs() < 1e-5);
    }
}
