use glam::Vec3;

use crate::core::rigidbody::RigidBody;
use crate::error::FatalInvariantViolation;
use crate::utils::allocator::{Arena, BodyId};

/// Semi-implicit Euler over the members of a collision group: forces first,
/// then contacts, then positions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Integrator;

impl Integrator {
    pub fn new() -> Self {
        Self
    }

    /// Moves the external forces of the substep into the velocities.
    pub fn integrate_velocity(
        &self,
        bodies: &mut Arena<RigidBody>,
        ids: &[BodyId],
        gravity: Vec3,
        dt: f32,
    ) {
        for &id in ids {
            if let Some(body) = bodies.get_mut(id) {
                body.apply_external_forces(gravity);
                body.pulses.integrate_forces(dt);
            }
        }
    }

    /// Advances poses along the resolved velocities. A non-finite velocity
    /// aborts the step before it can reach the pose.
    pub fn integrate_position(
        &self,
        bodies: &mut Arena<RigidBody>,
        ids: &[BodyId],
        dt: f32,
    ) -> Result<(), FatalInvariantViolation> {
        for &id in ids {
            let body = bodies
                .get_mut(id)
                .ok_or(FatalInvariantViolation::StaleHandle { body: id })?;
            if !body.pulses.is_finite() {
                return Err(FatalInvariantViolation::NonFiniteVelocity {
                    body: id,
                    v: body.pulses.v_com,
                    w: body.pulses.w,
                });
            }
            body.pulses.advance_time(dt);
            body.refresh_world_meshes();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{InertiaTensorExt, Pose};
    use glam::{DVec3, Mat3};

    fn falling() -> (Arena<RigidBody>, BodyId) {
        let mut bodies = Arena::new();
        let id = bodies.insert(RigidBody::new(
            "ball",
            1.0,
            Mat3::for_solid_sphere(0.5, 1.0),
            Pose::from_position(DVec3::new(0.0, 10.0, 0.0)),
        ));
        (bodies, id)
    }

    #[test]
    fn gravity_accelerates_and_moves() {
        let (mut bodies, id) = falling();
        bodies.get_mut(id).unwrap().external_forces.gravity = Vec3::new(0.0, -9.8, 0.0);
        let integrator = Integrator::new();
        integrator.integrate_velocity(&mut bodies, &[id], Vec3::new(0.0, -9.8, 0.0), 0.1);
        integrator.integrate_position(&mut bodies, &[id], 0.1).unwrap();
        let body = bodies.get(id).unwrap();
        assert!((body.pulses.v_com.y + 0.98).abs() < 1e-5);
        assert!(body.pose().position.y < 10.0);
    }

    #[test]
    fn non_finite_velocity_is_fatal() {
        let (mut bodies, id) = falling();
        bodies.get_mut(id).unwrap().pulses.v_com = Vec3::new(f32::NAN, 0.0, 0.0);
        let err = Integrator::new()
            .integrate_position(&mut bodies, &[id], 0.01)
            .unwrap_err();
        assert!(matches!(err, FatalInvariantViolation::NonFiniteVelocity { body, .. } if body == id));
    }
}
