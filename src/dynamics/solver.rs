use crate::{
    collision::contact::{ContactInfo, ContactSet, SolverContext},
    config::PhysicsEngineConfig,
    core::rigidbody::RigidBody,
    error::FatalInvariantViolation,
    utils::allocator::Arena,
};

/// Aggregates of one solve, summed into the step profile.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SolverStepMetrics {
    pub sets_solved: usize,
    pub contacts_solved: usize,
    pub normal_impulse_sum: f32,
    pub tangent_impulse_sum: f32,
}

impl SolverStepMetrics {
    pub fn record(&mut self, contacts: &ContactSet) {
        self.sets_solved += 1;
        self.contacts_solved += contacts.len();
        for contact in contacts.iter() {
            match contact {
                ContactInfo::Normal(c) => self.normal_impulse_sum += c.lambda,
                ContactInfo::Friction(c) => self.tangent_impulse_sum += c.lambda.length(),
                ContactInfo::Tire(c) => self.tangent_impulse_sum += c.lambda.length(),
                ContactInfo::ShockAbsorber(_) | ContactInfo::Line(_) => {}
            }
        }
    }

    pub fn merge(&mut self, other: &Self) {
        self.sets_solved += other.sets_solved;
        self.contacts_solved += other.contacts_solved;
        self.normal_impulse_sum += other.normal_impulse_sum;
        self.tangent_impulse_sum += other.tangent_impulse_sum;
    }
}

/// Sequential impulse solver: a fixed number of passes over every
/// constraint of a contact set. With penalty resolution the normal
/// constraints act once per substep and only friction, tires and rails
/// iterate.
#[derive(Debug, Clone)]
pub struct ConstraintSolver {
    pub iterations: usize,
}

impl ConstraintSolver {
    pub fn new(iterations: usize) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn from_config(config: &PhysicsEngineConfig) -> Self {
        Self::new(config.solver_iterations)
    }

    /// Resolves `contacts` over one substep of length `dt`.
    pub fn solve(
        &self,
        bodies: &mut Arena<RigidBody>,
        contacts: &mut ContactSet,
        config: &PhysicsEngineConfig,
        dt: f32,
    ) -> Result<SolverStepMetrics, FatalInvariantViolation> {
        let mut metrics = SolverStepMetrics::default();
        if contacts.is_empty() {
            return Ok(metrics);
        }
        contacts.prepare(bodies);

        let mut ctx = SolverContext::new(config, dt);
        ctx.niterations = self.iterations;
        {
            let ContactSet {
                contacts: list,
                normal_impulses,
            } = contacts;
            for iteration in 0..self.iterations {
                ctx.begin_iteration(iteration);
                for contact in list.iter_mut() {
                    contact.solve(bodies, &ctx, normal_impulses)?;
                }
            }
        }

        metrics.record(contacts);
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::contact::ContactPoint;
    use crate::config::ResolveCollisionType;
    use crate::core::types::{InertiaTensorExt, PhysicsMaterial, Pose};
    use glam::{DVec3, Mat3, Vec3};

    fn ball(bodies: &mut Arena<RigidBody>, v: Vec3) -> crate::utils::allocator::BodyId {
        bodies.insert(
            RigidBody::new(
                "ball",
                1.0,
                Mat3::for_solid_sphere(0.5, 1.0),
                Pose::from_position(DVec3::new(0.0, 0.5, 0.0)),
            )
            .with_velocity(v, Vec3::ZERO),
        )
    }

    fn ground_contact(body: crate::utils::allocator::BodyId, overlap: f32) -> ContactPoint {
        ContactPoint {
            body,
            other: None,
            position: DVec3::ZERO,
            normal: Vec3::Y,
            overlap,
        }
    }

    #[test]
    fn pulses_stop_approach() {
        let mut bodies = Arena::new();
        let id = ball(&mut bodies, Vec3::new(0.0, -3.0, 0.0));
        let mut contacts = ContactSet::new();
        contacts.push_surface(ground_contact(id, 0.0), PhysicsMaterial::default().into());
        let config = PhysicsEngineConfig::default();
        ConstraintSolver::from_config(&config)
            .solve(&mut bodies, &mut contacts, &config, 1.0 / 480.0)
            .unwrap();
        let vn = match &contacts.contacts[0] {
            ContactInfo::Normal(c) => c.normal_velocity(&bodies).unwrap(),
            other => panic!("unexpected contact {other:?}"),
        };
        assert!(vn >= -1e-4, "vn = {vn}");
        assert_eq!(contacts.impacts().len(), 1);
    }

    #[test]
    fn stiction_stops_contact_point() {
        let mut bodies = Arena::new();
        let id = ball(&mut bodies, Vec3::new(1.0, -1.0, 0.0));
        let mut contacts = ContactSet::new();
        contacts.push_surface(ground_contact(id, 0.0), PhysicsMaterial::default().into());
        let config = PhysicsEngineConfig::default();
        ConstraintSolver::from_config(&config)
            .solve(&mut bodies, &mut contacts, &config, 1.0 / 480.0)
            .unwrap();
        let v = bodies.get(id).unwrap().pulses.velocity_at_position(DVec3::ZERO);
        assert!(v.x.abs() < 1e-4, "contact point still slides: {v:?}");
        assert!(bodies.get(id).unwrap().pulses.w.z < 0.0);
    }

    #[test]
    fn penalty_acts_once_per_substep() {
        let mut bodies = Arena::new();
        let id = ball(&mut bodies, Vec3::ZERO);
        let mut contacts = ContactSet::new();
        contacts.push_surface(ground_contact(id, 0.1), PhysicsMaterial::default().into());
        let config = PhysicsEngineConfig {
            resolve_collision_type: ResolveCollisionType::Penalty,
            ..Default::default()
        };
        let dt = 1.0 / 480.0;
        ConstraintSolver::from_config(&config)
            .solve(&mut bodies, &mut contacts, &config, dt)
            .unwrap();
        let expected = config.penalty_stiffness * 0.1 * dt;
        let vy = bodies.get(id).unwrap().pulses.v_com.y;
        assert!((vy - expected).abs() < 1e-4, "vy = {vy}, expected {expected}");
    }
}
