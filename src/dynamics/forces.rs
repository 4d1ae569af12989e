use std::collections::HashMap;

use glam::Vec3;

use crate::config::PhysicsEngineConfig;
use crate::core::rigidbody::RigidBody;
use crate::core::static_world::StaticWorld;
use crate::dynamics::vehicle::VehicleControls;
use crate::utils::allocator::{Arena, BodyId};

/// Source of external forces, invoked once per substep before integration.
///
/// Implementations write their own slot of
/// [`ExternalForces`](crate::core::rigidbody::ExternalForces) instead of
/// accumulating, so calling them repeatedly within a substep is harmless.
pub trait ExternalForceProvider: Send + Sync {
    fn increment_external_forces(
        &mut self,
        bodies: &mut Arena<RigidBody>,
        ids: &[BodyId],
        burn_in: bool,
        config: &PhysicsEngineConfig,
        world: &StaticWorld,
    );
}

/// Weight from the world gravity vector.
#[derive(Debug, Clone, Copy, Default)]
pub struct GravityProvider;

impl ExternalForceProvider for GravityProvider {
    fn increment_external_forces(
        &mut self,
        bodies: &mut Arena<RigidBody>,
        ids: &[BodyId],
        _burn_in: bool,
        _config: &PhysicsEngineConfig,
        world: &StaticWorld,
    ) {
        for &id in ids {
            if let Some(body) = bodies.get_mut(id).filter(|b| !b.is_static()) {
                body.external_forces.gravity = world.gravity * body.pulses.mass;
            }
        }
    }
}

/// Quadratic drag against the air, which moves with the world wind.
#[derive(Debug, Clone, Copy)]
pub struct WindProvider {
    /// `0.5·ρ·c_d·A` (kg/m).
    pub drag_coefficient: f32,
}

impl WindProvider {
    pub fn new(drag_coefficient: f32) -> Self {
        Self { drag_coefficient }
    }
}

impl ExternalForceProvider for WindProvider {
    fn increment_external_forces(
        &mut self,
        bodies: &mut Arena<RigidBody>,
        ids: &[BodyId],
        _burn_in: bool,
        _config: &PhysicsEngineConfig,
        world: &StaticWorld,
    ) {
        for &id in ids {
            if let Some(body) = bodies.get_mut(id).filter(|b| !b.is_static()) {
                let air = world.wind - body.pulses.v_com;
                body.external_forces.wind = air * (air.length() * self.drag_coefficient);
            }
        }
    }
}

/// Input of a user or AI controller for one body.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlInput {
    pub vehicle: VehicleControls,
    /// Direct push on the center of mass (N).
    pub force: Vec3,
    pub torque: Vec3,
}

/// Routes controller inputs to vehicles and bodies. Inputs are ignored
/// during burn-in.
#[derive(Debug, Clone, Default)]
pub struct ControlProvider {
    inputs: HashMap<BodyId, ControlInput>,
}

impl ControlProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: BodyId, input: ControlInput) {
        self.inputs.insert(id, input);
    }

    pub fn get(&self, id: BodyId) -> Option<&ControlInput> {
        self.inputs.get(&id)
    }

    pub fn remove(&mut self, id: BodyId) {
        self.inputs.remove(&id);
    }
}

impl ExternalForceProvider for ControlProvider {
    fn increment_external_forces(
        &mut self,
        bodies: &mut Arena<RigidBody>,
        ids: &[BodyId],
        burn_in: bool,
        _config: &PhysicsEngineConfig,
        _world: &StaticWorld,
    ) {
        for &id in ids {
            let Some(body) = bodies.get_mut(id) else {
                continue;
            };
            let input = if burn_in {
                ControlInput::default()
            } else {
                self.inputs.get(&id).copied().unwrap_or_default()
            };
            body.external_forces.control = input.force;
            body.external_forces.control_torque = input.torque;
            if let Some(vehicle) = body.vehicle_mut() {
                vehicle.apply_controls(input.vehicle, burn_in);
            }
        }
    }
}

/// Ordered set of force providers.
pub struct ForceRegistry {
    providers: Vec<Box<dyn ExternalForceProvider>>,
}

impl Default for ForceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ForceRegistry {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    pub fn add_provider<P: ExternalForceProvider + 'static>(&mut self, provider: P) {
        self.providers.push(Box::new(provider));
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn increment_all(
        &mut self,
        bodies: &mut Arena<RigidBody>,
        ids: &[BodyId],
        burn_in: bool,
        config: &PhysicsEngineConfig,
        world: &StaticWorld,
    ) {
        for provider in &mut self.providers {
            provider.increment_external_forces(bodies, ids, burn_in, config, world);
        }
    }
}

impl std::fmt::Debug for ForceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForceRegistry")
            .field("providers", &self.providers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{InertiaTensorExt, Pose};
    use glam::Mat3;

    fn body() -> RigidBody {
        RigidBody::new("box", 2.0, Mat3::for_solid_box(Vec3::ONE, 2.0), Pose::default())
    }

    #[test]
    fn providers_are_idempotent_within_a_substep() {
        let mut bodies = Arena::new();
        let id = bodies.insert(body());
        let mut registry = ForceRegistry::new();
        registry.add_provider(GravityProvider);
        registry.add_provider(WindProvider::new(0.5));
        let config = PhysicsEngineConfig::default();
        let world = StaticWorld {
            wind: Vec3::new(2.0, 0.0, 0.0),
            ..StaticWorld::default()
        };
        registry.increment_all(&mut bodies, &[id], true, &config, &world);
        let once = bodies.get(id).unwrap().external_forces;
        registry.increment_all(&mut bodies, &[id], true, &config, &world);
        assert_eq!(bodies.get(id).unwrap().external_forces, once);
        assert_eq!(once.gravity, world.gravity * 2.0);
        assert_eq!(once.wind, Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn controls_are_ignored_during_burn_in() {
        let mut bodies = Arena::new();
        let id = bodies.insert(body());
        let mut controls = ControlProvider::new();
        controls.set(
            id,
            ControlInput {
                force: Vec3::X,
                ..Default::default()
            },
        );
        let config = PhysicsEngineConfig::default();
        let world = StaticWorld::default();
        controls.increment_external_forces(&mut bodies, &[id], true, &config, &world);
        assert_eq!(bodies.get(id).unwrap().external_forces.control, Vec3::ZERO);
        controls.increment_external_forces(&mut bodies, &[id], false, &config, &world);
        assert_eq!(bodies.get(id).unwrap().external_forces.control, Vec3::X);
    }
}
