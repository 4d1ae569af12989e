use crossbeam_channel::Sender;
use glam::{DVec3, Mat3, Vec3};

use crate::config::{PenetrationClass, PhysicsEngineConfig};
use crate::dynamics::grouping::PhysicsPhase;
use crate::dynamics::penetration::PenetrationLimits;
use crate::dynamics::vehicle::Vehicle;
use crate::utils::allocator::BodyId;

use super::capabilities::{Capabilities, Damageable, Grinder};
use super::mesh::{Aabb, CollisionMesh};
use super::pulses::RigidBodyPulses;
use super::types::Pose;

/// Force slots written by external force providers. Providers overwrite
/// their slot rather than adding to it, so repeated calls within one
/// substep do not accumulate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExternalForces {
    pub gravity: Vec3,
    pub wind: Vec3,
    pub control: Vec3,
    pub control_torque: Vec3,
}

impl ExternalForces {
    pub fn total_force(&self) -> Vec3 {
        self.gravity + self.wind + self.control
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Channel on which a body announces its own destruction.
#[derive(Debug, Clone, Default)]
pub struct DestructionNotifier {
    subscribers: Vec<Sender<BodyId>>,
}

impl DestructionNotifier {
    pub fn subscribe(&mut self, sender: Sender<BodyId>) {
        if !self.subscribers.iter().any(|s| s.same_channel(&sender)) {
            self.subscribers.push(sender);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Sends `id` to every live subscriber and drops the disconnected ones.
    pub fn notify(&mut self, id: BodyId) {
        self.subscribers.retain(|s| s.send(id).is_ok());
    }
}

/// Simulated body: pulses, collision geometry in body coordinates,
/// optional capabilities and its destruction channel.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub name: String,
    pub pulses: RigidBodyPulses,
    pub meshes: Vec<CollisionMesh>,
    pub capabilities: Capabilities,
    pub external_forces: ExternalForces,
    pub penetration_class: PenetrationClass,
    pub destruction: DestructionNotifier,
    world_meshes: Vec<CollisionMesh>,
    world_aabb: Aabb,
}

impl RigidBody {
    pub fn new(name: impl Into<String>, mass: f32, inertia: Mat3, pose: Pose) -> Self {
        let mut body = Self {
            name: name.into(),
            pulses: RigidBodyPulses::new(mass, inertia, Vec3::ZERO, pose),
            meshes: Vec::new(),
            capabilities: Capabilities::default(),
            external_forces: ExternalForces::default(),
            penetration_class: PenetrationClass::Standard,
            destruction: DestructionNotifier::default(),
            world_meshes: Vec::new(),
            world_aabb: Aabb::empty(),
        };
        body.refresh_world_meshes();
        body
    }

    /// Immovable body, e.g. a rail or platform placed in the scene.
    pub fn fixed(name: impl Into<String>, pose: Pose) -> Self {
        let mut body = Self::new(name, 1.0, Mat3::IDENTITY, pose);
        body.pulses = RigidBodyPulses::fixed(pose);
        body
    }

    /// Adds a collision batch in body coordinates. Bodies carrying bullet
    /// lines are promoted to [`PenetrationClass::BulletLine`].
    pub fn with_mesh(mut self, mesh: CollisionMesh) -> Self {
        if mesh.has_bullet_lines() {
            self.penetration_class = PenetrationClass::BulletLine;
        }
        self.meshes.push(mesh);
        self.refresh_world_meshes();
        self
    }

    pub fn with_center_of_mass(mut self, com: Vec3) -> Self {
        let pose = self.pulses.pose();
        self.pulses.com = com;
        self.pulses.set_pose(pose);
        self
    }

    pub fn with_vehicle(mut self, vehicle: Vehicle) -> Self {
        self.capabilities.vehicle = Some(vehicle);
        self.refresh_world_meshes();
        self
    }

    pub fn with_damageable(mut self, damageable: Damageable) -> Self {
        self.capabilities.damageable = Some(damageable);
        self
    }

    pub fn with_grinder(mut self, grinder: Grinder) -> Self {
        self.capabilities.grinder = Some(grinder);
        self
    }

    pub fn with_penetration_class(mut self, class: PenetrationClass) -> Self {
        self.penetration_class = class;
        self
    }

    pub fn with_velocity(mut self, v: Vec3, w: Vec3) -> Self {
        self.pulses.v_com = v;
        self.pulses.w = w;
        self
    }

    pub fn is_static(&self) -> bool {
        self.pulses.is_static()
    }

    pub fn pose(&self) -> Pose {
        self.pulses.pose()
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.pulses.set_pose(pose);
        self.refresh_world_meshes();
    }

    pub fn vehicle(&self) -> Option<&Vehicle> {
        self.capabilities.vehicle.as_ref()
    }

    pub fn vehicle_mut(&mut self) -> Option<&mut Vehicle> {
        self.capabilities.vehicle.as_mut()
    }

    /// Collision batches placed at the pose of the last refresh.
    pub fn world_meshes(&self) -> &[CollisionMesh] {
        &self.world_meshes
    }

    /// Bounds of the placed geometry, including tire suspension rays.
    pub fn world_aabb(&self) -> Aabb {
        self.world_aabb
    }

    /// Largest distance of any primitive bound from the body origin.
    pub fn characteristic_length(&self) -> f32 {
        let mut bounds = Aabb::empty();
        for mesh in &self.meshes {
            bounds.merge(&mesh.aabb());
        }
        if bounds.is_empty() {
            1.0
        } else {
            bounds.min.abs().max(bounds.max.abs()).length() as f32
        }
    }

    /// Places the collision geometry at the current pose.
    pub fn refresh_world_meshes(&mut self) {
        let pose = self.pulses.pose();
        self.world_meshes.clear();
        self.world_meshes
            .extend(self.meshes.iter().map(|mesh| mesh.transformed(&pose)));
        let mut bounds = Aabb::empty();
        for mesh in &self.world_meshes {
            bounds.merge(&mesh.aabb());
        }
        if let Some(vehicle) = self.capabilities.vehicle.as_ref() {
            for ray in vehicle.tire_rays(&pose) {
                bounds.extend(ray.origin);
                bounds.extend(ray.origin + (ray.direction * ray.length).as_dvec3());
            }
        }
        if bounds.is_empty() {
            bounds = Aabb::from_sphere(self.pulses.abs_com, 0.0);
        }
        self.world_aabb = bounds;
    }

    /// Bounds swept over one fixed step at the current velocity.
    pub fn swept_aabb(&self, dt: f32, padding: f64) -> Aabb {
        let mut bounds = self.world_aabb.padded(padding);
        let travel: DVec3 = (self.pulses.v_com * dt).as_dvec3();
        bounds.merge(&Aabb::new(bounds.min + travel, bounds.max + travel));
        bounds
    }

    /// Derives the penetration limits from the configuration and the body size.
    pub fn apply_config(&mut self, config: &PhysicsEngineConfig) {
        self.pulses.penetration_limits =
            PenetrationLimits::new(config.max_penetration, self.characteristic_length());
    }

    /// Moves the accumulated external forces into the pulses.
    pub fn apply_external_forces(&mut self, gravity: Vec3) {
        self.pulses
            .apply_central_force(self.external_forces.total_force());
        self.pulses.apply_torque(self.external_forces.control_torque);
        if let Some(vehicle) = self.capabilities.vehicle.as_ref() {
            let pose = self.pulses.pose();
            for (force, position) in vehicle.rotor_forces(&pose, gravity) {
                self.pulses.apply_force(force, position);
            }
        }
    }

    /// Reinitializes force-model state after a (re)spawn.
    pub fn notify_reset(&mut self, _config: &PhysicsEngineConfig, phase: &PhysicsPhase<'_>) {
        self.pulses.clear_forces();
        self.pulses.begin_substep();
        self.external_forces.clear();
        if let Some(vehicle) = self.capabilities.vehicle.as_mut() {
            vehicle.notify_reset();
            if phase.burn_in {
                vehicle.engines_off();
            }
        }
        if let Some(damageable) = self.capabilities.damageable.as_mut() {
            damageable.reset();
        }
        self.refresh_world_meshes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{InertiaTensorExt, PhysicsMaterial};
    use crate::core::mesh::{CollisionLine, CollisionSphere};
    use crossbeam_channel::unbounded;

    #[test]
    fn bullet_lines_promote_penetration_class() {
        let body = RigidBody::new("bullet", 0.01, Mat3::for_solid_sphere(0.01, 0.01), Pose::default())
            .with_mesh(CollisionMesh::new("trace").with_line(CollisionLine::new(
                DVec3::ZERO,
                DVec3::new(0.0, 0.0, -0.5),
                PhysicsMaterial::bullet(),
            )));
        assert_eq!(body.penetration_class, PenetrationClass::BulletLine);
    }

    #[test]
    fn world_meshes_follow_pose() {
        let mut body = RigidBody::new("ball", 1.0, Mat3::for_solid_sphere(1.0, 1.0), Pose::default())
            .with_mesh(CollisionMesh::new("hull").with_sphere(CollisionSphere::new(
                DVec3::ZERO,
                1.0,
                PhysicsMaterial::default(),
            )));
        body.set_pose(Pose::from_position(DVec3::new(5.0, 0.0, 0.0)));
        assert_eq!(body.world_meshes()[0].spheres[0].center, DVec3::new(5.0, 0.0, 0.0));
        assert!(body.world_aabb().contains_point(DVec3::new(5.5, 0.0, 0.0)));
    }

    #[test]
    fn destruction_reaches_subscribers() {
        let (tx, rx) = unbounded();
        let mut notifier = DestructionNotifier::default();
        notifier.subscribe(tx.clone());
        notifier.subscribe(tx);
        assert_eq!(notifier.subscriber_count(), 1);
        let id = BodyId::new(3, 1);
        notifier.notify(id);
        assert_eq!(rx.try_recv(), Ok(id));
    }
}
