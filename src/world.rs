use std::time::Instant;

use crate::{
    collision::{
        contact::{relative_velocity, ContactSet},
        detect::{Candidate, Detector},
        observer::{CollisionEvent, CollisionObserver, CollisionResponse, DamageEvent, ObserverList},
        queries::{Raycast, RaycastHit, RaycastQuery},
        rails::{PermanentContacts, RailContacts},
        static_geometry::StaticGeometry,
    },
    config::PhysicsEngineConfig,
    core::{mesh::CollisionMesh, rigidbody::RigidBody, static_world::StaticWorld, types::Pose},
    debug::{Beacon, DebugContext},
    dynamics::{
        forces::{ControlInput, ControlProvider, ExternalForceProvider, ForceRegistry, GravityProvider},
        grouping::{CollisionGroup, CollisionGrouper, PhysicsPhase},
        integrator::Integrator,
        solver::ConstraintSolver,
    },
    error::{ConfigError, FatalInvariantViolation, GeometryError, PhysicsResult},
    utils::{
        allocator::{Arena, BodyId},
        logging::ScopedTimer,
        profiling::{Accumulate, StepProfile},
    },
};
use glam::Vec3;

/// Central simulation container: bodies, static scene and the substep
/// scheduler.
pub struct PhysicsEngine {
    config: PhysicsEngineConfig,
    bodies: Arena<RigidBody>,
    geometry: StaticGeometry,
    world: StaticWorld,
    force_registry: ForceRegistry,
    controls: ControlProvider,
    rails: RailContacts,
    observers: ObserverList,
    grouper: CollisionGrouper,
    integrator: Integrator,
    solver: ConstraintSolver,
    contacts: ContactSet,
    profile: StepProfile,
    parallel_enabled: bool,
    burned_in: bool,
    frame: u64,
}

impl PhysicsEngine {
    /// Validates `config` and creates an empty scene with gravity enabled.
    pub fn new(config: PhysicsEngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut force_registry = ForceRegistry::new();
        force_registry.add_provider(GravityProvider);
        Ok(Self {
            solver: ConstraintSolver::from_config(&config),
            config,
            bodies: Arena::new(),
            geometry: StaticGeometry::new(),
            world: StaticWorld::default(),
            force_registry,
            controls: ControlProvider::new(),
            rails: RailContacts::new(),
            observers: ObserverList::new(),
            grouper: CollisionGrouper::new(),
            integrator: Integrator::new(),
            contacts: ContactSet::new(),
            profile: StepProfile::default(),
            parallel_enabled: cfg!(feature = "parallel"),
            burned_in: false,
            frame: 0,
        })
    }

    pub fn config(&self) -> &PhysicsEngineConfig {
        &self.config
    }

    pub fn static_world(&self) -> &StaticWorld {
        &self.world
    }

    /// Replaces the environment snapshot. The simulation time is kept.
    pub fn set_static_world(&mut self, world: StaticWorld) {
        let time = self.world.time;
        self.world = StaticWorld { time, ..world };
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.world.gravity = gravity;
    }

    pub fn set_parallel_enabled(&mut self, enabled: bool) {
        self.parallel_enabled = enabled && cfg!(feature = "parallel");
    }

    pub fn parallel_enabled(&self) -> bool {
        self.parallel_enabled
    }

    pub fn add_body(&mut self, mut body: RigidBody) -> BodyId {
        body.apply_config(&self.config);
        body.refresh_world_meshes();
        let id = self.bodies.insert(body);
        log::debug!("added body {id:?}");
        id
    }

    /// Removes a body and announces its destruction to every subscriber.
    pub fn remove_body(&mut self, id: BodyId) -> Option<RigidBody> {
        let mut body = self.bodies.remove(id)?;
        body.destruction.notify(id);
        self.controls.remove(id);
        log::debug!("removed body {id:?} ({})", body.name);
        Some(body)
    }

    pub fn body(&self, id: BodyId) -> Option<&RigidBody> {
        self.bodies.get(id)
    }

    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        self.bodies.get_mut(id)
    }

    pub fn bodies(&self) -> &Arena<RigidBody> {
        &self.bodies
    }

    /// Adds a static batch in world coordinates, validated under the
    /// configured normal-vector policy.
    pub fn add_static_mesh(&mut self, mesh: CollisionMesh) -> Result<usize, GeometryError> {
        self.geometry
            .add_mesh(mesh, self.config.normal_vector_error_behavior)
    }

    pub fn remove_static_mesh(&mut self, handle: usize) -> Option<CollisionMesh> {
        self.geometry.remove_mesh(handle)
    }

    pub fn static_geometry(&self) -> &StaticGeometry {
        &self.geometry
    }

    pub fn add_provider<P: ExternalForceProvider + 'static>(&mut self, provider: P) {
        self.force_registry.add_provider(provider);
    }

    pub fn set_controls(&mut self, id: BodyId, input: ControlInput) {
        self.controls.set(id, input);
    }

    pub fn add_observer<O: CollisionObserver + 'static>(&mut self, observer: O) {
        self.observers.add(observer);
    }

    pub fn rails(&self) -> &RailContacts {
        &self.rails
    }

    pub fn profile(&self) -> &StepProfile {
        &self.profile
    }

    pub fn is_burned_in(&self) -> bool {
        self.burned_in
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Settles the scene for `duration` seconds of simulated time with
    /// engines off, no damage, no grinds and no observer notifications.
    /// Angular velocities are zeroed during the first half.
    pub fn burn_in(&mut self, duration: f32) -> PhysicsResult<()> {
        log::info!("burn-in for {duration} s");
        let mut time = 0.0;
        while time < duration {
            self.step(true, None)?;
            if time < duration / 2.0 {
                for (_, body) in self.bodies.iter_mut() {
                    body.pulses.w = Vec3::ZERO;
                }
            }
            time += self.config.dt;
        }
        self.burned_in = true;
        log::info!("burn-in finished");
        Ok(())
    }

    /// Advances the scene by exactly one fixed step. The first call runs
    /// the burn-in.
    pub fn advance_time(
        &mut self,
        dt: f32,
        time: f64,
        mut debug: Option<&mut DebugContext>,
    ) -> PhysicsResult<()> {
        if (dt - self.config.dt).abs() > self.config.dt * 1e-4 {
            return Err(ConfigError::InvalidValue {
                field: "dt",
                reason: format!("advance_time expects the fixed step {}, got {dt}", self.config.dt),
            }
            .into());
        }
        if !self.burned_in {
            self.burn_in(self.config.burn_in_duration)?;
        }
        self.world.time = time;
        self.step(false, debug.as_deref_mut())?;
        for (_, body) in self.bodies.iter_mut() {
            if let Some(vehicle) = body.vehicle_mut() {
                vehicle.advance_time(dt);
            }
        }
        self.frame += 1;
        Ok(())
    }

    /// Reinitializes the force-model state of a (re)spawned body and ends
    /// its grind.
    pub fn notify_reset(&mut self, id: BodyId, burn_in: bool) -> PhysicsResult<()> {
        let body = self
            .bodies
            .get_mut(id)
            .ok_or(FatalInvariantViolation::StaleHandle { body: id })?;
        let class = body.penetration_class;
        let nsubsteps = self.config.substeps(class);
        let group = CollisionGroup {
            penetration_class: class,
            nsubsteps,
            divider: self.config.bullet_line_substeps / nsubsteps,
            bodies: vec![id],
        };
        body.notify_reset(&self.config, &PhysicsPhase::new(burn_in, 0, &group));
        self.rails.release(id);
        Ok(())
    }

    /// Places a body at `pose` at rest and resets it.
    pub fn respawn(&mut self, id: BodyId, pose: Pose) -> PhysicsResult<()> {
        let body = self
            .bodies
            .get_mut(id)
            .ok_or(FatalInvariantViolation::StaleHandle { body: id })?;
        body.pulses.v_com = Vec3::ZERO;
        body.pulses.w = Vec3::ZERO;
        body.set_pose(pose);
        self.notify_reset(id, false)
    }

    /// Nearest hit with the static scene or any body.
    pub fn raycast(
        &self,
        origin: glam::DVec3,
        direction: glam::DVec3,
        max_distance: f64,
    ) -> Result<Option<RaycastHit>, GeometryError> {
        let behavior = self.config.normal_vector_error_behavior;
        let mut best = self
            .geometry
            .raycast(origin, direction, max_distance, behavior)?;
        let Some(query) = RaycastQuery::new(origin, direction, max_distance) else {
            return Ok(best);
        };
        for (id, body) in self.bodies.iter() {
            if body
                .world_aabb()
                .ray_entry(query.origin, query.direction, query.max_distance)
                .is_none()
            {
                continue;
            }
            for (index, mesh) in body.world_meshes().iter().enumerate() {
                let hit = Raycast::cast_mesh(&query, mesh, index as u32, behavior)?
                    .map(|h| RaycastHit { body: Some(id), ..h });
                best = Raycast::nearest(best, hit);
            }
        }
        Ok(best)
    }

    fn step(&mut self, burn_in: bool, mut debug: Option<&mut DebugContext>) -> PhysicsResult<()> {
        let _timer = ScopedTimer::new("physics step");
        let start = Instant::now();
        self.profile.reset();
        self.profile.body_count = self.bodies.len();

        let released = self.rails.process_destructions();
        if released > 0 {
            log::debug!("{released} grind(s) ended by destruction");
        }

        let groups = {
            let _timer = ScopedTimer::new("collision grouping");
            let _time = Accumulate::new(&mut self.profile.grouping_time);
            let links = self.rails.links();
            self.grouper
                .build_groups(&self.config, &self.bodies, &links)?
                .to_vec()
        };
        self.profile.group_count = groups.len();

        let static_bodies: Vec<BodyId> = self
            .bodies
            .iter()
            .filter(|(_, body)| body.is_static())
            .map(|(id, _)| id)
            .collect();

        for group in &groups {
            for substep in 0..group.nsubsteps {
                let phase = PhysicsPhase::new(burn_in, substep, group);
                self.substep(&phase, &static_bodies, debug.as_deref_mut())?;
            }
            self.profile.substep_count += group.nsubsteps;
        }

        self.profile.total_time = start.elapsed();
        self.profile.report();
        Ok(())
    }

    fn substep(
        &mut self,
        phase: &PhysicsPhase<'_>,
        static_bodies: &[BodyId],
        mut debug: Option<&mut DebugContext>,
    ) -> PhysicsResult<()> {
        let group = phase.group;
        let dt = group.substep_dt(self.config.dt);

        for &id in &group.bodies {
            if let Some(body) = self.bodies.get_mut(id) {
                body.pulses.begin_substep();
            }
        }
        self.force_registry.increment_all(
            &mut self.bodies,
            &group.bodies,
            phase.burn_in,
            &self.config,
            &self.world,
        );
        self.controls.increment_external_forces(
            &mut self.bodies,
            &group.bodies,
            phase.burn_in,
            &self.config,
            &self.world,
        );
        self.integrator
            .integrate_velocity(&mut self.bodies, &group.bodies, self.world.gravity, dt);

        self.contacts.clear();
        self.rails
            .extend_contact_infos(&self.config, &self.bodies, group, &mut self.contacts);

        let candidates = {
            let _timer = ScopedTimer::new("collision detection");
            let _time = Accumulate::new(&mut self.profile.detection_time);
            Detector {
                config: &self.config,
                bodies: &self.bodies,
                geometry: &self.geometry,
                static_bodies,
                rails: &self.rails,
            }
            .detect_group(group, self.parallel_enabled)?
        };
        self.accept_candidates(candidates, phase, debug.as_deref_mut())?;
        self.profile.contact_count += self.contacts.len();

        {
            let _timer = ScopedTimer::new("contact solver");
            let _time = Accumulate::new(&mut self.profile.solver_time);
            let metrics = self
                .solver
                .solve(&mut self.bodies, &mut self.contacts, &self.config, dt)?;
            self.profile.solver.merge(&metrics);
        }
        if !phase.burn_in {
            self.report_impacts(phase, debug)?;
        }

        let _timer = ScopedTimer::new("integrator");
        let _time = Accumulate::new(&mut self.profile.integrator_time);
        self.integrator
            .integrate_position(&mut self.bodies, &group.bodies, dt)?;
        Ok(())
    }

    fn in_scope(&self, group: &CollisionGroup, id: BodyId) -> bool {
        group.contains(id) || self.bodies.get(id).is_some_and(RigidBody::is_static)
    }

    /// Turns detection results into constraints. Observers may veto surface
    /// contacts; grinds start only after burn-in.
    fn accept_candidates(
        &mut self,
        candidates: Vec<Candidate>,
        phase: &PhysicsPhase<'_>,
        mut debug: Option<&mut DebugContext>,
    ) -> Result<(), FatalInvariantViolation> {
        let group = phase.group;
        for candidate in candidates {
            match candidate {
                Candidate::Surface { point, material } => {
                    for id in std::iter::once(point.body).chain(point.other) {
                        if !self.in_scope(group, id) {
                            return Err(FatalInvariantViolation::BodyNotInGroup { body: id });
                        }
                    }
                    if !phase.burn_in && !self.observers.is_empty() {
                        let event = CollisionEvent {
                            body: point.body,
                            other: point.other,
                            position: point.position,
                            normal: point.normal,
                            overlap: point.overlap,
                            relative_velocity: relative_velocity(
                                &self.bodies,
                                point.body,
                                point.other,
                                point.position,
                            )
                            .unwrap_or(Vec3::ZERO),
                        };
                        if self.observers.notify_collision(&event) == CollisionResponse::Abort {
                            continue;
                        }
                    }
                    self.contacts.push_surface(point, material);
                }
                Candidate::Tire {
                    point,
                    tire,
                    compression,
                    suspension_length,
                    forward,
                    material,
                } => {
                    if let Some(t) = self
                        .bodies
                        .get_mut(point.body)
                        .and_then(RigidBody::vehicle_mut)
                        .and_then(|v| v.tires.get_mut(tire))
                    {
                        t.shock_absorber.set_compression(compression);
                        t.ground_contact = true;
                    }
                    if phase.is_last_substep() {
                        if let Some(debug) = debug.as_deref_mut() {
                            debug.push(Beacon::new(point.position, Beacon::TIRE));
                        }
                    }
                    self.contacts.push_tire(
                        point,
                        tire,
                        compression,
                        suspension_length,
                        forward,
                        material,
                    );
                }
                Candidate::Airborne { body, tire } => {
                    if let Some(t) = self
                        .bodies
                        .get_mut(body)
                        .and_then(RigidBody::vehicle_mut)
                        .and_then(|v| v.tires.get_mut(tire))
                    {
                        t.shock_absorber.set_airborne();
                        t.ground_contact = false;
                    }
                }
                Candidate::Grind { body, info } => {
                    if phase.burn_in {
                        continue;
                    }
                    if let Some(debug) = debug.as_deref_mut() {
                        debug.push(Beacon::new(info.point, Beacon::GRIND));
                    }
                    self.rails.register(body, info, &mut self.bodies);
                }
            }
        }
        Ok(())
    }

    /// Delivers resolved impacts to observers and applies damage.
    fn report_impacts(
        &mut self,
        phase: &PhysicsPhase<'_>,
        mut debug: Option<&mut DebugContext>,
    ) -> Result<(), FatalInvariantViolation> {
        for impact in self.contacts.impacts() {
            self.observers.notify_impact(&impact);
            if phase.is_last_substep() {
                if let Some(debug) = debug.as_deref_mut() {
                    debug.push(Beacon::new(impact.position, Beacon::CONTACT));
                }
            }
            let sides = [
                Some((impact.body, impact.other)),
                impact.other.map(|other| (other, Some(impact.body))),
            ];
            for (id, other) in sides.into_iter().flatten() {
                let Some(damageable) = self
                    .bodies
                    .get_mut(id)
                    .and_then(|b| b.capabilities.damageable.as_mut())
                else {
                    continue;
                };
                if let Some(damage) = damageable.absorb_impulse(impact.impulse) {
                    let event = DamageEvent {
                        body: id,
                        other,
                        damage,
                        health: damageable.health,
                        destroyed: damageable.is_destroyed(),
                    };
                    self.observers.notify_damage(&event);
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for PhysicsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsEngine")
            .field("config", &self.config)
            .field("bodies", &self.bodies.len())
            .field("static_primitives", &self.geometry.len())
            .field("grinds", &self.rails.len())
            .field("frame", &self.frame)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mesh::CollisionSphere;
    use crate::core::types::{InertiaTensorExt, PhysicsMaterial};
    use glam::{DVec3, Mat3};

    fn ball(y: f64) -> RigidBody {
        RigidBody::new(
            "ball",
            1.0,
            Mat3::for_solid_sphere(0.5, 1.0),
            Pose::from_position(DVec3::new(0.0, y, 0.0)),
        )
        .with_mesh(CollisionMesh::new("hull").with_sphere(CollisionSphere::new(
            DVec3::ZERO,
            0.5,
            PhysicsMaterial::default(),
        )))
    }

    fn engine() -> PhysicsEngine {
        let mut engine = PhysicsEngine::new(PhysicsEngineConfig {
            burn_in_duration: 0.0,
            ..Default::default()
        })
        .unwrap();
        engine
            .add_static_mesh(CollisionMesh::ground(50.0, 0.0, PhysicsMaterial::asphalt()))
            .unwrap();
        engine
    }

    #[test]
    fn ball_comes_to_rest_on_ground() {
        let mut engine = engine();
        let id = engine.add_body(ball(2.0));
        let dt = engine.config().dt;
        for frame in 0..240 {
            engine.advance_time(dt, f64::from(frame) * f64::from(dt), None).unwrap();
        }
        let body = engine.body(id).unwrap();
        let y = body.pose().position.y;
        assert!(y > 0.4 && y < 0.55, "ball rests at y = {y}");
        assert!(body.pulses.v_com.length() < 0.05);
    }

    #[test]
    fn variable_dt_is_rejected() {
        let mut engine = engine();
        let err = engine.advance_time(0.02, 0.0, None).unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn removed_body_handle_is_stale() {
        let mut engine = engine();
        let id = engine.add_body(ball(2.0));
        assert!(engine.remove_body(id).is_some());
        assert!(engine.body(id).is_none());
        let err = engine.notify_reset(id, false).unwrap_err();
        assert!(err.is_fatal());
    }
}
