//! Contact constraints of one substep.
//!
//! Detection turns candidates into [`ContactInfo`]s collected in a
//! [`ContactSet`]. Every constraint keeps its accumulated impulse (lambda)
//! so that repeated solver passes refine rather than stack impulses. Normal
//! impulses are mirrored into [`ContactSet::normal_impulses`] where the
//! friction and tire constraints of the same contact point read their load.
//!
//! Normals point from `other` towards `body`; a positive normal impulse
//! pushes `body` along the normal and `other` the opposite way. `other ==
//! None` stands for the static world.

use glam::{DVec3, Vec2, Vec3};

use crate::config::{PhysicsEngineConfig, ResolveCollisionType};
use crate::core::rigidbody::RigidBody;
use crate::core::types::ContactMaterial;
use crate::dynamics::tire::Tire;
use crate::error::FatalInvariantViolation;
use crate::utils::allocator::{Arena, BodyId};
use crate::utils::math::project_onto_plane;

/// Geometry of one contact point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    pub body: BodyId,
    pub other: Option<BodyId>,
    pub position: DVec3,
    /// Unit normal from `other` towards `body`. Zero under the `zero`
    /// normal-vector policy, in which case the contact applies nothing.
    pub normal: Vec3,
    pub overlap: f32,
}

/// Resolved normal impulse of a contact, reported to observers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Impact {
    pub body: BodyId,
    pub other: Option<BodyId>,
    pub position: DVec3,
    pub normal: Vec3,
    /// Accumulated normal impulse (N·s).
    pub impulse: f32,
}

/// Per-pass solver parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverContext {
    /// Substep length.
    pub dt: f32,
    pub iteration: usize,
    pub niterations: usize,
    pub relaxation: f32,
    pub resolve: ResolveCollisionType,
    pub beta: f32,
    pub slop: f32,
    pub lambda_max: f32,
    pub max_impulse: f32,
    pub penalty_stiffness: f32,
    pub penalty_damping: f32,
    pub grind_beta: f32,
    pub tire_min_velocity: f32,
}

impl SolverContext {
    pub fn new(config: &PhysicsEngineConfig, dt: f32) -> Self {
        Self {
            dt,
            iteration: 0,
            niterations: config.solver_iterations.max(1),
            relaxation: 1.0,
            resolve: config.resolve_collision_type,
            beta: config.contact_beta,
            slop: config.contact_slop,
            lambda_max: config.lambda_max,
            max_impulse: config.max_impulse,
            penalty_stiffness: config.penalty_stiffness,
            penalty_damping: config.penalty_damping,
            grind_beta: config.grind_beta,
            tire_min_velocity: config.tire_min_velocity,
        }
    }

    /// The first pass is under-relaxed so that contacts solved early do not
    /// dominate the ones solved late.
    pub fn begin_iteration(&mut self, iteration: usize) {
        self.iteration = iteration;
        self.relaxation = if iteration == 0 { 0.2 } else { 1.0 };
    }
}

/// Relative velocity of `body` with respect to `other` at `position`.
pub fn relative_velocity(
    bodies: &Arena<RigidBody>,
    body: BodyId,
    other: Option<BodyId>,
    position: DVec3,
) -> Option<Vec3> {
    let v = bodies.get(body)?.pulses.velocity_at_position(position);
    match other {
        Some(other) => Some(v - bodies.get(other)?.pulses.velocity_at_position(position)),
        None => Some(v),
    }
}

struct BodyPair<'a> {
    body: &'a mut RigidBody,
    other: Option<&'a mut RigidBody>,
}

impl<'a> BodyPair<'a> {
    fn fetch(
        bodies: &'a mut Arena<RigidBody>,
        body: BodyId,
        other: Option<BodyId>,
    ) -> Result<Self, FatalInvariantViolation> {
        match other {
            None => {
                let body = bodies
                    .get_mut(body)
                    .ok_or(FatalInvariantViolation::StaleHandle { body })?;
                Ok(Self { body, other: None })
            }
            Some(other) => {
                for id in [body, other] {
                    if !bodies.contains(id) {
                        return Err(FatalInvariantViolation::StaleHandle { body: id });
                    }
                }
                let (body, other) = bodies
                    .get2_mut(body, other)
                    .ok_or(FatalInvariantViolation::StaleHandle { body })?;
                Ok(Self {
                    body,
                    other: Some(other),
                })
            }
        }
    }

    fn velocity(&self, position: DVec3) -> Vec3 {
        let v = self.body.pulses.velocity_at_position(position);
        match self.other.as_deref() {
            Some(other) => v - other.pulses.velocity_at_position(position),
            None => v,
        }
    }

    fn inverse_mass(&self, position: DVec3, direction: Vec3) -> f32 {
        self.body.pulses.inverse_effective_mass(position, direction)
            + self
                .other
                .as_deref()
                .map_or(0.0, |o| o.pulses.inverse_effective_mass(position, direction))
    }

    fn apply(
        &mut self,
        impulse: Vec3,
        position: DVec3,
        ctx: &SolverContext,
    ) -> Result<(), FatalInvariantViolation> {
        let magnitude = impulse.length();
        if !magnitude.is_finite() || magnitude > ctx.max_impulse {
            return Err(FatalInvariantViolation::ImpulseTooLarge { magnitude });
        }
        self.body.pulses.integrate_impulse(impulse, position, ctx.dt);
        if let Some(other) = self.other.as_deref_mut() {
            other.pulses.integrate_impulse(-impulse, position, ctx.dt);
        }
        Ok(())
    }
}

/// An impulse this many times `lambda_max` means the solver diverged.
const LAMBDA_DIVERGENCE_FACTOR: f32 = 1e3;

fn checked(ctx: &SolverContext, lambda: f32) -> Result<f32, FatalInvariantViolation> {
    if lambda.is_finite() && lambda.abs() <= ctx.lambda_max * LAMBDA_DIVERGENCE_FACTOR {
        Ok(lambda)
    } else {
        Err(FatalInvariantViolation::LambdaOutOfRange { lambda })
    }
}

/// Non-penetration constraint (plane inequality).
#[derive(Debug, Clone, PartialEq)]
pub struct NormalContact {
    pub point: ContactPoint,
    pub material: ContactMaterial,
    pub slot: usize,
    pub lambda: f32,
    initial_vn: f32,
}

impl NormalContact {
    pub fn new(point: ContactPoint, material: ContactMaterial, slot: usize) -> Self {
        Self {
            point,
            material,
            slot,
            lambda: 0.0,
            initial_vn: 0.0,
        }
    }

    /// Relative normal velocity, positive when separating.
    pub fn normal_velocity(&self, bodies: &Arena<RigidBody>) -> Option<f32> {
        relative_velocity(bodies, self.point.body, self.point.other, self.point.position)
            .map(|v| v.dot(self.point.normal))
    }

    fn prepare(&mut self, bodies: &Arena<RigidBody>) {
        self.lambda = 0.0;
        self.initial_vn = self.normal_velocity(bodies).unwrap_or(0.0);
    }

    fn solve(
        &mut self,
        bodies: &mut Arena<RigidBody>,
        ctx: &SolverContext,
        normal_impulses: &mut [f32],
    ) -> Result<(), FatalInvariantViolation> {
        let n = self.point.normal;
        if n == Vec3::ZERO {
            return Ok(());
        }
        let p = self.point.position;
        let mut pair = BodyPair::fetch(bodies, self.point.body, self.point.other)?;
        let k = pair.inverse_mass(p, n);
        if k <= 0.0 {
            return Ok(());
        }
        let vn = pair.velocity(p).dot(n);

        let new_lambda = match ctx.resolve {
            ResolveCollisionType::Penalty => {
                if ctx.iteration > 0 {
                    return Ok(());
                }
                let force = (ctx.penalty_stiffness * self.point.overlap - ctx.penalty_damping * vn)
                    .max(0.0)
                    / k;
                checked(ctx, force * ctx.dt)?.min(ctx.lambda_max)
            }
            ResolveCollisionType::SequentialPulses => {
                let bias = ctx.beta / ctx.dt * (self.point.overlap - ctx.slop).max(0.0);
                let target = bias.max(-self.material.restitution * self.initial_vn);
                let delta = checked(ctx, ctx.relaxation * (target - vn) / k)?;
                (self.lambda + delta).clamp(0.0, ctx.lambda_max)
            }
        };

        let applied = new_lambda - self.lambda;
        self.lambda = new_lambda;
        if let Some(slot) = normal_impulses.get_mut(self.slot) {
            *slot = new_lambda;
        }
        pair.apply(n * applied, p, ctx)
    }
}

/// Coulomb friction with separate static and sliding coefficients. Once the
/// accumulated tangential impulse leaves the stiction cone it is rescaled
/// onto the sliding cone.
#[derive(Debug, Clone, PartialEq)]
pub struct FrictionContact {
    pub point: ContactPoint,
    pub material: ContactMaterial,
    pub normal_slot: usize,
    pub lambda: Vec3,
}

impl FrictionContact {
    pub fn new(point: ContactPoint, material: ContactMaterial, normal_slot: usize) -> Self {
        Self {
            point,
            material,
            normal_slot,
            lambda: Vec3::ZERO,
        }
    }

    fn solve(
        &mut self,
        bodies: &mut Arena<RigidBody>,
        ctx: &SolverContext,
        normal_impulses: &[f32],
    ) -> Result<(), FatalInvariantViolation> {
        let n = self.point.normal;
        if n == Vec3::ZERO {
            return Ok(());
        }
        let p = self.point.position;
        let mut pair = BodyPair::fetch(bodies, self.point.body, self.point.other)?;
        let lambda_n = normal_impulses.get(self.normal_slot).copied().unwrap_or(0.0);

        let mut new_lambda = self.lambda;
        if lambda_n <= 0.0 {
            new_lambda = Vec3::ZERO;
        } else {
            let vt = project_onto_plane(pair.velocity(p), n);
            let speed = vt.length();
            if speed > 1e-6 {
                let t = vt / speed;
                let k = pair.inverse_mass(p, t);
                if k > 0.0 {
                    new_lambda -= t * checked(ctx, ctx.relaxation * speed / k)?;
                }
            }
            if new_lambda.length() > self.material.stiction_coefficient * lambda_n {
                new_lambda =
                    new_lambda.normalize_or_zero() * (self.material.friction_coefficient * lambda_n);
            }
        }

        let applied = new_lambda - self.lambda;
        self.lambda = new_lambda;
        pair.apply(applied, p, ctx)
    }
}

/// Suspension force of a wheel, spread evenly over the solver passes.
#[derive(Debug, Clone, PartialEq)]
pub struct ShockAbsorberContact {
    pub point: ContactPoint,
    pub tire: usize,
    pub compression: f32,
    pub normal_slot: usize,
}

impl ShockAbsorberContact {
    fn solve(
        &mut self,
        bodies: &mut Arena<RigidBody>,
        ctx: &SolverContext,
        normal_impulses: &mut [f32],
    ) -> Result<(), FatalInvariantViolation> {
        let n = self.point.normal;
        let p = self.point.position;
        let mut pair = BodyPair::fetch(bodies, self.point.body, self.point.other)?;
        let Some(shock) = pair
            .body
            .vehicle()
            .and_then(|v| v.tires.get(self.tire))
            .map(|t| t.shock_absorber)
        else {
            return Ok(());
        };
        let vn = pair.velocity(p).dot(n);
        let force = shock.force(self.compression, -vn);
        let impulse = checked(ctx, force * ctx.dt / ctx.niterations as f32)?;
        if let Some(slot) = normal_impulses.get_mut(self.normal_slot) {
            *slot += impulse;
        }
        pair.apply(n * impulse, p, ctx)
    }
}

/// Tire patch friction. Both directions are velocity constraints; the
/// magic formula bounds how much impulse the patch transmits, and the
/// lateral bound shrinks with the longitudinal usage (friction ellipse).
#[derive(Debug, Clone, PartialEq)]
pub struct TireContact {
    pub point: ContactPoint,
    pub tire: usize,
    /// Rolling direction including steering, in world coordinates.
    pub forward: Vec3,
    pub material: ContactMaterial,
    pub normal_slot: usize,
    /// Accumulated (longitudinal, lateral) impulse.
    pub lambda: Vec2,
}

impl TireContact {
    fn solve(
        &mut self,
        bodies: &mut Arena<RigidBody>,
        ctx: &SolverContext,
        normal_impulses: &[f32],
    ) -> Result<(), FatalInvariantViolation> {
        let n = self.point.normal;
        let forward = project_onto_plane(self.forward, n).normalize_or_zero();
        if n == Vec3::ZERO || forward == Vec3::ZERO {
            return Ok(());
        }
        let lateral = n.cross(forward);
        let p = self.point.position;
        let mut pair = BodyPair::fetch(bodies, self.point.body, self.point.other)?;
        let v = pair.velocity(p);
        let v_long = v.dot(forward);
        let v_lat = v.dot(lateral);

        let Some(tire) = pair.body.vehicle().and_then(|veh| veh.tires.get(self.tire)) else {
            return Ok(());
        };
        let slip = Vec2::new(
            tire.slip_ratio(v_long, ctx.tire_min_velocity),
            Tire::slip_angle(v_long, v_lat, ctx.tire_min_velocity),
        );
        let lambda_n = normal_impulses.get(self.normal_slot).copied().unwrap_or(0.0).max(0.0);
        let load = self.material.stiction_coefficient * tire.grip * lambda_n;
        let capacity = tire.friction_capacity(slip) * load;
        let slip_speed = tire.surface_speed() - v_long;
        let wheel_k = tire.radius * tire.radius / tire.inertia;

        let mut new_lambda = self.lambda;
        let k_long = pair.inverse_mass(p, forward) + wheel_k;
        if k_long > 0.0 {
            new_lambda.x += checked(ctx, ctx.relaxation * slip_speed / k_long)?;
        }
        new_lambda.x = new_lambda.x.clamp(-capacity.x, capacity.x);

        let k_lat = pair.inverse_mass(p, lateral);
        if k_lat > 0.0 {
            new_lambda.y -= checked(ctx, ctx.relaxation * v_lat / k_lat)?;
        }
        let usage = if capacity.x > 0.0 {
            new_lambda.x / capacity.x
        } else {
            0.0
        };
        let lateral_capacity = capacity.y * (1.0 - usage * usage).max(0.0).sqrt();
        new_lambda.y = new_lambda.y.clamp(-lateral_capacity, lateral_capacity);

        let applied = new_lambda - self.lambda;
        self.lambda = new_lambda;
        pair.apply(forward * applied.x + lateral * applied.y, p, ctx)?;
        if let Some(tire) = pair
            .body
            .vehicle_mut()
            .and_then(|veh| veh.tires.get_mut(self.tire))
        {
            tire.integrate_ground_impulse(applied.x);
            tire.slip = slip;
        }
        Ok(())
    }
}

/// Rail lock: keeps the grind point of `body` on the rail line while
/// leaving motion along the rail free.
#[derive(Debug, Clone, PartialEq)]
pub struct LineContact {
    pub body: BodyId,
    pub rail_body: Option<BodyId>,
    /// Grind point of `body`, in world coordinates.
    pub position: DVec3,
    /// Closest point on the rail.
    pub rail_point: DVec3,
    /// Unit rail direction.
    pub direction: Vec3,
    pub lambda: Vec2,
}

impl LineContact {
    pub fn new(
        body: BodyId,
        rail_body: Option<BodyId>,
        position: DVec3,
        rail_point: DVec3,
        direction: Vec3,
    ) -> Self {
        Self {
            body,
            rail_body,
            position,
            rail_point,
            direction,
            lambda: Vec2::ZERO,
        }
    }

    fn solve(
        &mut self,
        bodies: &mut Arena<RigidBody>,
        ctx: &SolverContext,
    ) -> Result<(), FatalInvariantViolation> {
        let direction = self.direction.normalize_or_zero();
        if direction == Vec3::ZERO {
            return Ok(());
        }
        let mut pair = BodyPair::fetch(bodies, self.body, self.rail_body)?;
        let error = (self.position - self.rail_point).as_vec3();
        let (a1, a2) = direction.any_orthonormal_pair();
        for (i, axis) in [a1, a2].into_iter().enumerate() {
            let k = pair.inverse_mass(self.position, axis);
            if k <= 0.0 {
                continue;
            }
            let v = pair.velocity(self.position).dot(axis);
            let bias = ctx.grind_beta / ctx.dt * error.dot(axis);
            let delta = checked(ctx, -ctx.relaxation * (v + bias) / k)?;
            let new_lambda = (self.lambda[i] + delta).clamp(-ctx.lambda_max, ctx.lambda_max);
            let applied = new_lambda - self.lambda[i];
            self.lambda[i] = new_lambda;
            pair.apply(axis * applied, self.position, ctx)?;
        }
        Ok(())
    }
}

/// One constraint of the current substep.
#[derive(Debug, Clone, PartialEq)]
pub enum ContactInfo {
    Normal(NormalContact),
    Friction(FrictionContact),
    ShockAbsorber(ShockAbsorberContact),
    Tire(TireContact),
    Line(LineContact),
}

impl ContactInfo {
    /// Bodies coupled by the constraint.
    pub fn bodies(&self) -> (BodyId, Option<BodyId>) {
        match self {
            ContactInfo::Normal(c) => (c.point.body, c.point.other),
            ContactInfo::Friction(c) => (c.point.body, c.point.other),
            ContactInfo::ShockAbsorber(c) => (c.point.body, c.point.other),
            ContactInfo::Tire(c) => (c.point.body, c.point.other),
            ContactInfo::Line(c) => (c.body, c.rail_body),
        }
    }

    /// One solver pass over this constraint.
    pub fn solve(
        &mut self,
        bodies: &mut Arena<RigidBody>,
        ctx: &SolverContext,
        normal_impulses: &mut [f32],
    ) -> Result<(), FatalInvariantViolation> {
        match self {
            ContactInfo::Normal(c) => c.solve(bodies, ctx, normal_impulses),
            ContactInfo::Friction(c) => c.solve(bodies, ctx, normal_impulses),
            ContactInfo::ShockAbsorber(c) => c.solve(bodies, ctx, normal_impulses),
            ContactInfo::Tire(c) => c.solve(bodies, ctx, normal_impulses),
            ContactInfo::Line(c) => c.solve(bodies, ctx),
        }
    }
}

/// Constraints of one collision group and substep.
#[derive(Debug, Clone, Default)]
pub struct ContactSet {
    pub contacts: Vec<ContactInfo>,
    /// Accumulated normal impulse per contact point.
    pub normal_impulses: Vec<f32>,
}

impl ContactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.contacts.clear();
        self.normal_impulses.clear();
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContactInfo> {
        self.contacts.iter()
    }

    pub fn push(&mut self, contact: ContactInfo) {
        self.contacts.push(contact);
    }

    pub fn new_normal_slot(&mut self) -> usize {
        self.normal_impulses.push(0.0);
        self.normal_impulses.len() - 1
    }

    /// Non-penetration plus friction at one surface point.
    pub fn push_surface(&mut self, point: ContactPoint, material: ContactMaterial) {
        let slot = self.new_normal_slot();
        self.contacts
            .push(ContactInfo::Normal(NormalContact::new(point, material, slot)));
        self.contacts
            .push(ContactInfo::Friction(FrictionContact::new(point, material, slot)));
    }

    /// Suspension and patch friction of a grounded wheel. A compression
    /// beyond the suspension travel adds a rigid bump stop.
    pub fn push_tire(
        &mut self,
        point: ContactPoint,
        tire: usize,
        compression: f32,
        suspension_length: f32,
        forward: Vec3,
        material: ContactMaterial,
    ) {
        let slot = self.new_normal_slot();
        self.contacts
            .push(ContactInfo::ShockAbsorber(ShockAbsorberContact {
                point,
                tire,
                compression,
                normal_slot: slot,
            }));
        if compression > suspension_length {
            let bump_slot = self.new_normal_slot();
            let bump = ContactPoint {
                overlap: compression - suspension_length,
                ..point
            };
            self.contacts
                .push(ContactInfo::Normal(NormalContact::new(bump, material, bump_slot)));
        }
        self.contacts.push(ContactInfo::Tire(TireContact {
            point,
            tire,
            forward,
            material,
            normal_slot: slot,
            lambda: Vec2::ZERO,
        }));
    }

    /// Resets accumulated impulses and records approach velocities.
    pub fn prepare(&mut self, bodies: &Arena<RigidBody>) {
        self.normal_impulses.iter_mut().for_each(|l| *l = 0.0);
        for contact in &mut self.contacts {
            match contact {
                ContactInfo::Normal(c) => c.prepare(bodies),
                ContactInfo::Friction(c) => c.lambda = Vec3::ZERO,
                ContactInfo::Tire(c) => c.lambda = Vec2::ZERO,
                ContactInfo::Line(c) => c.lambda = Vec2::ZERO,
                ContactInfo::ShockAbsorber(_) => {}
            }
        }
    }

    /// Non-penetration contacts that ended up carrying load.
    pub fn impacts(&self) -> Vec<Impact> {
        self.contacts
            .iter()
            .filter_map(|c| match c {
                ContactInfo::Normal(n) if n.lambda > 0.0 => Some(Impact {
                    body: n.point.body,
                    other: n.point.other,
                    position: n.point.position,
                    normal: n.point.normal,
                    impulse: n.lambda,
                }),
                _ => None,
            })
            .collect()
    }
}
