//! Contact detection for one collision group and substep.
//!
//! Detection only reads the scene. It produces [`Candidate`]s which the
//! scheduler filters (observers, burn-in) before they become constraints.

use glam::Vec3;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    collision::{
        contact::ContactPoint,
        narrowphase::{
            segment_sphere, segment_triangle, sphere_sphere, sphere_triangle, IntersectionInfo,
        },
        queries::{Raycast, RaycastHit, RaycastQuery},
        rails::{GrindInfo, RailContacts},
        static_geometry::{Primitive, StaticGeometry},
    },
    config::{NormalVectorErrorBehavior, PhysicsEngineConfig},
    core::{
        mesh::{Aabb, PrimitiveKind},
        rigidbody::RigidBody,
        types::ContactMaterial,
    },
    dynamics::grouping::CollisionGroup,
    error::GeometryError,
    utils::allocator::{Arena, BodyId},
};

/// Outcome of detection for one contact point, tire or grind point.
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    Surface {
        point: ContactPoint,
        material: ContactMaterial,
    },
    /// Tire ray hitting drivable ground. `point.overlap` is the compression.
    Tire {
        point: ContactPoint,
        tire: usize,
        compression: f32,
        suspension_length: f32,
        forward: Vec3,
        material: ContactMaterial,
    },
    /// Tire ray without ground.
    Airborne { body: BodyId, tire: usize },
    Grind { body: BodyId, info: GrindInfo },
}

/// Read-only view of the scene used by detection.
pub struct Detector<'a> {
    pub config: &'a PhysicsEngineConfig,
    pub bodies: &'a Arena<RigidBody>,
    pub geometry: &'a StaticGeometry,
    /// Immovable bodies; every group collides against them.
    pub static_bodies: &'a [BodyId],
    pub rails: &'a RailContacts,
}

impl<'a> Detector<'a> {
    fn behavior(&self) -> NormalVectorErrorBehavior {
        self.config.normal_vector_error_behavior
    }

    /// Candidates of every member of `group`, in member order, followed by
    /// the contacts between members.
    pub fn detect_group(
        &self,
        group: &CollisionGroup,
        parallel: bool,
    ) -> Result<Vec<Candidate>, GeometryError> {
        let per_body = self.detect_bodies(&group.bodies, parallel)?;
        let mut candidates: Vec<Candidate> = per_body.into_iter().flatten().collect();

        for (i, &a) in group.bodies.iter().enumerate() {
            for &b in &group.bodies[i + 1..] {
                self.detect_pair(a, b, &mut candidates)?;
            }
        }
        Ok(candidates)
    }

    #[cfg(feature = "parallel")]
    fn detect_bodies(
        &self,
        ids: &[BodyId],
        parallel: bool,
    ) -> Result<Vec<Vec<Candidate>>, GeometryError> {
        if parallel {
            ids.par_iter().map(|&id| self.detect_body(id)).collect()
        } else {
            ids.iter().map(|&id| self.detect_body(id)).collect()
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn detect_bodies(
        &self,
        ids: &[BodyId],
        _parallel: bool,
    ) -> Result<Vec<Vec<Candidate>>, GeometryError> {
        ids.iter().map(|&id| self.detect_body(id)).collect()
    }

    /// Contacts of one body with the static scene, its tires and grind point.
    pub fn detect_body(&self, id: BodyId) -> Result<Vec<Candidate>, GeometryError> {
        let mut out = Vec::new();
        let Some(body) = self.bodies.get(id) else {
            return Ok(out);
        };
        self.detect_static_geometry(id, body, &mut out)?;
        for &static_id in self.static_bodies {
            if static_id != id {
                self.detect_pair(id, static_id, &mut out)?;
            }
        }
        self.detect_tires(id, body, &mut out)?;
        if let Some(grind) = self.detect_grind(id, body) {
            out.push(grind);
        }
        Ok(out)
    }

    fn detect_static_geometry(
        &self,
        id: BodyId,
        body: &RigidBody,
        out: &mut Vec<Candidate>,
    ) -> Result<(), GeometryError> {
        if !body.world_aabb().intersects(&self.geometry.bounds()) {
            return Ok(());
        }
        for (mesh_index, mesh) in body.world_meshes().iter().enumerate() {
            for (bounds, reference) in mesh.primitives(mesh_index as u32) {
                let Some(query) = Primitive::resolve(mesh, reference) else {
                    continue;
                };
                for target_ref in self.geometry.query_aabb(bounds) {
                    let Some(target) = self.geometry.primitive(target_ref) else {
                        continue;
                    };
                    if let Some(candidate) = self.surface(id, None, query, target)? {
                        out.push(candidate);
                    }
                }
            }
        }
        Ok(())
    }

    /// Contacts of `a`'s primitives with `b`'s, normals pointing towards `a`.
    fn detect_pair(
        &self,
        a: BodyId,
        b: BodyId,
        out: &mut Vec<Candidate>,
    ) -> Result<(), GeometryError> {
        let (Some(body_a), Some(body_b)) = (self.bodies.get(a), self.bodies.get(b)) else {
            return Ok(());
        };
        if !body_a.world_aabb().intersects(&body_b.world_aabb()) {
            return Ok(());
        }
        for (ia, mesh_a) in body_a.world_meshes().iter().enumerate() {
            for (bounds_a, ref_a) in mesh_a.primitives(ia as u32) {
                let Some(query) = Primitive::resolve(mesh_a, ref_a) else {
                    continue;
                };
                for (ib, mesh_b) in body_b.world_meshes().iter().enumerate() {
                    for (bounds_b, ref_b) in mesh_b.primitives(ib as u32) {
                        if !bounds_a.intersects(&bounds_b) {
                            continue;
                        }
                        let Some(target) = Primitive::resolve(mesh_b, ref_b) else {
                            continue;
                        };
                        if let Some(candidate) = self.surface(a, Some(b), query, target)? {
                            out.push(candidate);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn surface(
        &self,
        body: BodyId,
        other: Option<BodyId>,
        query: Primitive<'_>,
        target: Primitive<'_>,
    ) -> Result<Option<Candidate>, GeometryError> {
        let Some(info) = collide(query, target, self.behavior())? else {
            return Ok(None);
        };
        Ok(Some(Candidate::Surface {
            point: ContactPoint {
                body,
                other,
                position: info.point,
                normal: info.normal().as_vec3(),
                overlap: info.overlap() as f32,
            },
            material: query.material().combine(&target.material()),
        }))
    }

    fn detect_tires(
        &self,
        id: BodyId,
        body: &RigidBody,
        out: &mut Vec<Candidate>,
    ) -> Result<(), GeometryError> {
        let Some(vehicle) = body.vehicle() else {
            return Ok(());
        };
        for ray in vehicle.tire_rays(&body.pose()) {
            let direction = ray.direction.as_dvec3();
            let length = f64::from(ray.length);
            let mut hit = self
                .geometry
                .raycast(ray.origin, direction, length, self.behavior())?;
            if let Some(query) = RaycastQuery::new(ray.origin, direction, length) {
                hit = Raycast::nearest(hit, self.raycast_static_bodies(&query)?);
            }
            let Some(hit) = hit.filter(|h| h.material.drivable) else {
                out.push(Candidate::Airborne {
                    body: id,
                    tire: ray.tire,
                });
                continue;
            };
            let Some(tire) = vehicle.tires.get(ray.tire) else {
                continue;
            };
            let compression = (length - hit.distance) as f32;
            out.push(Candidate::Tire {
                point: ContactPoint {
                    body: id,
                    other: hit.body,
                    position: hit.point,
                    normal: hit.normal.as_vec3(),
                    overlap: compression,
                },
                tire: ray.tire,
                compression,
                suspension_length: tire.suspension_length,
                forward: ray.forward,
                material: ContactMaterial {
                    stiction_coefficient: hit.material.stiction_coefficient
                        * self.config.stiction_coefficient,
                    friction_coefficient: hit.material.friction_coefficient
                        * self.config.friction_coefficient,
                    restitution: 0.0,
                },
            });
        }
        Ok(())
    }

    fn raycast_static_bodies(
        &self,
        query: &RaycastQuery,
    ) -> Result<Option<RaycastHit>, GeometryError> {
        let mut best = None;
        for &id in self.static_bodies {
            let Some(body) = self.bodies.get(id) else {
                continue;
            };
            let reach = query.max_distance;
            if body
                .world_aabb()
                .ray_entry(query.origin, query.direction, reach)
                .is_none()
            {
                continue;
            }
            for (index, mesh) in body.world_meshes().iter().enumerate() {
                let hit = Raycast::cast_mesh(query, mesh, index as u32, self.behavior())?
                    .map(|h| RaycastHit {
                        body: Some(id),
                        ..h
                    });
                best = Raycast::nearest(best, hit);
            }
        }
        Ok(best)
    }

    /// Closest rail within reach of the grind point, unless the body is
    /// already grinding.
    fn detect_grind(&self, id: BodyId, body: &RigidBody) -> Option<Candidate> {
        let grinder = body.capabilities.grinder.filter(|g| g.enabled)?;
        if self.rails.is_grinding(id) {
            return None;
        }
        let grind_point = body.pose().transform_point(grinder.grind_point);
        let threshold = self.config.grind_threshold;
        let region = Aabb::from_sphere(grind_point, f64::from(threshold));
        let mut best: Option<GrindInfo> = None;
        let mut consider = |info: Option<GrindInfo>| {
            if let Some(info) = info {
                if best.map_or(true, |b| info.distance2 < b.distance2) {
                    best = Some(info);
                }
            }
        };

        for reference in self.geometry.query_aabb(region) {
            if reference.kind != PrimitiveKind::Line {
                continue;
            }
            if let Some(Primitive::Line(line)) = self.geometry.primitive(reference) {
                if line.material.rail {
                    consider(GrindInfo::detect(
                        grind_point,
                        line.endpoints,
                        line.endpoints,
                        None,
                        threshold,
                    ));
                }
            }
        }

        for (other_id, other) in self.bodies.iter() {
            if other_id == id || !other.world_aabb().intersects(&region) {
                continue;
            }
            for (world, local) in other.world_meshes().iter().zip(&other.meshes) {
                for (line, local_line) in world.lines.iter().zip(&local.lines) {
                    if line.material.rail {
                        consider(GrindInfo::detect(
                            grind_point,
                            line.endpoints,
                            local_line.endpoints,
                            Some(other_id),
                            threshold,
                        ));
                    }
                }
            }
        }

        best.map(|info| Candidate::Grind { body: id, info })
    }
}

/// Intersection of a primitive of the moving body (`query`) with a
/// primitive it collides with. The normal points towards `query`.
/// Rails and line pairs never collide.
pub fn collide(
    query: Primitive<'_>,
    target: Primitive<'_>,
    behavior: NormalVectorErrorBehavior,
) -> Result<Option<IntersectionInfo>, GeometryError> {
    if query.is_rail() || target.is_rail() {
        return Ok(None);
    }
    let (info, flip) = match (query, target) {
        (Primitive::Sphere(s), Primitive::Triangle(t)) => (sphere_triangle(s, t, behavior)?, false),
        (Primitive::Sphere(s), Primitive::Sphere(o)) => (sphere_sphere(o, s, behavior)?, false),
        (Primitive::Sphere(s), Primitive::Line(l)) => {
            let [a, b] = l.endpoints;
            (segment_sphere(a, b, s, behavior)?, true)
        }
        (Primitive::Line(l), Primitive::Triangle(t)) => {
            let [a, b] = l.endpoints;
            (segment_triangle(a, b, t, behavior)?, false)
        }
        (Primitive::Line(l), Primitive::Sphere(s)) => {
            let [a, b] = l.endpoints;
            (segment_sphere(a, b, s, behavior)?, false)
        }
        (Primitive::Triangle(t), Primitive::Sphere(s)) => (sphere_triangle(s, t, behavior)?, true),
        (Primitive::Triangle(t), Primitive::Line(l)) => {
            let [a, b] = l.endpoints;
            (segment_triangle(a, b, t, behavior)?, true)
        }
        (Primitive::Triangle(_), Primitive::Triangle(_)) | (Primitive::Line(_), Primitive::Line(_)) => {
            return Ok(None)
        }
    };
    Ok(info.map(|info| if flip { flipped(info) } else { info }))
}

fn flipped(info: IntersectionInfo) -> IntersectionInfo {
    IntersectionInfo {
        normal0: -info.normal0,
        normal_and_overlap: info.normal_and_overlap.map(|(n, o)| (-n, o)),
        ..info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mesh::{CollisionLine, CollisionMesh, CollisionSphere};
    use crate::core::types::{InertiaTensorExt, PhysicsMaterial, Pose};
    use glam::{DVec3, Mat3};

    fn sphere_body(position: DVec3) -> RigidBody {
        RigidBody::new(
            "ball",
            1.0,
            Mat3::for_solid_sphere(0.5, 1.0),
            Pose::from_position(position),
        )
        .with_mesh(CollisionMesh::new("hull").with_sphere(CollisionSphere::new(
            DVec3::ZERO,
            0.5,
            PhysicsMaterial::default(),
        )))
    }

    fn scene() -> StaticGeometry {
        let mut geometry = StaticGeometry::new();
        geometry
            .add_mesh(
                CollisionMesh::ground(20.0, 0.0, PhysicsMaterial::asphalt()),
                NormalVectorErrorBehavior::Throw,
            )
            .unwrap();
        geometry
    }

    fn group_of(ids: &[BodyId]) -> CollisionGroup {
        let mut bodies = ids.to_vec();
        bodies.sort_unstable();
        CollisionGroup {
            penetration_class: Default::default(),
            nsubsteps: 8,
            divider: 4,
            bodies,
        }
    }

    #[test]
    fn sphere_resting_on_ground_gets_upward_contact() {
        let mut bodies = Arena::new();
        let id = bodies.insert(sphere_body(DVec3::new(0.0, 0.45, 0.0)));
        let geometry = scene();
        let rails = RailContacts::new();
        let config = PhysicsEngineConfig::default();
        let detector = Detector {
            config: &config,
            bodies: &bodies,
            geometry: &geometry,
            static_bodies: &[],
            rails: &rails,
        };
        let candidates = detector.detect_group(&group_of(&[id]), false).unwrap();
        assert!(!candidates.is_empty());
        for candidate in &candidates {
            let Candidate::Surface { point, .. } = candidate else {
                panic!("unexpected candidate {candidate:?}");
            };
            assert_eq!(point.other, None);
            assert!(point.normal.y > 0.99);
            assert!((point.overlap - 0.05).abs() < 1e-5);
        }
    }

    #[test]
    fn pair_normal_points_towards_first_body() {
        let mut bodies = Arena::new();
        let a = bodies.insert(sphere_body(DVec3::new(0.0, 5.0, 0.0)));
        let b = bodies.insert(sphere_body(DVec3::new(0.9, 5.0, 0.0)));
        let geometry = StaticGeometry::new();
        let rails = RailContacts::new();
        let config = PhysicsEngineConfig::default();
        let detector = Detector {
            config: &config,
            bodies: &bodies,
            geometry: &geometry,
            static_bodies: &[],
            rails: &rails,
        };
        let candidates = detector.detect_group(&group_of(&[a, b]), false).unwrap();
        assert_eq!(candidates.len(), 1);
        let Candidate::Surface { point, .. } = &candidates[0] else {
            panic!("expected a surface contact");
        };
        assert_eq!((point.body, point.other), (a, Some(b)));
        assert!(point.normal.x < -0.99);
        assert!((point.overlap - 0.1).abs() < 1e-5);
    }

    #[test]
    fn rail_lines_are_grind_candidates_not_contacts() {
        let mut bodies = Arena::new();
        let id = bodies.insert(
            sphere_body(DVec3::new(0.0, 5.0, 0.0))
                .with_grinder(crate::core::capabilities::Grinder::new(Vec3::new(0.0, -0.5, 0.0))),
        );
        let mut geometry = StaticGeometry::new();
        geometry
            .add_mesh(
                CollisionMesh::new("rail").with_line(CollisionLine::new(
                    DVec3::new(-5.0, 4.4, 0.0),
                    DVec3::new(5.0, 4.4, 0.0),
                    PhysicsMaterial::rail(),
                )),
                NormalVectorErrorBehavior::Throw,
            )
            .unwrap();
        let rails = RailContacts::new();
        let config = PhysicsEngineConfig::default();
        let detector = Detector {
            config: &config,
            bodies: &bodies,
            geometry: &geometry,
            static_bodies: &[],
            rails: &rails,
        };
        let candidates = detector.detect_body(id).unwrap();
        assert_eq!(candidates.len(), 1);
        let Candidate::Grind { info, .. } = &candidates[0] else {
            panic!("expected a grind candidate");
        };
        assert!((info.distance2 - 0.01).abs() < 1e-6);
    }

    #[test]
    fn collide_flips_normals_towards_query() {
        let material = PhysicsMaterial::default();
        let triangle = crate::core::mesh::CollisionTriangle::new(
            [DVec3::ZERO, DVec3::new(0.0, 0.0, 1.0), DVec3::new(1.0, 0.0, 0.0)],
            material,
        );
        let sphere = CollisionSphere::new(DVec3::new(0.2, 0.3, 0.2), 0.5, material);
        let info = collide(
            Primitive::Triangle(&triangle),
            Primitive::Sphere(&sphere),
            NormalVectorErrorBehavior::Throw,
        )
        .unwrap()
        .unwrap();
        assert!(info.normal().y < -0.99);
    }
}
