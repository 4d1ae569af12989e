use glam::DVec3;

use crate::{
    collision::narrowphase::{ray_sphere, ray_triangle, IntersectionInfo},
    config::NormalVectorErrorBehavior,
    core::{
        mesh::{CollisionMesh, PrimitiveKind, PrimitiveRef},
        types::PhysicsMaterial,
    },
    error::GeometryError,
    utils::allocator::BodyId,
};

/// Result of a ray cast. `body` is `None` for static geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    pub body: Option<BodyId>,
    pub primitive: PrimitiveRef,
    pub point: DVec3,
    /// Unit surface normal facing the ray origin.
    pub normal: DVec3,
    pub distance: f64,
    pub material: PhysicsMaterial,
}

/// Ray with a unit direction and a length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastQuery {
    pub origin: DVec3,
    pub direction: DVec3,
    pub max_distance: f64,
}

impl RaycastQuery {
    /// Returns `None` for a zero direction.
    pub fn new(origin: DVec3, direction: DVec3, max_distance: f64) -> Option<Self> {
        let direction = direction.try_normalize()?;
        Some(Self {
            origin,
            direction,
            max_distance,
        })
    }
}

/// Ray tests against collision meshes. Lines have no thickness and are
/// never hit.
pub struct Raycast;

impl Raycast {
    pub fn cast_primitive(
        query: &RaycastQuery,
        mesh: &CollisionMesh,
        primitive: PrimitiveRef,
        behavior: NormalVectorErrorBehavior,
    ) -> Result<Option<RaycastHit>, GeometryError> {
        let index = primitive.index as usize;
        let found: Option<(IntersectionInfo, PhysicsMaterial)> = match primitive.kind {
            PrimitiveKind::Triangle => match mesh.triangles.get(index) {
                Some(t) => ray_triangle(query.origin, query.direction, query.max_distance, t, behavior)?
                    .map(|info| (info, t.material)),
                None => None,
            },
            PrimitiveKind::Sphere => mesh.spheres.get(index).and_then(|s| {
                ray_sphere(query.origin, query.direction, query.max_distance, s)
                    .map(|info| (info, s.material))
            }),
            PrimitiveKind::Line => None,
        };
        Ok(found.and_then(|(info, material)| {
            Some(RaycastHit {
                body: None,
                primitive,
                point: info.point,
                normal: info.normal0.normalize_or_zero(),
                distance: info.ray_t?,
                material,
            })
        }))
    }

    /// Nearest hit over every primitive of a mesh.
    pub fn cast_mesh(
        query: &RaycastQuery,
        mesh: &CollisionMesh,
        mesh_index: u32,
        behavior: NormalVectorErrorBehavior,
    ) -> Result<Option<RaycastHit>, GeometryError> {
        let mut best = None;
        for (_, primitive) in mesh.primitives(mesh_index) {
            let hit = Self::cast_primitive(query, mesh, primitive, behavior)?;
            best = Self::nearest(best, hit);
        }
        Ok(best)
    }

    pub fn nearest(a: Option<RaycastHit>, b: Option<RaycastHit>) -> Option<RaycastHit> {
        match (a, b) {
            (Some(a), Some(b)) => Some(if b.distance < a.distance { b } else { a }),
            (a, b) => a.or(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mesh::CollisionSphere;

    #[test]
    fn nearest_primitive_wins() {
        let mesh = CollisionMesh::ground(10.0, 0.0, PhysicsMaterial::default()).with_sphere(
            CollisionSphere::new(DVec3::new(0.0, 2.0, 0.0), 0.5, PhysicsMaterial::ice()),
        );
        let query = RaycastQuery::new(DVec3::new(0.0, 5.0, 0.0), DVec3::NEG_Y, 10.0).unwrap();
        let hit = Raycast::cast_mesh(&query, &mesh, 0, NormalVectorErrorBehavior::Throw)
            .unwrap()
            .unwrap();
        assert_eq!(hit.primitive.kind, PrimitiveKind::Sphere);
        assert!((hit.distance - 2.5).abs() < 1e-9);
        assert_eq!(hit.material, PhysicsMaterial::ice());
    }

    #[test]
    fn zero_direction_is_rejected() {
        assert!(RaycastQuery::new(DVec3::ZERO, DVec3::ZERO, 1.0).is_none());
    }
}
