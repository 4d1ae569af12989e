//! Static collision batches in world coordinates, indexed by one BVH.

use glam::DVec3;

use crate::{
    collision::{
        bvh::{Bvh, AabbQuery},
        narrowphase::triangle_normal,
        queries::{Raycast, RaycastHit, RaycastQuery},
    },
    config::NormalVectorErrorBehavior,
    core::{
        mesh::{
            Aabb, CollisionLine, CollisionMesh, CollisionSphere, CollisionTriangle, PrimitiveKind,
            PrimitiveRef,
        },
        types::PhysicsMaterial,
    },
    error::GeometryError,
};

/// Borrowed primitive resolved from a [`PrimitiveRef`].
#[derive(Debug, Clone, Copy)]
pub enum Primitive<'a> {
    Triangle(&'a CollisionTriangle),
    Line(&'a CollisionLine),
    Sphere(&'a CollisionSphere),
}

impl<'a> Primitive<'a> {
    pub fn resolve(mesh: &'a CollisionMesh, primitive: PrimitiveRef) -> Option<Self> {
        let index = primitive.index as usize;
        match primitive.kind {
            PrimitiveKind::Triangle => mesh.triangles.get(index).map(Primitive::Triangle),
            PrimitiveKind::Line => mesh.lines.get(index).map(Primitive::Line),
            PrimitiveKind::Sphere => mesh.spheres.get(index).map(Primitive::Sphere),
        }
    }

    pub fn material(&self) -> PhysicsMaterial {
        match self {
            Primitive::Triangle(t) => t.material,
            Primitive::Line(l) => l.material,
            Primitive::Sphere(s) => s.material,
        }
    }

    /// Rails only take part in grinding, never in surface contacts.
    pub fn is_rail(&self) -> bool {
        matches!(self, Primitive::Line(l) if l.material.rail)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticGeometry {
    meshes: Vec<Option<CollisionMesh>>,
    bvh: Bvh<PrimitiveRef>,
}

impl StaticGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and inserts a batch, returning its handle. Degenerate
    /// triangles fail the insertion under `Throw` and are dropped otherwise.
    pub fn add_mesh(
        &mut self,
        mut mesh: CollisionMesh,
        behavior: NormalVectorErrorBehavior,
    ) -> Result<usize, GeometryError> {
        let before = mesh.triangles.len();
        let mut kept = Vec::with_capacity(before);
        // Check with `Skip` so a mesh with many slivers logs once below.
        let check = match behavior {
            NormalVectorErrorBehavior::Throw => behavior,
            _ => NormalVectorErrorBehavior::Skip,
        };
        for triangle in mesh.triangles.drain(..) {
            if triangle_normal(&triangle, check)?.is_some() {
                kept.push(triangle);
            }
        }
        let dropped = before - kept.len();
        if dropped > 0 && behavior == NormalVectorErrorBehavior::Warn {
            log::warn!(
                "mesh \"{}\": dropped {dropped} degenerate triangle(s)",
                mesh.name
            );
        }
        mesh.triangles = kept;

        let handle = match self.meshes.iter().position(Option::is_none) {
            Some(free) => {
                self.meshes[free] = Some(mesh);
                free
            }
            None => {
                self.meshes.push(Some(mesh));
                self.meshes.len() - 1
            }
        };
        self.rebuild();
        Ok(handle)
    }

    pub fn remove_mesh(&mut self, handle: usize) -> Option<CollisionMesh> {
        let mesh = self.meshes.get_mut(handle)?.take();
        if mesh.is_some() {
            self.rebuild();
        }
        mesh
    }

    pub fn mesh(&self, handle: usize) -> Option<&CollisionMesh> {
        self.meshes.get(handle)?.as_ref()
    }

    pub fn primitive(&self, primitive: PrimitiveRef) -> Option<Primitive<'_>> {
        Primitive::resolve(self.mesh(primitive.mesh as usize)?, primitive)
    }

    /// Primitives whose bounds overlap `region`.
    pub fn query_aabb(&self, region: Aabb) -> AabbQuery<'_, PrimitiveRef> {
        self.bvh.query_aabb(region)
    }

    pub fn bounds(&self) -> Aabb {
        self.bvh.bounds()
    }

    /// Number of indexed primitives.
    pub fn len(&self) -> usize {
        self.bvh.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bvh.is_empty()
    }

    /// Nearest hit along a ray. Lines are not hit.
    pub fn raycast(
        &self,
        origin: DVec3,
        direction: DVec3,
        max_distance: f64,
        behavior: NormalVectorErrorBehavior,
    ) -> Result<Option<RaycastHit>, GeometryError> {
        let Some(query) = RaycastQuery::new(origin, direction, max_distance) else {
            return Ok(None);
        };
        let mut best: Option<RaycastHit> = None;
        for primitive in self
            .bvh
            .query_ray(query.origin, query.direction, query.max_distance)
        {
            let Some(mesh) = self.mesh(primitive.mesh as usize) else {
                continue;
            };
            let hit = Raycast::cast_primitive(&query, mesh, primitive, behavior)?;
            best = Raycast::nearest(best, hit);
        }
        Ok(best)
    }

    fn rebuild(&mut self) {
        let items: Vec<(Aabb, PrimitiveRef)> = self
            .meshes
            .iter()
            .enumerate()
            .filter_map(|(i, mesh)| mesh.as_ref().map(|m| (i, m)))
            .flat_map(|(i, mesh)| mesh.primitives(i as u32))
            .collect();
        self.bvh.rebuild(items);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sliver() -> CollisionTriangle {
        CollisionTriangle::new(
            [DVec3::ZERO, DVec3::X, DVec3::X * 2.0],
            PhysicsMaterial::default(),
        )
    }

    #[test]
    fn degenerate_triangles_are_dropped_or_rejected() {
        let mesh = CollisionMesh::ground(5.0, 0.0, PhysicsMaterial::default()).with_triangle(sliver());

        let mut geometry = StaticGeometry::new();
        let handle = geometry
            .add_mesh(mesh.clone(), NormalVectorErrorBehavior::Skip)
            .unwrap();
        assert_eq!(geometry.mesh(handle).unwrap().triangles.len(), 2);

        let mut strict = StaticGeometry::new();
        let err = strict
            .add_mesh(mesh, NormalVectorErrorBehavior::Throw)
            .unwrap_err();
        assert!(matches!(err, GeometryError::DegenerateTriangle { .. }));
        assert!(strict.is_empty());
    }

    #[test]
    fn raycast_finds_ground_and_misses_after_removal() {
        let mut geometry = StaticGeometry::new();
        let handle = geometry
            .add_mesh(
                CollisionMesh::ground(5.0, -1.0, PhysicsMaterial::asphalt()),
                NormalVectorErrorBehavior::Throw,
            )
            .unwrap();
        let hit = geometry
            .raycast(DVec3::new(1.0, 3.0, 1.0), DVec3::NEG_Y, 10.0, NormalVectorErrorBehavior::Throw)
            .unwrap()
            .unwrap();
        assert!((hit.distance - 4.0).abs() < 1e-9);
        assert!(hit.normal.y > 0.99);
        assert_eq!(hit.body, None);

        geometry.remove_mesh(handle);
        assert!(geometry
            .raycast(DVec3::new(1.0, 3.0, 1.0), DVec3::NEG_Y, 10.0, NormalVectorErrorBehavior::Throw)
            .unwrap()
            .is_none());
    }

    #[test]
    fn freed_handles_are_reused() {
        let mut geometry = StaticGeometry::new();
        let a = geometry
            .add_mesh(CollisionMesh::ground(1.0, 0.0, PhysicsMaterial::default()), NormalVectorErrorBehavior::Skip)
            .unwrap();
        geometry.remove_mesh(a);
        let b = geometry
            .add_mesh(CollisionMesh::ground(1.0, 2.0, PhysicsMaterial::default()), NormalVectorErrorBehavior::Skip)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(geometry.len(), 2);
    }
}
