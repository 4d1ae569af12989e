use glam::DVec3;
use serde::{Deserialize, Serialize};

use super::types::{PhysicsMaterial, Pose};

/// Axis-aligned bounding box used for primitive bounds and BVH nodes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: DVec3::splat(f64::INFINITY),
            max: DVec3::splat(f64::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn extend(&mut self, point: DVec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn merge(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn from_points(points: &[DVec3]) -> Self {
        let mut bounds = Self::empty();
        for &p in points {
            bounds.extend(p);
        }
        bounds
    }

    pub fn from_sphere(center: DVec3, radius: f64) -> Self {
        Self::new(center - DVec3::splat(radius), center + DVec3::splat(radius))
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> DVec3 {
        (self.max - self.min) * 0.5
    }

    pub fn radius(&self) -> f64 {
        self.extent().length()
    }

    #[must_use]
    pub fn padded(&self, padding: f64) -> Self {
        Self::new(self.min - DVec3::splat(padding), self.max + DVec3::splat(padding))
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains_point(&self, p: DVec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Index of the largest dimension (0 = x, 1 = y, 2 = z).
    pub fn longest_axis(&self) -> usize {
        let size = self.max - self.min;
        if size.x >= size.y && size.x >= size.z {
            0
        } else if size.y >= size.z {
            1
        } else {
            2
        }
    }

    /// Slab test. Returns the entry parameter of the ray within `[0, max_t]`.
    pub fn ray_entry(&self, origin: DVec3, direction: DVec3, max_t: f64) -> Option<f64> {
        let mut t_min = 0.0_f64;
        let mut t_max = max_t;
        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];
            if d.abs() < 1e-12 {
                if o < self.min[axis] || o > self.max[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let mut t0 = (self.min[axis] - o) * inv;
            let mut t1 = (self.max[axis] - o) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionTriangle {
    pub vertices: [DVec3; 3],
    pub material: PhysicsMaterial,
    /// One-sided triangles only collide from the side their winding faces.
    pub two_sided: bool,
}

impl CollisionTriangle {
    pub fn new(vertices: [DVec3; 3], material: PhysicsMaterial) -> Self {
        Self {
            vertices,
            material,
            two_sided: false,
        }
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(&self.vertices)
    }

    /// Un-normalized normal following the winding order.
    pub fn raw_normal(&self) -> DVec3 {
        let [a, b, c] = self.vertices;
        (b - a).cross(c - a)
    }

    pub fn area(&self) -> f64 {
        0.5 * self.raw_normal().length()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionLine {
    pub endpoints: [DVec3; 2],
    pub material: PhysicsMaterial,
}

impl CollisionLine {
    pub fn new(a: DVec3, b: DVec3, material: PhysicsMaterial) -> Self {
        Self {
            endpoints: [a, b],
            material,
        }
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(&self.endpoints)
    }

    pub fn length(&self) -> f64 {
        (self.endpoints[1] - self.endpoints[0]).length()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionSphere {
    pub center: DVec3,
    pub radius: f64,
    pub material: PhysicsMaterial,
}

impl CollisionSphere {
    pub fn new(center: DVec3, radius: f64, material: PhysicsMaterial) -> Self {
        Self {
            center,
            radius,
            material,
        }
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_sphere(self.center, self.radius)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Triangle,
    Line,
    Sphere,
}

/// Reference to one primitive of a mesh batch, stored in BVH leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrimitiveRef {
    pub mesh: u32,
    pub kind: PrimitiveKind,
    pub index: u32,
}

/// Batch of collision primitives. Static batches are in world
/// coordinates; batches attached to a body are relative to its pose.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollisionMesh {
    pub name: String,
    pub triangles: Vec<CollisionTriangle>,
    pub lines: Vec<CollisionLine>,
    pub spheres: Vec<CollisionSphere>,
}

impl CollisionMesh {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_triangle(mut self, triangle: CollisionTriangle) -> Self {
        self.triangles.push(triangle);
        self
    }

    pub fn with_line(mut self, line: CollisionLine) -> Self {
        self.lines.push(line);
        self
    }

    pub fn with_sphere(mut self, sphere: CollisionSphere) -> Self {
        self.spheres.push(sphere);
        self
    }

    /// Adds the quad `a, b, c, d` (counter-clockwise seen from its front) as two triangles.
    pub fn with_quad(
        mut self,
        [a, b, c, d]: [DVec3; 4],
        material: PhysicsMaterial,
        two_sided: bool,
    ) -> Self {
        for vertices in [[a, b, c], [a, c, d]] {
            self.triangles.push(CollisionTriangle {
                vertices,
                material,
                two_sided,
            });
        }
        self
    }

    /// Square ground patch at height `y`, facing +Y.
    pub fn ground(half_size: f64, y: f64, material: PhysicsMaterial) -> Self {
        Self::new("ground").with_quad(
            [
                DVec3::new(-half_size, y, -half_size),
                DVec3::new(-half_size, y, half_size),
                DVec3::new(half_size, y, half_size),
                DVec3::new(half_size, y, -half_size),
            ],
            material,
            false,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty() && self.lines.is_empty() && self.spheres.is_empty()
    }

    pub fn primitive_count(&self) -> usize {
        self.triangles.len() + self.lines.len() + self.spheres.len()
    }

    pub fn aabb(&self) -> Aabb {
        let mut bounds = Aabb::empty();
        for t in &self.triangles {
            bounds.merge(&t.aabb());
        }
        for l in &self.lines {
            bounds.merge(&l.aabb());
        }
        for s in &self.spheres {
            bounds.merge(&s.aabb());
        }
        bounds
    }

    pub fn has_bullet_lines(&self) -> bool {
        self.lines.iter().any(|l| l.material.bullet_line)
    }

    /// Bounds and references of every primitive, tagged with `mesh`.
    pub fn primitives(&self, mesh: u32) -> impl Iterator<Item = (Aabb, PrimitiveRef)> + '_ {
        let triangles = self.triangles.iter().enumerate().map(move |(i, t)| {
            (t.aabb(), PrimitiveRef { mesh, kind: PrimitiveKind::Triangle, index: i as u32 })
        });
        let lines = self.lines.iter().enumerate().map(move |(i, l)| {
            (l.aabb(), PrimitiveRef { mesh, kind: PrimitiveKind::Line, index: i as u32 })
        });
        let spheres = self.spheres.iter().enumerate().map(move |(i, s)| {
            (s.aabb(), PrimitiveRef { mesh, kind: PrimitiveKind::Sphere, index: i as u32 })
        });
        triangles.chain(lines).chain(spheres)
    }

    /// Copy of the batch placed in the world by `pose`.
    pub fn transformed(&self, pose: &Pose) -> CollisionMesh {
        let point = |p: DVec3| pose.transform_point(p.as_vec3());
        CollisionMesh {
            name: self.name.clone(),
            triangles: self
                .triangles
                .iter()
                .map(|t| CollisionTriangle {
                    vertices: t.vertices.map(point),
                    ..*t
                })
                .collect(),
            lines: self
                .lines
                .iter()
                .map(|l| CollisionLine {
                    endpoints: l.endpoints.map(point),
                    ..*l
                })
                .collect(),
            spheres: self
                .spheres
                .iter()
                .map(|s| CollisionSphere {
                    center: point(s.center),
                    ..*s
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aabb_overlap_is_symmetric() {
        let a = Aabb::new(DVec3::ZERO, DVec3::ONE);
        let b = Aabb::new(DVec3::splat(0.5), DVec3::splat(2.0));
        let c = Aabb::new(DVec3::splat(3.0), DVec3::splat(4.0));
        assert_eq!(a.intersects(&b), b.intersects(&a));
        assert_eq!(a.intersects(&c), c.intersects(&a));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn ray_entry_hits_box() {
        let aabb = Aabb::new(DVec3::splat(-1.0), DVec3::splat(1.0));
        let t = aabb.ray_entry(DVec3::new(-5.0, 0.0, 0.0), DVec3::X, 100.0);
        assert_eq!(t, Some(4.0));
        assert!(aabb
            .ray_entry(DVec3::new(-5.0, 2.0, 0.0), DVec3::X, 100.0)
            .is_none());
    }

    #[test]
    fn ground_faces_up() {
        let ground = CollisionMesh::ground(10.0, 0.0, PhysicsMaterial::default());
        for t in &ground.triangles {
            assert!(t.raw_normal().y > 0.0);
        }
    }
}
