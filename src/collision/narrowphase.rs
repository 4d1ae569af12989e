//! Exact primitive tests.
//!
//! Every test returns `Ok(None)` when there is no intersection and
//! `Ok(Some(info))` otherwise. Degenerate normals are routed through
//! [`NormalVectorErrorBehavior`], so the only error these functions raise is
//! the [`GeometryError`] requested by [`NormalVectorErrorBehavior::Throw`].
//!
//! Normals in [`IntersectionInfo::normal_and_overlap`] point away from the
//! primitive that was hit, i.e. in the direction the query object has to
//! move to resolve the overlap.

use glam::DVec3;

use crate::config::NormalVectorErrorBehavior;
use crate::core::mesh::{Aabb, CollisionSphere, CollisionTriangle};
use crate::error::GeometryError;
use crate::utils::math::closest_point_on_segment;

/// Twice the smallest triangle area that still defines a normal.
const MIN_RAW_NORMAL_LENGTH: f64 = 1e-12;
/// Segments whose endpoints differ by less than this along the normal are coplanar.
const PARALLEL_EPSILON: f64 = 1e-12;
/// Slack on barycentric coordinates so shared edges do not leak.
const EDGE_TOLERANCE: f64 = 1e-9;

/// Result of a narrow-phase query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionInfo {
    /// Parameter along the segment or ray, when the query has one.
    pub ray_t: Option<f64>,
    pub point: DVec3,
    /// Un-normalized surface normal of the primitive, oriented like the contact normal.
    pub normal0: DVec3,
    /// Unit contact normal and overlap depth.
    pub normal_and_overlap: Option<(DVec3, f64)>,
}

impl IntersectionInfo {
    /// Unit contact normal, falling back to the normalized `normal0`.
    pub fn normal(&self) -> DVec3 {
        self.normal_and_overlap
            .map_or_else(|| self.normal0.normalize_or_zero(), |(n, _)| n)
    }

    pub fn overlap(&self) -> f64 {
        self.normal_and_overlap.map_or(0.0, |(_, overlap)| overlap)
    }
}

/// Applies the policy to a normal that could not be computed. `Ok(None)`
/// means the caller drops the contact, `Ok(Some(ZERO))` that it keeps it
/// with a zero normal.
pub fn handle_degenerate_normal(
    behavior: NormalVectorErrorBehavior,
    context: &'static str,
) -> Result<Option<DVec3>, GeometryError> {
    match behavior {
        NormalVectorErrorBehavior::Throw => Err(GeometryError::DegenerateNormal { context }),
        NormalVectorErrorBehavior::Warn => {
            log::warn!("degenerate normal in {context}, contact skipped");
            Ok(None)
        }
        NormalVectorErrorBehavior::Skip => Ok(None),
        NormalVectorErrorBehavior::Zero => Ok(Some(DVec3::ZERO)),
    }
}

/// Unit normal of a triangle following its winding order.
///
/// A zero-area triangle has no surface, so under `Zero` it is treated like
/// `Skip` and never yields a contact.
pub fn triangle_normal(
    triangle: &CollisionTriangle,
    behavior: NormalVectorErrorBehavior,
) -> Result<Option<DVec3>, GeometryError> {
    let raw = triangle.raw_normal();
    let length = raw.length();
    if length.is_finite() && length > MIN_RAW_NORMAL_LENGTH {
        return Ok(Some(raw / length));
    }
    match behavior {
        NormalVectorErrorBehavior::Throw => Err(GeometryError::DegenerateTriangle {
            area: 0.5 * length,
        }),
        NormalVectorErrorBehavior::Warn => {
            log::warn!("degenerate triangle {:?} ignored", triangle.vertices);
            Ok(None)
        }
        NormalVectorErrorBehavior::Skip | NormalVectorErrorBehavior::Zero => Ok(None),
    }
}

/// Whether `p`, assumed to lie in the plane of the triangle, is inside it.
pub fn point_in_triangle(p: DVec3, [a, b, c]: [DVec3; 3], normal: DVec3) -> bool {
    let scale = (b - a).cross(c - a).dot(normal);
    if scale.abs() <= f64::EPSILON {
        return false;
    }
    let tolerance = -EDGE_TOLERANCE * scale.abs();
    let u = (c - b).cross(p - b).dot(normal) * scale.signum();
    let v = (a - c).cross(p - c).dot(normal) * scale.signum();
    let w = (b - a).cross(p - a).dot(normal) * scale.signum();
    u >= tolerance && v >= tolerance && w >= tolerance
}

/// Closest point of the triangle to `p`, by Voronoi region.
pub fn closest_point_on_triangle(p: DVec3, [a, b, c]: [DVec3; 3]) -> DVec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
    }

    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}

/// Segment `a`-`b` crossing a triangle.
///
/// A one-sided triangle always pushes along its front normal. A two-sided
/// triangle pushes towards the side holding the larger part of the
/// segment. The overlap is the depth of the endpoint on the far side.
/// Segments lying in the triangle plane never intersect.
pub fn segment_triangle(
    a: DVec3,
    b: DVec3,
    triangle: &CollisionTriangle,
    behavior: NormalVectorErrorBehavior,
) -> Result<Option<IntersectionInfo>, GeometryError> {
    let Some(n) = triangle_normal(triangle, behavior)? else {
        return Ok(None);
    };
    let origin = triangle.vertices[0];
    let da = (a - origin).dot(n);
    let db = (b - origin).dot(n);
    if (da - db).abs() < PARALLEL_EPSILON || (da > 0.0 && db > 0.0) || (da < 0.0 && db < 0.0) {
        return Ok(None);
    }

    let t = da / (da - db);
    let point = a + (b - a) * t;
    if !point_in_triangle(point, triangle.vertices, n) {
        return Ok(None);
    }

    let side = if triangle.two_sided && da + db < 0.0 { -1.0 } else { 1.0 };
    let normal = n * side;
    let overlap = -(da * side).min(db * side);
    Ok(Some(IntersectionInfo {
        ray_t: Some(t),
        point,
        normal0: triangle.raw_normal() * side,
        normal_and_overlap: Some((normal, overlap)),
    }))
}

/// First hit of the ray `origin + t·direction`, `t ∈ [0, max_t]`, with a
/// triangle. One-sided triangles are invisible from behind.
pub fn ray_triangle(
    origin: DVec3,
    direction: DVec3,
    max_t: f64,
    triangle: &CollisionTriangle,
    behavior: NormalVectorErrorBehavior,
) -> Result<Option<IntersectionInfo>, GeometryError> {
    let Some(n) = triangle_normal(triangle, behavior)? else {
        return Ok(None);
    };
    let denom = direction.dot(n);
    if denom.abs() < PARALLEL_EPSILON || (denom > 0.0 && !triangle.two_sided) {
        return Ok(None);
    }
    let t = (triangle.vertices[0] - origin).dot(n) / denom;
    if !(0.0..=max_t).contains(&t) {
        return Ok(None);
    }
    let point = origin + direction * t;
    if !point_in_triangle(point, triangle.vertices, n) {
        return Ok(None);
    }
    let side = if denom > 0.0 { -1.0 } else { 1.0 };
    Ok(Some(IntersectionInfo {
        ray_t: Some(t),
        point,
        normal0: triangle.raw_normal() * side,
        normal_and_overlap: None,
    }))
}

/// Sphere against a triangle. One-sided triangles ignore spheres whose
/// center is behind them.
pub fn sphere_triangle(
    sphere: &CollisionSphere,
    triangle: &CollisionTriangle,
    behavior: NormalVectorErrorBehavior,
) -> Result<Option<IntersectionInfo>, GeometryError> {
    let Some(n) = triangle_normal(triangle, behavior)? else {
        return Ok(None);
    };
    let distance_to_plane = (sphere.center - triangle.vertices[0]).dot(n);
    if distance_to_plane.abs() > sphere.radius
        || (distance_to_plane < 0.0 && !triangle.two_sided)
    {
        return Ok(None);
    }

    let closest = closest_point_on_triangle(sphere.center, triangle.vertices);
    let delta = sphere.center - closest;
    let distance = delta.length();
    if distance > sphere.radius {
        return Ok(None);
    }
    let side = if distance_to_plane < 0.0 { -1.0 } else { 1.0 };
    let normal = if distance > f64::EPSILON {
        delta / distance
    } else {
        n * side
    };
    Ok(Some(IntersectionInfo {
        ray_t: None,
        point: closest,
        normal0: triangle.raw_normal() * side,
        normal_and_overlap: Some((normal, sphere.radius - distance)),
    }))
}

/// Two spheres. The normal points from `s0` towards `s1`.
pub fn sphere_sphere(
    s0: &CollisionSphere,
    s1: &CollisionSphere,
    behavior: NormalVectorErrorBehavior,
) -> Result<Option<IntersectionInfo>, GeometryError> {
    let delta = s1.center - s0.center;
    let distance = delta.length();
    let overlap = s0.radius + s1.radius - distance;
    if overlap <= 0.0 {
        return Ok(None);
    }
    let normal = if distance > f64::EPSILON {
        delta / distance
    } else {
        match handle_degenerate_normal(behavior, "sphere-sphere")? {
            Some(normal) => normal,
            None => return Ok(None),
        }
    };
    Ok(Some(IntersectionInfo {
        ray_t: None,
        point: s0.center + normal * (s0.radius - 0.5 * overlap),
        normal0: delta,
        normal_and_overlap: Some((normal, overlap)),
    }))
}

/// Sphere against a box. The normal points from the box towards the sphere.
/// A center inside the box is pushed out through the nearest face.
pub fn sphere_aabb(sphere: &CollisionSphere, aabb: &Aabb) -> Option<IntersectionInfo> {
    let closest = sphere.center.clamp(aabb.min, aabb.max);
    let delta = sphere.center - closest;
    let distance = delta.length();
    if distance > sphere.radius {
        return None;
    }
    if distance > f64::EPSILON {
        let normal = delta / distance;
        return Some(IntersectionInfo {
            ray_t: None,
            point: closest,
            normal0: normal,
            normal_and_overlap: Some((normal, sphere.radius - distance)),
        });
    }

    let to_min = sphere.center - aabb.min;
    let to_max = aabb.max - sphere.center;
    let mut best = (f64::INFINITY, DVec3::ZERO);
    for axis in 0..3 {
        let mut unit = DVec3::ZERO;
        unit[axis] = 1.0;
        if to_min[axis] < best.0 {
            best = (to_min[axis], -unit);
        }
        if to_max[axis] < best.0 {
            best = (to_max[axis], unit);
        }
    }
    let (depth, normal) = best;
    Some(IntersectionInfo {
        ray_t: None,
        point: sphere.center + normal * depth,
        normal0: normal,
        normal_and_overlap: Some((normal, sphere.radius + depth)),
    })
}

/// Segment `a`-`b` touching a sphere. The normal points from the sphere
/// towards the segment.
pub fn segment_sphere(
    a: DVec3,
    b: DVec3,
    sphere: &CollisionSphere,
    behavior: NormalVectorErrorBehavior,
) -> Result<Option<IntersectionInfo>, GeometryError> {
    let (closest, t) = closest_point_on_segment(sphere.center, a, b);
    let delta = closest - sphere.center;
    let distance = delta.length();
    if distance >= sphere.radius {
        return Ok(None);
    }
    let normal = if distance > f64::EPSILON {
        delta / distance
    } else {
        match handle_degenerate_normal(behavior, "segment-sphere")? {
            Some(normal) => normal,
            None => return Ok(None),
        }
    };
    Ok(Some(IntersectionInfo {
        ray_t: Some(t),
        point: closest,
        normal0: delta,
        normal_and_overlap: Some((normal, sphere.radius - distance)),
    }))
}

/// First hit of a ray with a sphere, from outside.
pub fn ray_sphere(
    origin: DVec3,
    direction: DVec3,
    max_t: f64,
    sphere: &CollisionSphere,
) -> Option<IntersectionInfo> {
    let a = direction.length_squared();
    if a <= f64::EPSILON {
        return None;
    }
    let oc = origin - sphere.center;
    let half_b = oc.dot(direction);
    let c = oc.length_squared() - sphere.radius * sphere.radius;
    let discriminant = half_b * half_b - a * c;
    if discriminant < 0.0 {
        return None;
    }
    let t = (-half_b - discriminant.sqrt()) / a;
    if !(0.0..=max_t).contains(&t) {
        return None;
    }
    let point = origin + direction * t;
    Some(IntersectionInfo {
        ray_t: Some(t),
        point,
        normal0: point - sphere.center,
        normal_and_overlap: None,
    })
}
