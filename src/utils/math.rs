//! Additional math helpers layered on top of `glam`.

use glam::{DVec3, Quat, Vec3};

/// Converts angular velocity vector (radians/sec) into a quaternion delta.
pub fn angular_velocity_to_quat(angular: Vec3, dt: f32) -> Quat {
    let angle = angular.length() * dt;
    if angle.abs() < 1e-9 {
        return Quat::IDENTITY;
    }
    let axis = angular / angular.length();
    Quat::from_axis_angle(axis, angle)
}

/// Removes the component of `v` along the unit vector `n`.
pub fn project_onto_plane(v: Vec3, n: Vec3) -> Vec3 {
    v - n * v.dot(n)
}

/// Closest point on the segment `a`-`b` and its parameter in `[0, 1]`.
pub fn closest_point_on_segment(point: DVec3, a: DVec3, b: DVec3) -> (DVec3, f64) {
    let ab = b - a;
    let len2 = ab.length_squared();
    if len2 <= f64::EPSILON {
        return (a, 0.0);
    }
    let t = ((point - a).dot(ab) / len2).clamp(0.0, 1.0);
    (a + ab * t, t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closest_point_clamps_to_endpoints() {
        let (p, t) = closest_point_on_segment(
            DVec3::new(-1.0, 1.0, 0.0),
            DVec3::ZERO,
            DVec3::new(2.0, 0.0, 0.0),
        );
        assert_eq!(t, 0.0);
        assert_eq!(p, DVec3::ZERO);
    }
}
