//! Cubic interpolation for keyframe channels
//!
//! Translation and scale use a uniform Catmull-Rom spline through the four
//! keys bracketing the sample time. Rotation uses spherical quadrangle
//! interpolation (Squad), falling back to Slerp when the control points
//! cannot be built.

use glam::{Quat, Vec3};

const LOG_EPSILON: f32 = 1.0e-6;

/// Uniform Catmull-Rom spline between `p1` and `p2`, with `p0`/`p3` as neighbors.
///
/// Returns exactly `p1` at `t = 0` and `p2` at `t = 1`.
pub fn catmull_rom(p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3, t: f32) -> Vec3 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * ((2.0 * p1)
        + (p2 - p0) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (3.0 * p1 - p0 - 3.0 * p2 + p3) * t3)
}

/// Logarithm of a unit quaternion, returned as the vector part (scalar part is zero)
pub fn quat_log(q: Quat) -> Vec3 {
    let v = Vec3::new(q.x, q.y, q.z);
    let sin_half = v.length();
    if sin_half < LOG_EPSILON {
        return v;
    }
    let half_angle = sin_half.atan2(q.w);
    v * (half_angle / sin_half)
}

/// Exponential of a pure quaternion given by its vector part
pub fn quat_exp(v: Vec3) -> Quat {
    let half_angle = v.length();
    if half_angle < LOG_EPSILON {
        return Quat::from_xyzw(v.x, v.y, v.z, 1.0).normalize();
    }
    let axis = v * (half_angle.sin() / half_angle);
    Quat::from_xyzw(axis.x, axis.y, axis.z, half_angle.cos())
}

/// Flip `q` into the same hemisphere as `reference`
pub fn align_hemisphere(reference: Quat, q: Quat) -> Quat {
    if reference.dot(q) < 0.0 { -q } else { q }
}

/// Inner control point for Squad at `q` with neighbors `prev` and `next`
fn squad_control(prev: Quat, q: Quat, next: Quat) -> Quat {
    let inv = q.conjugate();
    let sum = quat_log(inv * next) + quat_log(inv * prev);
    (q * quat_exp(sum * -0.25)).normalize()
}

/// Squad between `q1` and `q2` using `q0`/`q3` as neighbors.
///
/// Falls back to `q1.slerp(q2, t)` when the result is not a finite unit quaternion.
pub fn squad(q0: Quat, q1: Quat, q2: Quat, q3: Quat, t: f32) -> Quat {
    let q0 = align_hemisphere(q1, q0);
    let q2 = align_hemisphere(q1, q2);
    let q3 = align_hemisphere(q2, q3);

    let s1 = squad_control(q0, q1, q2);
    let s2 = squad_control(q1, q2, q3);

    let outer = q1.slerp(q2, t);
    let inner = s1.slerp(s2, t);
    let result = outer.slerp(inner, 2.0 * t * (1.0 - t));

    if result.is_finite() && (result.length() - 1.0).abs() < 1.0e-3 {
        result.normalize()
    } else {
        q1.slerp(q2, t)
    }
}
