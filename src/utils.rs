use glam::Quat;

pub trait QuatExt {
    fn nlerp(self, other: Quat, t: f32) -> Quat;
}

impl QuatExt for Quat {
    #[inline]
    fn nlerp(self, other: Quat, t: f32) -> Quat {
        let mut b = other;
        if self.dot(other) < 0.0 {
            b = -b;
        }
        (self * (1.0 - t) + b * t).normalize()
    }
}

/// Critically damped spring step toward `target` (Game Programming Gems 4 SmoothDamp).
/// `time_constant` is the approximate time to cover most of the remaining distance;
/// a non-positive value snaps immediately.
pub fn smooth_damp(current: f32, velocity: f32, target: f32, time_constant: f32, dt: f32) -> (f32, f32) {
    if time_constant <= 0.0 || dt <= 0.0 {
        return (target, 0.0);
    }
    let omega = 2.0 / time_constant;
    let x = omega * dt;
    let exp = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);
    let change = current - target;
    let temp = (velocity + omega * change) * dt;
    let new_velocity = (velocity - omega * temp) * exp;
    let new_current = target + (change + temp) * exp;
    (new_current, new_velocity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nlerp_takes_short_path() {
        let a = Quat::IDENTITY;
        let b = Quat::from_rotation_y(0.5);
        let mid = a.nlerp(b, 0.5);
        assert!(mid.dot(a) > 0.0);
        assert!((mid.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn smooth_damp_converges_without_overshoot_blowup() {
        let mut x = 0.0f32;
        let mut v = 0.0f32;
        for _ in 0..600 {
            let (nx, nv) = smooth_damp(x, v, 1.0, 0.1, 1.0 / 60.0);
            x = nx;
            v = nv;
            assert!(x.is_finite() && x > -0.01 && x < 1.5);
        }
        assert!((x - 1.0).abs() < 1e-3);
    }

    #[test]
    fn smooth_damp_zero_time_constant_snaps() {
        let (x, v) = smooth_damp(0.0, 3.0, 1.0, 0.0, 1.0 / 60.0);
        assert_eq!(x, 1.0);
        assert_eq!(v, 0.0);
    }
}
