use serde::{Deserialize, Serialize};

/// Static duty to thrust map of a single motor, blending a linear and a
/// quadratic response.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrustCurve {
    /// Thrust at full duty [N]
    pub max_force: f32,
    /// Share of the quadratic term, in `[0, 1]`
    pub curvature: f32,
}

impl ThrustCurve {
    pub fn new(max_force: f32, curvature: f32) -> Self {
        Self {
            max_force,
            curvature: curvature.clamp(0.0, 1.0),
        }
    }

    pub fn force(&self, duty: f32) -> f32 {
        let d = duty.clamp(0.0, 1.0);
        let k = self.curvature;
        self.max_force * ((1.0 - k) * d + k * d * d)
    }

    /// The duty producing `force`, saturating at the ends of the curve.
    pub fn duty(&self, force: f32) -> f32 {
        let f = (force / self.max_force).clamp(0.0, 1.0);
        let k = self.curvature;
        if k < 1e-6 {
            return f;
        }
        let linear = 1.0 - k;
        (-linear + (linear * linear + 4.0 * k * f).sqrt()) / (2.0 * k)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn duty_inverts_force() {
        for curvature in [0.0, 0.4, 1.0] {
            let curve = ThrustCurve::new(0.12, curvature);
            for duty in [0.0, 0.1, 0.5, 0.9, 1.0] {
                assert_relative_eq!(curve.duty(curve.force(duty)), duty, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn saturates_at_full_duty() {
        let curve = ThrustCurve::new(0.12, 0.3);
        assert_relative_eq!(curve.force(1.5), 0.12);
        assert_relative_eq!(curve.duty(1.0), 1.0);
        assert_eq!(curve.force(-1.0), 0.0);
    }
}
