//! Gravity-vector attitude estimation.
//!
//! Body frame is x forward, y left and z up. At rest and level, the
//! accelerometer reads `[0, 0, 1]` g. Positive roll lowers the right side,
//! positive pitch lowers the nose.

#[allow(unused_imports)]
use num_traits::Float;
use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EstimatorCfg {
    /// Time constant of the accelerometer correction [s]
    pub tau: f32,
    /// Deviation from 1 g [g] at which the accelerometer is no longer
    /// trusted. Thrust in a sustained bank reads above 1 g, along body z.
    pub acc_trust_band: f32,
    /// Accelerometer magnitudes outside `[acc_min_g, acc_max_g]` are ignored
    pub acc_min_g: f32,
    pub acc_max_g: f32,
    /// Largest integration step [s], guarding against skipped ticks
    pub max_dt: f32,
}

crate::const_default!(
    EstimatorCfg => {
        tau: 10.0,
        acc_trust_band: 0.05,
        acc_min_g: 0.7,
        acc_max_g: 1.3,
        max_dt: 0.004,
    }
);

/// Control-relevant state of a single tick.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Estimate {
    /// Body rates [rad/s] in order roll, pitch, yaw
    pub rates: [f32; 3],
    /// Roll and pitch angles [rad], only produced while leveling
    pub attitude: Option<[f32; 2]>,
}

/// Complementary estimator: the gravity vector is propagated with the gyro
/// and slowly pulled towards the accelerometer, which bounds the drift.
#[derive(Debug, Clone)]
pub struct AttitudeEstimator {
    cfg: EstimatorCfg,
    gravity: Vector3<f32>,
    initialized: bool,
}

impl AttitudeEstimator {
    pub fn new(cfg: EstimatorCfg) -> Self {
        Self {
            cfg,
            gravity: Vector3::z(),
            initialized: false,
        }
    }

    pub fn update(
        &mut self,
        gyr: [f32; 3],
        acc: Option<[f32; 3]>,
        dt: f32,
        leveling: bool,
    ) -> Estimate {
        let dt = if dt.is_finite() {
            dt.clamp(0.0, self.cfg.max_dt)
        } else {
            0.0
        };

        // A fixed world vector seen from a rotating body turns the opposite way
        let omega = Vector3::from(gyr);
        if omega.iter().all(|w| w.is_finite()) {
            self.gravity = Rotation3::new(-omega * dt) * self.gravity;
        }

        if let Some(acc) = acc.map(Vector3::from) {
            let norm = acc.norm();
            if norm >= self.cfg.acc_min_g && norm <= self.cfg.acc_max_g {
                let measured = acc / norm;
                if self.initialized {
                    let trust = (1.0 - (norm - 1.0).abs() / self.cfg.acc_trust_band).clamp(0.0, 1.0);
                    let alpha = trust * dt / (self.cfg.tau + dt);
                    self.gravity = self.gravity * (1.0 - alpha) + measured * alpha;
                } else {
                    self.gravity = measured;
                    self.initialized = true;
                }
            }
        }

        // Guard against numerical shrinkage or a degenerate vector
        let norm = self.gravity.norm();
        self.gravity = if norm > 1e-3 && norm.is_finite() {
            self.gravity / norm
        } else {
            Vector3::z()
        };

        Estimate {
            rates: gyr,
            attitude: leveling.then(|| self.angles()),
        }
    }

    /// Roll and pitch angles [rad] of the current estimate
    pub fn angles(&self) -> [f32; 2] {
        let g = &self.gravity;
        let roll = g.y.atan2(g.z);
        let pitch = (-g.x).atan2((g.y * g.y + g.z * g.z).sqrt());
        [roll, pitch]
    }
}
