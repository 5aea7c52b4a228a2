use serde::{Deserialize, Serialize};

use super::{Lowpass, SisoFilter};

/// Scalar steady-state Kalman filter for a random-walk signal.
///
/// The process noise is tuned from a cutoff frequency, such that the
/// converged gain equals that of a first order low-pass with the same
/// cutoff. The estimate variance is tracked alongside the mean, which
/// lets the filter settle quickly after a reset.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Kalman {
    cutoff_hz: f32,
    q: f32,
    r: f32,
    x: f32,
    p: f32,
    passthrough: bool,
}

impl Kalman {
    /// Measurement noise the process noise is scaled against. Only the ratio
    /// between the two matters for the estimate.
    const R: f32 = 1.0;

    pub fn from_cutoff(cutoff_hz: f32, dt: f32) -> Self {
        let mut kalman = Self {
            cutoff_hz,
            q: 0.0,
            r: Self::R,
            x: 0.0,
            p: 0.0,
            passthrough: false,
        };
        kalman.set_dt(dt);
        kalman.p = kalman.steady_gain(dt) * Self::R;
        kalman
    }

    fn steady_gain(&self, dt: f32) -> f32 {
        Lowpass::from_cutoff(self.cutoff_hz, dt).alpha()
    }

    /// Retune the process noise for a new sample period, keeping the
    /// current estimate and its variance.
    pub fn set_dt(&mut self, dt: f32) {
        let k = self.steady_gain(dt);
        self.passthrough = k >= 1.0;

        // Process noise which makes `k` the steady-state gain
        self.q = if self.passthrough {
            0.0
        } else {
            k * k * self.r / (1.0 - k)
        };
    }

    pub fn mean_var(&self) -> (f32, f32) {
        (self.x, self.p)
    }

    pub fn update(&mut self, z: f32) -> f32 {
        if self.passthrough {
            self.x = z;
            return z;
        }

        // Predict
        let p_prior = self.p + self.q;

        // Correct
        let k = p_prior / (p_prior + self.r);
        self.x += k * (z - self.x);
        self.p = (1.0 - k) * p_prior;

        self.x
    }
}

impl SisoFilter for Kalman {
    type Type = f32;
    fn update(&mut self, input: f32) -> f32 {
        self.update(input)
    }
}
