#[allow(unused_imports)]
use num_traits::Float;
use serde::{Deserialize, Serialize};

use super::Lowpass;

/// The controller limits its output between `min` and `max`
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct OutputLimit {
    pub min: f32,
    pub max: f32,
}

/// Gains of the outer angle loop. The error is in [rad] and the output is
/// a rate setpoint in [rad/s].
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AnglePidCfg {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Cutoff of the derivative low-pass filter [Hz]
    pub d_cutoff_hz: f32,
}

crate::const_default!(
    AnglePidCfg => {
        kp: 10.0,
        ki: 0.0,
        kd: 0.01,
        d_cutoff_hz: 50.0,
    }
);

/// Outer angle controller of the cascaded angle→rate→output design.
#[derive(Copy, Clone, Debug)]
pub struct AnglePid {
    kp: f32,
    ki: f32,
    kd: f32,
    ts: f32,
    integral: f32,
    prev_error: Option<f32>,
    output_limit: Option<OutputLimit>,
    lp_filter: Lowpass<f32>,
}

impl AnglePid {
    #[must_use]
    pub fn new(cfg: AnglePidCfg, ts: f32) -> Self {
        AnglePid {
            kp: cfg.kp,
            ki: cfg.ki,
            kd: cfg.kd,
            ts,
            integral: 0.0,
            prev_error: None,
            output_limit: None,
            lp_filter: Lowpass::from_cutoff(cfg.d_cutoff_hz, ts),
        }
    }

    /// Set the output limits for the controller. The controller will not
    /// output a value less than `-limit` or greater than `limit`.
    #[must_use]
    pub fn set_output_limit(mut self, limit: f32) -> Self {
        let limit = limit.abs();
        self.output_limit = Some(OutputLimit {
            min: -limit,
            max: limit,
        });
        self
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
    }

    /// Update the controller with an `error` value.
    pub fn update(&mut self, error: f32) -> f32 {
        let proportional = self.kp * error;

        let prev_error = self.prev_error.unwrap_or(error);
        let derivative = self
            .lp_filter
            .update(self.kd * (error - prev_error) / self.ts);
        self.prev_error = Some(error);

        // Conditional integration, only while the unlimited output is in range
        let pd = proportional + derivative;
        let in_range = self
            .output_limit
            .is_none_or(|limit| pd > limit.min && pd < limit.max);
        if in_range {
            self.integral += self.ki * error * self.ts;
        }

        self.apply_output_limit(pd + self.integral)
    }

    fn apply_output_limit(&self, input: f32) -> f32 {
        match self.output_limit {
            Some(limit) => input.clamp(limit.min, limit.max),
            None => input,
        }
    }
}
