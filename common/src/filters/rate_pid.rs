use crate::types::status::PidTerms;

use super::{Lowpass, NthOrderLowpass};

#[allow(unused_imports)]
use num_traits::Float;
use serde::{Deserialize, Serialize};

/// Proportional, integral and derivative gains of a single axis.
///
/// The controller is on parallel form, with the error in [rad/s] and the
/// output as a normalized motor correction. The derivative gain is in
/// seconds, i.e. it multiplies the rate of change of the measurement.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl PidGains {
    pub const fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self { kp, ki, kd }
    }

    pub fn is_valid(&self) -> bool {
        [self.kp, self.ki, self.kd]
            .iter()
            .all(|gain| gain.is_finite() && *gain >= 0.0)
    }
}

/// Order of the low-pass filter applied to the measurement before the
/// derivative is taken.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DtermFilter {
    FirstOrder { cutoff_hz: f32 },
    SecondOrder { cutoff_hz: f32 },
}

impl DtermFilter {
    pub fn cutoff_hz(&self) -> f32 {
        match self {
            DtermFilter::FirstOrder { cutoff_hz } | DtermFilter::SecondOrder { cutoff_hz } => {
                *cutoff_hz
            }
        }
    }
}

/// Suppresses integration while the setpoint moves quickly away from its
/// own low-passed average, such as during flips and rolls.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WindupProtection {
    /// Setpoint deviation [rad/s] at which integration stops entirely
    pub threshold: f32,
    /// Cutoff of the setpoint average [Hz]
    pub cutoff_hz: f32,
}

/// Per-axis controller structure, which is not tunable in flight.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RatePidCfg {
    /// Largest magnitude of the integral term
    pub i_limit: f32,
    /// Previous output magnitude beyond which the integrator is frozen if
    /// the error would push it further out
    pub out_limit: f32,
    /// Integrator decay rate [1/s] while sitting on the ground
    pub ground_leak: f32,
    pub d_filter: DtermFilter,
    pub windup_protection: Option<WindupProtection>,
}

/// Values shared between the axes which change from tick to tick.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidContext {
    /// Output multiplier from voltage compensation and level attenuation
    pub output_scale: f32,
    /// The throttle has not (yet) lifted the vehicle
    pub on_ground: bool,
}

impl Default for PidContext {
    fn default() -> Self {
        Self {
            output_scale: 1.0,
            on_ground: true,
        }
    }
}

#[derive(Debug, Copy, Clone)]
enum DLowpass {
    First(Lowpass<f32>),
    Second(NthOrderLowpass<f32, 2>),
}

impl DLowpass {
    fn new(filter: DtermFilter, ts: f32) -> Self {
        let tau = super::cutoff_to_tau(filter.cutoff_hz(), ts);
        match filter {
            DtermFilter::FirstOrder { .. } => DLowpass::First(Lowpass::new(tau, ts)),
            DtermFilter::SecondOrder { .. } => DLowpass::Second(NthOrderLowpass::new(tau, ts)),
        }
    }

    fn update(&mut self, x: f32) -> f32 {
        match self {
            DLowpass::First(lp) => lp.update(x),
            DLowpass::Second(lp) => lp.update(x),
        }
    }
}

/// The `RatePid` is the innermost controller of the vehicle, taking a
/// setpoint and measurement in [rad/s] and producing a normalized
/// correction for the mixer.
///
/// The derivative acts on the filtered measurement only, so steps in the
/// setpoint never produce a derivative kick.
#[derive(Debug, Clone)]
pub struct RatePid {
    // Gains
    kp: f32,
    ki: f32,
    kd: f32,

    // States
    integral: f32,
    prev_meas: Option<f32>,
    prev_output: f32,

    // Terms for logging
    terms: PidTerms,

    // Configuration
    ts: f32,
    cfg: RatePidCfg,
    d_lowpass: DLowpass,
    sp_average: Option<Lowpass<f32>>,
}

impl RatePid {
    pub fn new(gains: PidGains, cfg: RatePidCfg, ts: f32) -> Self {
        Self {
            kp: gains.kp,
            ki: gains.ki,
            kd: gains.kd,
            integral: 0.0,
            prev_meas: None,
            prev_output: 0.0,
            terms: PidTerms::default(),
            ts,
            cfg,
            d_lowpass: DLowpass::new(cfg.d_filter, ts),
            sp_average: cfg
                .windup_protection
                .map(|wp| Lowpass::from_cutoff(wp.cutoff_hz, ts)),
        }
    }

    /// Swap the gains while keeping all controller states, such that a
    /// retune between two ticks does not produce a bump.
    pub fn set_gains(&mut self, gains: PidGains) {
        self.kp = gains.kp;
        self.ki = gains.ki;
        self.kd = gains.kd;
    }

    pub fn gains(&self) -> PidGains {
        PidGains::new(self.kp, self.ki, self.kd)
    }

    pub fn update(&mut self, setpoint: f32, measurement: f32, ctx: &PidContext) -> f32 {
        let error = setpoint - measurement;

        let proportional = self.kp * error;

        // Derivative on the filtered measurement, negative since d(sp - meas)/dt
        let measurement_lp = self.d_lowpass.update(measurement);
        let prev_meas = self.prev_meas.unwrap_or(measurement_lp);
        let derivative = -self.kd * (measurement_lp - prev_meas) / self.ts;
        self.prev_meas = Some(measurement_lp);

        self.integrate(setpoint, error, ctx.on_ground);

        self.terms = PidTerms {
            p_out: proportional * ctx.output_scale,
            i_out: self.integral * ctx.output_scale,
            d_out: derivative * ctx.output_scale,
        };

        let output = proportional + self.integral + derivative;
        self.prev_output = output;
        output * ctx.output_scale
    }

    fn integrate(&mut self, setpoint: f32, error: f32, on_ground: bool) {
        // Freeze the integrator if the last output already saturated in
        // the direction the error would push it.
        let saturated = (self.prev_output >= self.cfg.out_limit && error > 0.0)
            || (self.prev_output <= -self.cfg.out_limit && error < 0.0);

        // Scale integration down while the setpoint runs away from its
        // average, and let it recover gradually once the average catches up.
        let relax = match (self.cfg.windup_protection, self.sp_average.as_mut()) {
            (Some(wp), Some(average)) => {
                let deviation = (setpoint - average.update(setpoint)).abs();
                (1.0 - deviation / wp.threshold).clamp(0.0, 1.0)
            }
            _ => 1.0,
        };

        if !saturated {
            self.integral += self.ki * error * relax * self.ts;
        }

        if on_ground {
            self.integral *= (1.0 - self.cfg.ground_leak * self.ts).max(0.0);
        }

        self.integral = self.integral.clamp(-self.cfg.i_limit, self.cfg.i_limit);
    }

    pub fn reset_integral(&mut self) {
        self.integral = 0.0;
        self.prev_output = 0.0;
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn get_terms(&self) -> &PidTerms {
        &self.terms
    }
}
