use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::filters::rate_pid::{
    DtermFilter, PidContext, PidGains, RatePid, RatePidCfg, WindupProtection,
};
use crate::types::control::{Axis, AxisCommands};
use crate::types::flight_mode::FlightMode;
use crate::types::status::PidTerms;

/// Structure of the three rate controllers.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RateControlCfg {
    pub roll: RatePidCfg,
    pub pitch: RatePidCfg,
    pub yaw: RatePidCfg,
}

const ROLL_PITCH_PID: RatePidCfg = RatePidCfg {
    i_limit: 1.7,
    out_limit: 0.8,
    ground_leak: 20.0,
    d_filter: DtermFilter::SecondOrder { cutoff_hz: 100.0 },
    windup_protection: Some(WindupProtection {
        threshold: 0.1,
        cutoff_hz: 10.0,
    }),
};

crate::const_default!(
    RateControlCfg => {
        roll: ROLL_PITCH_PID,
        pitch: ROLL_PITCH_PID,
        yaw: RatePidCfg {
            i_limit: 0.5,
            out_limit: 0.4,
            ground_leak: 20.0,
            d_filter: DtermFilter::SecondOrder { cutoff_hz: 100.0 },
            windup_protection: None,
        },
    }
);

impl RateControlCfg {
    pub fn axis(&self, axis: Axis) -> &RatePidCfg {
        match axis {
            Axis::Roll => &self.roll,
            Axis::Pitch => &self.pitch,
            Axis::Yaw => &self.yaw,
        }
    }

    /// Replace the D-term filter of every axis, e.g. from a filter preset.
    pub fn with_d_filter(mut self, d_filter: DtermFilter) -> Self {
        self.roll.d_filter = d_filter;
        self.pitch.d_filter = d_filter;
        self.yaw.d_filter = d_filter;
        self
    }

    pub fn sanity_check(&self) -> Result<(), ConfigError> {
        for axis in Axis::ALL {
            let cfg = self.axis(axis);
            let valid = |v: f32| v.is_finite() && v >= 0.0;
            if !valid(cfg.i_limit) || !valid(cfg.out_limit) || !valid(cfg.ground_leak) {
                return Err(ConfigError::InvalidThreshold("rate_control.limits"));
            }
            let cutoff = cfg.d_filter.cutoff_hz();
            if !(cutoff.is_finite() && cutoff > 0.0) {
                return Err(ConfigError::InvalidCutoff(cutoff));
            }
            if let Some(wp) = cfg.windup_protection {
                if !(wp.threshold.is_finite() && wp.threshold > 0.0) {
                    return Err(ConfigError::InvalidThreshold("rate_control.windup_threshold"));
                }
                if !(wp.cutoff_hz.is_finite() && wp.cutoff_hz > 0.0) {
                    return Err(ConfigError::InvalidCutoff(wp.cutoff_hz));
                }
            }
        }
        Ok(())
    }
}

/// The three rate controllers, sharing the tick context of voltage
/// compensation and ground state.
pub struct RateController {
    pids: [RatePid; 3],
    ctx: PidContext,
    level_attenuation: f32,
}

impl RateController {
    pub fn new(cfg: &RateControlCfg, gains: &[PidGains; 3], level_attenuation: f32, ts: f32) -> Self {
        Self {
            pids: Axis::ALL.map(|axis| RatePid::new(gains[axis.index()], *cfg.axis(axis), ts)),
            ctx: PidContext::default(),
            level_attenuation,
        }
    }

    /// Swap all gains at once, keeping the controller states.
    pub fn set_gains(&mut self, gains: &[PidGains; 3]) {
        for (pid, gains) in self.pids.iter_mut().zip(gains) {
            pid.set_gains(*gains);
        }
    }

    /// Set the context of the coming tick.
    pub fn prepare(&mut self, v_comp: f32, on_ground: bool) {
        self.ctx.on_ground = on_ground;
        self.ctx.output_scale = if v_comp.is_finite() { v_comp } else { 1.0 };
    }

    /// Command of a single axis, given its rate setpoint and measurement.
    pub fn compute(&mut self, setpoint: f32, measured: f32, axis: Axis, mode: FlightMode) -> f32 {
        let mut ctx = self.ctx;
        if mode.is_leveling() {
            ctx.output_scale *= self.level_attenuation;
        }
        self.pids[axis.index()].update(setpoint, measured, &ctx)
    }

    pub fn compute_all(
        &mut self,
        setpoints: &[f32; 3],
        measured: &[f32; 3],
        mode: FlightMode,
    ) -> AxisCommands {
        AxisCommands(Axis::ALL.map(|axis| {
            self.compute(setpoints[axis.index()], measured[axis.index()], axis, mode)
        }))
    }

    /// Clear the integrators, done on every arming transition.
    pub fn reset(&mut self) {
        self.pids.iter_mut().for_each(RatePid::reset_integral);
    }

    pub fn terms(&self, axis: Axis) -> &PidTerms {
        self.pids[axis.index()].get_terms()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::params::TunableParams;

    const TS: f32 = 0.001;

    fn controller() -> RateController {
        let params = TunableParams::const_default();
        RateController::new(
            &RateControlCfg::const_default(),
            &params.pid_profiles[0],
            0.9,
            TS,
        )
    }

    #[test]
    fn leveling_attenuates_output() {
        let mut acro = controller();
        let mut level = controller();
        acro.prepare(1.33, false);
        level.prepare(1.33, false);
        let a = acro.compute(1.0, 0.0, Axis::Roll, FlightMode::Acro);
        let l = level.compute(1.0, 0.0, Axis::Roll, FlightMode::Angle);
        assert_relative_eq!(l, a * 0.9, epsilon = 1e-6);
    }

    #[test]
    fn reset_clears_integrators() {
        let mut controller = controller();
        controller.prepare(1.0, false);
        for _ in 0..100 {
            controller.compute_all(&[1.0, 1.0, 1.0], &[0.0; 3], FlightMode::Acro);
        }
        assert!(controller.terms(Axis::Yaw).i_out > 0.0);
        controller.reset();
        let out = controller.compute_all(&[0.0; 3], &[0.0; 3], FlightMode::Acro);
        assert_eq!(out, AxisCommands::ZERO);
    }

    #[test]
    fn zero_error_without_history_is_zero() {
        let mut controller = controller();
        controller.prepare(1.2, true);
        let out = controller.compute_all(&[0.0; 3], &[0.0; 3], FlightMode::Horizon);
        assert_eq!(out, AxisCommands::ZERO);
    }

    #[test]
    fn default_limits_are_valid() {
        assert_eq!(RateControlCfg::const_default().sanity_check(), Ok(()));
        let broken = RateControlCfg::const_default()
            .with_d_filter(DtermFilter::FirstOrder { cutoff_hz: 0.0 });
        assert_eq!(broken.sanity_check(), Err(ConfigError::InvalidCutoff(0.0)));
    }
}
