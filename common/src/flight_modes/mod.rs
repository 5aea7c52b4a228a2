//! Flight mode resolution and rate setpoint generation.
//!
//! Setpoints are rates in [rad/s]. Leveling axes run an outer angle
//! controller whose output is limited to the level max rate, and feed it to
//! the same inner rate loop as acro axes.

#[allow(unused_imports)]
use num_traits::Float;
use serde::{Deserialize, Serialize};

use crate::consts::DEG_TO_RAD;
use crate::errors::ConfigError;
use crate::filters::angle_pid::{AnglePid, AnglePidCfg};
use crate::rc_mapping::rates::RatesCfg;
use crate::rc_mapping::AuxState;
use crate::types::control::Axis;
use crate::types::flight_mode::FlightMode;

pub mod controller;

/// Resolve the flight mode from the aux switches. Leveling must be enabled
/// for any of the leveling modes, and plain angle mode is the default.
pub fn resolve_mode(aux: &AuxState) -> FlightMode {
    match (aux.leveling, aux.horizon, aux.race) {
        (false, _, _) => FlightMode::Acro,
        (true, false, false) => FlightMode::Angle,
        (true, true, false) => FlightMode::Horizon,
        (true, false, true) => FlightMode::Race,
        (true, true, true) => FlightMode::RaceHorizon,
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LevelCfg {
    /// Angle at full stick deflection [deg]
    pub max_angle: f32,
    /// Largest rate setpoint of the angle controller [deg/s]
    pub max_rate: f32,
    /// Inclination at which horizon mode hands over to acro entirely [deg]
    pub horizon_transition: f32,
    /// Controller output multiplier while leveling
    pub attenuation: f32,
    pub angle_pid: AnglePidCfg,
}

crate::const_default!(
    LevelCfg => {
        max_angle: 66.0,
        max_rate: 230.0,
        horizon_transition: 55.0,
        attenuation: 0.90,
        angle_pid: AnglePidCfg::const_default(),
    }
);

impl LevelCfg {
    pub fn sanity_check(&self) -> Result<(), ConfigError> {
        let positive = |v: f32| v.is_finite() && v > 0.0;
        if !(positive(self.max_angle) && self.max_angle < 90.0) {
            return Err(ConfigError::InvalidThreshold("level.max_angle"));
        }
        if !positive(self.max_rate) {
            return Err(ConfigError::InvalidRate("level.max_rate"));
        }
        if !positive(self.horizon_transition) {
            return Err(ConfigError::InvalidThreshold("level.horizon_transition"));
        }
        if !(self.attenuation > 0.0 && self.attenuation <= 1.0) {
            return Err(ConfigError::InvalidThreshold("level.attenuation"));
        }
        if !positive(self.angle_pid.d_cutoff_hz) {
            return Err(ConfigError::InvalidCutoff(self.angle_pid.d_cutoff_hz));
        }
        Ok(())
    }
}

/// Stick and switch inputs of a single tick.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SetpointInputs {
    /// Roll, pitch and yaw sticks in `[-1, 1]`
    pub sticks: [f32; 3],
    pub mode: FlightMode,
    /// Estimated roll and pitch [rad], present while leveling
    pub attitude: Option<[f32; 2]>,
    /// Roll and pitch trims [rad]
    pub trims: [f32; 2],
    pub high_rates: bool,
}

/// How a single axis is flown.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum AxisMode {
    Rate,
    Level,
    Horizon,
}

pub struct SetpointGenerator {
    rates: RatesCfg,
    level: LevelCfg,
    angle_pids: [AnglePid; 2],
}

impl SetpointGenerator {
    pub fn new(rates: RatesCfg, level: LevelCfg, ts: f32) -> Self {
        let angle_pid =
            AnglePid::new(level.angle_pid, ts).set_output_limit(level.max_rate * DEG_TO_RAD);
        Self {
            rates,
            level,
            angle_pids: [angle_pid; 2],
        }
    }

    pub fn reset(&mut self) {
        self.angle_pids.iter_mut().for_each(AnglePid::reset);
    }

    pub fn setpoints(&mut self, inputs: &SetpointInputs) -> [f32; 3] {
        let sticks = inputs.sticks.map(|s| if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 });

        let acro = [Axis::Roll, Axis::Pitch, Axis::Yaw]
            .map(|axis| self.rates.rate_setpoint(sticks[axis.index()], axis, inputs.high_rates));

        // Without an attitude there is nothing to level against
        let Some(attitude) = inputs.attitude else {
            self.reset();
            return acro;
        };

        let modes = match inputs.mode {
            FlightMode::Acro => [AxisMode::Rate; 2],
            FlightMode::Angle => [AxisMode::Level; 2],
            FlightMode::Horizon => [AxisMode::Horizon; 2],
            FlightMode::Race => [AxisMode::Level, AxisMode::Rate],
            FlightMode::RaceHorizon => [AxisMode::Horizon, AxisMode::Rate],
        };

        let acro_share = self.horizon_acro_share(&sticks, &attitude);

        let mut setpoints = acro;
        for (i, mode) in modes.iter().enumerate() {
            if *mode == AxisMode::Rate {
                self.angle_pids[i].reset();
                continue;
            }

            let target = sticks[i] * self.level.max_angle * DEG_TO_RAD + inputs.trims[i];
            let level = self.angle_pids[i].update(target - attitude[i]);

            setpoints[i] = match mode {
                AxisMode::Horizon => level * (1.0 - acro_share) + acro[i] * acro_share,
                _ => level,
            };
        }
        setpoints
    }

    /// Share of acro in horizon mode, growing with stick deflection and
    /// with inclination.
    fn horizon_acro_share(&self, sticks: &[f32; 3], attitude: &[f32; 2]) -> f32 {
        let deflection = sticks[0].abs().max(sticks[1].abs());
        let inclination = attitude[0].abs().max(attitude[1].abs());
        let tilt = inclination / (self.level.horizon_transition * DEG_TO_RAD);
        deflection.max(tilt).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    const TS: f32 = 0.001;

    fn inputs(sticks: [f32; 3], mode: FlightMode, attitude: [f32; 2]) -> SetpointInputs {
        SetpointInputs {
            sticks,
            mode,
            attitude: mode.is_leveling().then_some(attitude),
            trims: [0.0; 2],
            high_rates: true,
        }
    }

    #[test]
    fn mode_resolution() {
        let aux = |leveling, horizon, race| AuxState {
            leveling,
            horizon,
            race,
            ..Default::default()
        };
        assert_eq!(resolve_mode(&aux(false, true, true)), FlightMode::Acro);
        assert_eq!(resolve_mode(&aux(true, false, false)), FlightMode::Angle);
        assert_eq!(resolve_mode(&aux(true, true, false)), FlightMode::Horizon);
        assert_eq!(resolve_mode(&aux(true, false, true)), FlightMode::Race);
        assert_eq!(resolve_mode(&aux(true, true, true)), FlightMode::RaceHorizon);
    }

    #[test]
    fn acro_uses_rate_curve() {
        let mut generator =
            SetpointGenerator::new(RatesCfg::const_default(), LevelCfg::const_default(), TS);
        let sp = generator.setpoints(&inputs([0.5, -1.0, 0.25], FlightMode::Acro, [0.0; 2]));
        let rates = RatesCfg::const_default();
        assert_relative_eq!(sp[0], rates.rate_setpoint(0.5, Axis::Roll, true));
        assert_relative_eq!(sp[1], -720.0 * DEG_TO_RAD, epsilon = 1e-4);
        assert_relative_eq!(sp[2], rates.rate_setpoint(0.25, Axis::Yaw, true));
    }

    #[test]
    fn angle_mode_levels_and_limits_rate() {
        let mut generator =
            SetpointGenerator::new(RatesCfg::const_default(), LevelCfg::const_default(), TS);

        // Rolled right by 0.1 rad, centered sticks command a roll back left
        let sp = generator.setpoints(&inputs([0.0; 3], FlightMode::Angle, [0.1, 0.0]));
        assert!(sp[0] < 0.0);
        assert_eq!(sp[1], 0.0);

        // Full stick while level saturates at the level max rate
        generator.reset();
        let sp = generator.setpoints(&inputs([1.0, 0.0, 0.0], FlightMode::Angle, [0.0; 2]));
        assert_relative_eq!(sp[0], 230.0 * DEG_TO_RAD);
    }

    #[test]
    fn yaw_is_always_rate() {
        let mut generator =
            SetpointGenerator::new(RatesCfg::const_default(), LevelCfg::const_default(), TS);
        let expected = RatesCfg::const_default().rate_setpoint(0.3, Axis::Yaw, true);
        for mode in [
            FlightMode::Acro,
            FlightMode::Angle,
            FlightMode::Horizon,
            FlightMode::Race,
            FlightMode::RaceHorizon,
        ] {
            let sp = generator.setpoints(&inputs([0.0, 0.0, 0.3], mode, [0.2, 0.2]));
            assert_eq!(sp[2], expected);
        }
    }

    #[test]
    fn race_levels_roll_only() {
        let mut generator =
            SetpointGenerator::new(RatesCfg::const_default(), LevelCfg::const_default(), TS);
        let sp = generator.setpoints(&inputs([0.0, 0.5, 0.0], FlightMode::Race, [0.0, 0.3]));
        assert_eq!(sp[0], 0.0);
        assert_relative_eq!(
            sp[1],
            RatesCfg::const_default().rate_setpoint(0.5, Axis::Pitch, true)
        );
    }

    #[test]
    fn horizon_hands_over_to_acro_at_full_stick() {
        let mut generator =
            SetpointGenerator::new(RatesCfg::const_default(), LevelCfg::const_default(), TS);
        let sp = generator.setpoints(&inputs([1.0, 0.0, 0.0], FlightMode::Horizon, [0.0; 2]));
        assert_relative_eq!(sp[0], 720.0 * DEG_TO_RAD, epsilon = 1e-4);

        // Centered sticks while level is pure leveling
        generator.reset();
        let sp = generator.setpoints(&inputs([0.0; 3], FlightMode::Horizon, [0.1, 0.0]));
        let mut angle = SetpointGenerator::new(RatesCfg::const_default(), LevelCfg::const_default(), TS);
        let level = angle.setpoints(&inputs([0.0; 3], FlightMode::Angle, [0.1, 0.0]));
        assert!(sp[0] < 0.0 && sp[0] > level[0]);
    }

    #[test]
    fn missing_attitude_falls_back_to_acro() {
        let mut generator =
            SetpointGenerator::new(RatesCfg::const_default(), LevelCfg::const_default(), TS);
        let sp = generator.setpoints(&SetpointInputs {
            attitude: None,
            ..inputs([0.5, 0.0, 0.0], FlightMode::Angle, [0.0; 2])
        });
        assert_relative_eq!(
            sp[0],
            RatesCfg::const_default().rate_setpoint(0.5, Axis::Roll, true)
        );
    }
}
