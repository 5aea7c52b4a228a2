//! Static configuration of the flight core, resolved once before the
//! control loop is built.

use serde::{Deserialize, Serialize};

use crate::airframe::MixerCfg;
use crate::battery::BatteryCfg;
use crate::conditioner::FilterPreset;
use crate::consts::LOOP_PERIOD_US;
use crate::errors::ConfigError;
use crate::estimator::EstimatorCfg;
use crate::flight_modes::controller::RateControlCfg;
use crate::flight_modes::LevelCfg;
use crate::flight_state::FlightStateCfg;
use crate::gesture::GestureCfg;
use crate::rc_mapping::rates::RatesCfg;
use crate::rc_mapping::AuxMap;

/// Shortest supported loop period [us]
pub const MIN_LOOP_PERIOD_US: u32 = 100;

/// Longest supported loop period [us]
pub const MAX_LOOP_PERIOD_US: u32 = 20_000;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(default)]
pub struct Config {
    pub loop_period_us: u32,
    pub filters: FilterPreset,
    pub rates: RatesCfg,
    pub aux: AuxMap,
    pub level: LevelCfg,
    pub rate_control: RateControlCfg,
    pub estimator: EstimatorCfg,
    pub mixer: MixerCfg,
    pub battery: BatteryCfg,
    pub flight_state: FlightStateCfg,
    pub gesture: GestureCfg,
}

crate::const_default!(
    Config => {
        loop_period_us: LOOP_PERIOD_US,
        filters: FilterPreset::AlienwhoopZero,
        rates: RatesCfg::const_default(),
        aux: AuxMap::const_default(),
        level: LevelCfg::const_default(),
        rate_control: RateControlCfg::const_default(),
        estimator: EstimatorCfg::const_default(),
        mixer: MixerCfg::const_default(),
        battery: BatteryCfg::const_default(),
        flight_state: FlightStateCfg::const_default(),
        gesture: GestureCfg::const_default(),
    }
);

impl Config {
    /// Loop period [s]
    pub fn dt(&self) -> f32 {
        self.loop_period_us as f32 * 1e-6
    }

    /// Reject every configuration which cannot produce a stable loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_LOOP_PERIOD_US..=MAX_LOOP_PERIOD_US).contains(&self.loop_period_us) {
            return Err(ConfigError::InvalidLoopPeriod(self.loop_period_us));
        }

        let filters = self.filters.resolve();
        for cutoff in filters.cutoffs() {
            if !(cutoff.is_finite() && cutoff > 0.0) {
                return Err(ConfigError::InvalidCutoff(cutoff));
            }
        }

        self.rates.sanity_check()?;
        self.aux.sanity_check()?;
        self.level.sanity_check()?;
        self.rate_control
            .with_d_filter(filters.d_filter)
            .sanity_check()?;
        self.battery.sanity_check()?;
        self.flight_state.sanity_check()?;
        self.gesture.sanity_check()?;

        let est = &self.estimator;
        if !(est.tau.is_finite() && est.tau > 0.0) || !(est.max_dt > 0.0) {
            return Err(ConfigError::InvalidThreshold("estimator.tau"));
        }
        if !(est.acc_trust_band.is_finite() && est.acc_trust_band > 0.0) {
            return Err(ConfigError::InvalidThreshold("estimator.acc_trust_band"));
        }
        if !(est.acc_min_g < est.acc_max_g && est.acc_min_g >= 0.0) {
            return Err(ConfigError::InvalidThreshold("estimator.acc_range"));
        }

        let mixer = &self.mixer;
        if !(0.0..1.0).contains(&mixer.motor_min) {
            return Err(ConfigError::InvalidThreshold("mixer.motor_min"));
        }
        let limits = [mixer.lower_throttle_max, mixer.boost_max, mixer.clip_carry_max];
        if limits
            .iter()
            .flatten()
            .any(|limit| !(limit.is_finite() && *limit >= 0.0 && *limit <= 1.0))
        {
            return Err(ConfigError::InvalidThreshold("mixer.limits"));
        }

        Ok(())
    }
}
