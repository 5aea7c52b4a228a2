#[allow(unused_imports)]
use num_traits::Float;
use serde::{Deserialize, Serialize};

use crate::consts::DEG_TO_RAD;
use crate::errors::ConfigError;
use crate::types::control::Axis;
use crate::utils::func::deadband;

/// Maps a stick deflection in `[-1, 1]` onto a rate [deg/s].
pub trait RatesTrait {
    fn apply(&self, input: f32) -> f32;
}

/// Rate curve parameters of a single axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Rates {
    /// Cubic expo, `max * (e * x^3 + (1 - e) * x)`
    Expo(Expo),
    /// RC-rate, super-rate and expo as known from Betaflight
    Betaflight(Betaflight),
    /// Actual rates provide an "expo" response with a fixed center sensitivity
    Actual(Actual),
}

impl RatesTrait for Rates {
    fn apply(&self, input: f32) -> f32 {
        match self {
            Rates::Expo(expo) => expo.apply(input),
            Rates::Betaflight(bf) => bf.apply(input),
            Rates::Actual(actual) => actual.apply(input),
        }
    }
}

impl Rates {
    pub fn sanity_check(&self, name: &'static str) -> Result<(), ConfigError> {
        let in_unit = |value: f32| (0.0..=1.0).contains(&value);
        let positive = |value: f32| value.is_finite() && value > 0.0;
        match self {
            Rates::Expo(expo) => {
                if !positive(expo.max_rate) {
                    return Err(ConfigError::InvalidRate(name));
                }
                if !in_unit(expo.expo) {
                    return Err(ConfigError::InvalidExpo(name));
                }
            }
            Rates::Betaflight(bf) => {
                if !positive(bf.rc_rate) || !(0.0..1.0).contains(&bf.super_rate) {
                    return Err(ConfigError::InvalidRate(name));
                }
                if !in_unit(bf.expo) {
                    return Err(ConfigError::InvalidExpo(name));
                }
            }
            Rates::Actual(actual) => {
                if !positive(actual.rate) || actual.cent > actual.rate {
                    return Err(ConfigError::InvalidRate(name));
                }
                if !in_unit(actual.expo) {
                    return Err(ConfigError::InvalidExpo(name));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Expo {
    /// Rate at full deflection [deg/s]
    pub max_rate: f32,
    /// Share of the cubic term, in `[0, 1]`
    pub expo: f32,
}

impl RatesTrait for Expo {
    fn apply(&self, x: f32) -> f32 {
        self.max_rate * (x * x * x * self.expo + x * (1.0 - self.expo))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Betaflight {
    pub rc_rate: f32,
    pub super_rate: f32,
    pub expo: f32,
}

impl RatesTrait for Betaflight {
    fn apply(&self, x: f32) -> f32 {
        let abs = x.abs();
        let shaped = x * abs * abs * abs * self.expo + x * (1.0 - self.expo);
        let rate = 200.0 * self.rc_rate * shaped;
        let boost = 1.0 / (1.0 - abs * self.super_rate).clamp(0.01, 1.0);
        rate * boost
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Actual {
    /// Rate at maximum deflection [deg/s]
    pub rate: f32,

    /// Expo pushes the effect of `rate` further from the center
    pub expo: f32,

    /// Sensitivity of input values around center [deg/s]
    pub cent: f32,
}

impl RatesTrait for Actual {
    fn apply(&self, val: f32) -> f32 {
        self.cent * val
            + (self.rate - self.cent)
                * (val.abs() * (val.powi(5) * self.expo + val * (1.0 - self.expo)))
    }
}

/// Stick to rate setpoint mapping of all three axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RatesCfg {
    pub roll: Rates,
    pub pitch: Rates,
    pub yaw: Rates,
    /// Multiplier applied while the high-rates switch is off
    pub low_rates_multiplier: f32,
    /// Stick deadband around center
    pub deadband: f32,
}

crate::const_default!(
    RatesCfg => {
        roll: Rates::Expo(Expo { max_rate: 720.0, expo: 0.0 }),
        pitch: Rates::Expo(Expo { max_rate: 720.0, expo: 0.0 }),
        yaw: Rates::Expo(Expo { max_rate: 900.0, expo: 0.0 }),
        low_rates_multiplier: 0.7,
        deadband: 0.002,
    }
);

impl RatesCfg {
    pub fn axis(&self, axis: Axis) -> &Rates {
        match axis {
            Axis::Roll => &self.roll,
            Axis::Pitch => &self.pitch,
            Axis::Yaw => &self.yaw,
        }
    }

    /// Rate setpoint [rad/s] for a stick deflection on `axis`
    pub fn rate_setpoint(&self, stick: f32, axis: Axis, high_rates: bool) -> f32 {
        let stick = deadband(stick.clamp(-1.0, 1.0), self.deadband);
        let multiplier = if high_rates {
            1.0
        } else {
            self.low_rates_multiplier
        };
        self.axis(axis).apply(stick) * multiplier * DEG_TO_RAD
    }

    pub fn sanity_check(&self) -> Result<(), ConfigError> {
        self.roll.sanity_check("rates.roll")?;
        self.pitch.sanity_check("rates.pitch")?;
        self.yaw.sanity_check("rates.yaw")?;
        if !(self.low_rates_multiplier > 0.0 && self.low_rates_multiplier <= 1.0) {
            return Err(ConfigError::InvalidThreshold("rates.low_rates_multiplier"));
        }
        if !(0.0..0.5).contains(&self.deadband) {
            return Err(ConfigError::InvalidThreshold("rates.deadband"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn full_deflection_without_expo_is_max_rate() {
        let rates = RatesCfg::const_default();
        let sp = rates.rate_setpoint(1.0, Axis::Roll, true);
        assert_relative_eq!(sp, 720.0 * DEG_TO_RAD);
        let sp = rates.rate_setpoint(-1.0, Axis::Yaw, true);
        assert_relative_eq!(sp, -900.0 * DEG_TO_RAD);
    }

    #[test]
    fn expo_reduces_half_deflection() {
        let linear = RatesCfg::const_default();
        let expo = RatesCfg {
            roll: Rates::Expo(Expo {
                max_rate: 720.0,
                expo: 0.4,
            }),
            ..linear
        };
        let lin_sp = linear.rate_setpoint(0.5, Axis::Roll, true);
        let expo_sp = expo.rate_setpoint(0.5, Axis::Roll, true);
        assert!(expo_sp.abs() < lin_sp.abs());
        assert_relative_eq!(
            expo.rate_setpoint(1.0, Axis::Roll, true),
            linear.rate_setpoint(1.0, Axis::Roll, true),
            epsilon = 1e-4
        );
    }

    #[test]
    fn low_rates_scale_output() {
        let rates = RatesCfg::const_default();
        let high = rates.rate_setpoint(1.0, Axis::Pitch, true);
        let low = rates.rate_setpoint(1.0, Axis::Pitch, false);
        assert_relative_eq!(low, high * 0.7, epsilon = 1e-4);
    }

    #[test]
    fn betaflight_rates_at_center_and_full() {
        let bf = Betaflight {
            rc_rate: 1.0,
            super_rate: 0.7,
            expo: 0.0,
        };
        assert_eq!(bf.apply(0.0), 0.0);
        assert_relative_eq!(bf.apply(1.0), 200.0 / 0.3, epsilon = 1e-2);
    }

    #[test]
    fn deadband_zeroes_center() {
        let rates = RatesCfg::const_default();
        assert_eq!(rates.rate_setpoint(0.001, Axis::Roll, true), 0.0);
    }

    #[test]
    fn invalid_expo_rejected() {
        let rates = RatesCfg {
            yaw: Rates::Expo(Expo {
                max_rate: 900.0,
                expo: 1.5,
            }),
            ..RatesCfg::const_default()
        };
        assert_eq!(rates.sanity_check(), Err(ConfigError::InvalidExpo("rates.yaw")));
    }
}
