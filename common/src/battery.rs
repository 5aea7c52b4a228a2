//! Cell voltage filtering, sag compensation and low-voltage detection.

use serde::{Deserialize, Serialize};

use crate::consts::{VCOMP_HIGH_V, VCOMP_LOW_V, VCOMP_MAX};
use crate::errors::ConfigError;
use crate::filters::Lowpass;
use crate::utils::func::linear_map_clamped;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatteryCfg {
    /// Cutoff of the cell voltage low-pass [Hz]
    pub filter_cutoff_hz: f32,
    /// Voltage sag per unit of throttle [V], added back before the
    /// low-voltage checks
    pub vdrop_factor: f32,
    /// Compensated voltage below which the cutoff activates [V]
    pub lvc_voltage: f32,
    /// Uncompensated voltage below which the cutoff always activates [V]
    pub lvc_raw_voltage: f32,
    /// Extra landing throttle decay per volt below `lvc_raw_voltage` [1/(V s)]
    pub lvc_kp: f32,
    /// Compensated voltage below which a low battery is reported [V]
    pub warn_voltage: f32,
    /// The warning clears above `warn_voltage + warn_hysteresis` [V]
    pub warn_hysteresis: f32,
    /// Scale controller outputs up as the battery drains
    pub voltage_compensation: bool,
}

crate::const_default!(
    BatteryCfg => {
        filter_cutoff_hz: 2.0,
        vdrop_factor: 0.7,
        lvc_voltage: 3.30,
        lvc_raw_voltage: 2.70,
        lvc_kp: 3.0,
        warn_voltage: 3.5,
        warn_hysteresis: 0.10,
        voltage_compensation: true,
    }
);

impl BatteryCfg {
    pub fn sanity_check(&self) -> Result<(), ConfigError> {
        let positive = |v: f32| v.is_finite() && v > 0.0;
        if !positive(self.filter_cutoff_hz) {
            return Err(ConfigError::InvalidCutoff(self.filter_cutoff_hz));
        }
        if !(self.vdrop_factor.is_finite() && self.vdrop_factor >= 0.0) {
            return Err(ConfigError::InvalidThreshold("battery.vdrop_factor"));
        }
        if !positive(self.lvc_voltage) || !positive(self.lvc_raw_voltage) {
            return Err(ConfigError::InvalidThreshold("battery.lvc_voltage"));
        }
        if !(self.lvc_kp.is_finite() && self.lvc_kp >= 0.0) {
            return Err(ConfigError::InvalidThreshold("battery.lvc_kp"));
        }
        if !positive(self.warn_voltage) || !(self.warn_hysteresis >= 0.0) {
            return Err(ConfigError::InvalidThreshold("battery.warn_voltage"));
        }
        Ok(())
    }
}

/// Battery state of a single tick.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatteryState {
    /// Low-passed cell voltage [V]
    pub filtered: f32,
    /// Filtered voltage with the load sag added back [V]
    pub compensated: f32,
    /// Controller output multiplier in `[1.0, 1.33]`
    pub v_comp: f32,
    /// The low-voltage cutoff condition is met
    pub lvc: bool,
    /// The low battery warning is active
    pub low: bool,
}

/// Low battery warning transitions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WarningChange {
    Raised,
    Cleared,
}

pub struct BatteryMonitor {
    cfg: BatteryCfg,
    filter: Lowpass<f32>,
    initialized: bool,
    low: bool,
    startup_low: bool,
    state: BatteryState,
}

impl BatteryMonitor {
    pub fn new(cfg: BatteryCfg, dt: f32) -> Self {
        Self {
            cfg,
            filter: Lowpass::from_cutoff(cfg.filter_cutoff_hz, dt),
            initialized: false,
            low: false,
            startup_low: false,
            state: BatteryState {
                v_comp: 1.0,
                ..Default::default()
            },
        }
    }

    /// Feed the latest cell voltage and the throttle in use. Returns a
    /// warning change, if any occurred on this update.
    pub fn update(&mut self, cell_voltage: f32, throttle: f32) -> Option<WarningChange> {
        if !cell_voltage.is_finite() {
            return None;
        }

        // Start from the first reading, rather than ramping up from zero
        if !self.initialized {
            self.filter.reset(cell_voltage);
            self.initialized = true;
            self.startup_low = cell_voltage < self.cfg.lvc_voltage;
        }

        let filtered = self.filter.update(cell_voltage);
        let compensated = filtered + self.cfg.vdrop_factor * throttle.clamp(0.0, 1.0);

        let v_comp = if self.cfg.voltage_compensation {
            linear_map_clamped(filtered, VCOMP_LOW_V, VCOMP_HIGH_V, VCOMP_MAX, 1.0)
        } else {
            1.0
        };

        let lvc = compensated < self.cfg.lvc_voltage || filtered < self.cfg.lvc_raw_voltage;

        let change = if !self.low && compensated < self.cfg.warn_voltage {
            self.low = true;
            Some(WarningChange::Raised)
        } else if self.low && compensated > self.cfg.warn_voltage + self.cfg.warn_hysteresis {
            self.low = false;
            Some(WarningChange::Cleared)
        } else {
            None
        };

        self.state = BatteryState {
            filtered,
            compensated,
            v_comp,
            lvc,
            low: self.low,
        };

        change
    }

    pub fn state(&self) -> &BatteryState {
        &self.state
    }

    /// No reading has been received yet
    pub fn is_pending(&self) -> bool {
        !self.initialized
    }

    /// The very first reading was already below the cutoff voltage
    pub fn startup_low(&self) -> bool {
        self.startup_low
    }

    /// Additional landing throttle decay rate [1/s] from a deeply drained
    /// battery.
    pub fn landing_decay(&self) -> f32 {
        if !self.initialized {
            return 0.0;
        }
        self.cfg.lvc_kp * (self.cfg.lvc_raw_voltage - self.state.filtered).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    const DT: f32 = 0.001;

    #[test]
    fn v_comp_maps_voltage_range() {
        let mut full = BatteryMonitor::new(BatteryCfg::const_default(), DT);
        full.update(4.2, 0.0);
        assert_relative_eq!(full.state().v_comp, 1.0);

        let mut empty = BatteryMonitor::new(BatteryCfg::const_default(), DT);
        empty.update(2.9, 0.0);
        assert_relative_eq!(empty.state().v_comp, 1.33);

        let mut half = BatteryMonitor::new(BatteryCfg::const_default(), DT);
        half.update(3.5, 0.0);
        assert_relative_eq!(half.state().v_comp, 1.165, epsilon = 1e-4);
    }

    #[test]
    fn sag_under_load_does_not_trigger_cutoff() {
        let mut monitor = BatteryMonitor::new(BatteryCfg::const_default(), DT);
        // 3.2 V at 50 % throttle compensates to 3.55 V
        monitor.update(3.2, 0.5);
        assert!(!monitor.state().lvc);
        monitor.update(3.2, 0.0);
        assert!(monitor.state().lvc);
    }

    #[test]
    fn raw_threshold_overrides_compensation() {
        let mut monitor = BatteryMonitor::new(BatteryCfg::const_default(), DT);
        monitor.update(2.65, 1.0);
        assert!(monitor.state().lvc);
        assert!(monitor.landing_decay() > 0.0);
    }

    #[test]
    fn warning_has_hysteresis() {
        let mut monitor = BatteryMonitor::new(
            BatteryCfg {
                filter_cutoff_hz: 1000.0,
                ..BatteryCfg::const_default()
            },
            DT,
        );
        assert_eq!(monitor.update(3.8, 0.0), None);
        assert_eq!(monitor.update(3.45, 0.0), Some(WarningChange::Raised));
        assert_eq!(monitor.update(3.55, 0.0), None);
        assert!(monitor.state().low);
        assert_eq!(monitor.update(3.65, 0.0), Some(WarningChange::Cleared));
    }

    #[test]
    fn startup_low_is_latched_from_first_reading() {
        let mut monitor = BatteryMonitor::new(BatteryCfg::const_default(), DT);
        assert!(monitor.is_pending());
        monitor.update(3.1, 0.0);
        assert!(monitor.startup_low());
    }
}
