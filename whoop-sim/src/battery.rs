use common::NUM_MOTORS;
use serde::{Deserialize, Serialize};

/// Single cell lipo with a state of charge and internal resistance.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryParams {
    /// Capacity [mAh]
    pub capacity_mah: f32,
    /// Initial state of charge, in `[0, 1]`
    pub initial_soc: f32,
    /// Internal resistance [ohm]
    pub internal_resistance: f32,
    /// Current drawn with all motors at full duty [A]
    pub max_current: f32,
}

impl Default for BatteryParams {
    fn default() -> Self {
        Self {
            capacity_mah: 300.0,
            initial_soc: 1.0,
            internal_resistance: 0.08,
            max_current: 6.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatteryModel {
    params: BatteryParams,
    soc: f32,
    current: f32,
}

impl BatteryModel {
    pub fn new(params: BatteryParams) -> Self {
        Self {
            params,
            soc: params.initial_soc.clamp(0.0, 1.0),
            current: 0.0,
        }
    }

    /// Draw the current of the given duties for `dt` seconds.
    pub fn step(&mut self, duties: &[f32; NUM_MOTORS], dt: f32) {
        let mean = duties.iter().sum::<f32>() / NUM_MOTORS as f32;
        self.current = self.params.max_current * mean.clamp(0.0, 1.0);
        let used_mah = self.current * 1000.0 * dt / 3600.0;
        self.soc = (self.soc - used_mah / self.params.capacity_mah).max(0.0);
    }

    pub fn soc(&self) -> f32 {
        self.soc
    }

    pub fn set_soc(&mut self, soc: f32) {
        self.soc = soc.clamp(0.0, 1.0);
    }

    /// Terminal voltage under the present load [V]
    pub fn cell_voltage(&self) -> f32 {
        open_circuit_voltage(self.soc) - self.current * self.params.internal_resistance
    }
}

/// Rough lipo discharge curve, flat in the middle and steep at the ends.
fn open_circuit_voltage(soc: f32) -> f32 {
    const CURVE: [(f32, f32); 5] = [(0.0, 3.0), (0.1, 3.55), (0.5, 3.8), (0.9, 4.05), (1.0, 4.2)];
    let soc = soc.clamp(0.0, 1.0);
    CURVE
        .windows(2)
        .find(|pair| soc <= pair[1].0)
        .map(|pair| {
            let (s0, v0) = pair[0];
            let (s1, v1) = pair[1];
            v0 + (v1 - v0) * (soc - s0) / (s1 - s0)
        })
        .unwrap_or(CURVE[CURVE.len() - 1].1)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn full_battery_at_rest() {
        let battery = BatteryModel::new(BatteryParams::default());
        assert_relative_eq!(battery.cell_voltage(), 4.2, epsilon = 1e-5);
    }

    #[test]
    fn load_sags_and_drains() {
        let mut battery = BatteryModel::new(BatteryParams::default());
        battery.step(&[0.5; NUM_MOTORS], 0.001);
        assert_relative_eq!(battery.cell_voltage(), 4.2 - 3.0 * 0.08, epsilon = 1e-3);

        // Half a minute at full power empties a good share of the pack
        for _ in 0..30_000 {
            battery.step(&[1.0; NUM_MOTORS], 0.001);
        }
        assert!(battery.soc() < 0.9);
        battery.step(&[0.0; NUM_MOTORS], 0.001);
        assert!(battery.cell_voltage() < 4.1);
    }
}
