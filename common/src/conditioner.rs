//! Per-axis noise filtering of raw gyroscope and accelerometer samples.
//!
//! Every axis owns its own cascade of up to two stages, so noise on one
//! axis never leaks into another. The stage family and cutoffs are chosen
//! once at initialization, either from a named preset or a custom set.

use serde::{Deserialize, Serialize};

use crate::filters::{kalman::Kalman, rate_pid::DtermFilter, Lowpass};
use crate::types::control::Axis;

/// Family of a single conditioning stage.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FilterKind {
    /// Steady-state scalar Kalman estimator
    Kalman,
    /// First order low-pass
    Pt1,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StageCfg {
    pub kind: FilterKind,
    pub cutoff_hz: f32,
}

/// Resolved filter configuration of the gyro, accelerometer and D-term.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FilterConfig {
    pub gyro_pass1: Option<StageCfg>,
    pub gyro_pass2: Option<StageCfg>,
    pub acc_cutoff_hz: f32,
    pub d_filter: DtermFilter,
}

impl FilterConfig {
    const fn kalman(gyro_hz: f32, dterm_hz: f32) -> Self {
        FilterConfig {
            gyro_pass1: Some(StageCfg {
                kind: FilterKind::Kalman,
                cutoff_hz: gyro_hz,
            }),
            gyro_pass2: None,
            acc_cutoff_hz: 10.0,
            d_filter: DtermFilter::SecondOrder { cutoff_hz: dterm_hz },
        }
    }

    /// Every cutoff frequency in this configuration
    pub fn cutoffs(&self) -> impl Iterator<Item = f32> + '_ {
        self.gyro_pass1
            .iter()
            .chain(self.gyro_pass2.iter())
            .map(|stage| stage.cutoff_hz)
            .chain([self.acc_cutoff_hz, self.d_filter.cutoff_hz()])
    }
}

/// Named filter sets. All but `Custom` are fixed tunings for small craft,
/// ordered from least to most filtering.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FilterPreset {
    AlienwhoopZero,
    Weak,
    Strong,
    VeryStrong,
    Custom(FilterConfig),
}

impl FilterPreset {
    pub const fn resolve(&self) -> FilterConfig {
        match self {
            FilterPreset::AlienwhoopZero => FilterConfig::kalman(90.0, 100.0),
            FilterPreset::Weak => FilterConfig::kalman(90.0, 100.0),
            FilterPreset::Strong => FilterConfig::kalman(80.0, 90.0),
            FilterPreset::VeryStrong => FilterConfig::kalman(70.0, 80.0),
            FilterPreset::Custom(config) => *config,
        }
    }
}

#[derive(Debug, Copy, Clone)]
enum Stage {
    Kalman(Kalman),
    Pt1(Lowpass<f32>),
}

impl Stage {
    fn new(cfg: StageCfg, dt: f32) -> Self {
        match cfg.kind {
            FilterKind::Kalman => Stage::Kalman(Kalman::from_cutoff(cfg.cutoff_hz, dt)),
            FilterKind::Pt1 => Stage::Pt1(Lowpass::from_cutoff(cfg.cutoff_hz, dt)),
        }
    }

    fn set_dt(&mut self, dt: f32) {
        match self {
            Stage::Kalman(kalman) => kalman.set_dt(dt),
            Stage::Pt1(lowpass) => lowpass.set_dt(dt),
        }
    }

    fn update(&mut self, x: f32) -> f32 {
        match self {
            Stage::Kalman(kalman) => kalman.update(x),
            Stage::Pt1(lowpass) => lowpass.update(x),
        }
    }
}

#[derive(Debug, Copy, Clone)]
struct Cascade {
    stages: [Option<Stage>; 2],
}

impl Cascade {
    fn set_dt(&mut self, dt: f32) {
        self.stages
            .iter_mut()
            .flatten()
            .for_each(|stage| stage.set_dt(dt));
    }

    fn update(&mut self, x: f32) -> f32 {
        self.stages
            .iter_mut()
            .flatten()
            .fold(x, |y, stage| stage.update(y))
    }
}

/// Sample gaps are accounted for up to this many nominal periods.
const MAX_GAP_PERIODS: f32 = 4.0;

/// Filters raw inertial samples, one independent cascade per axis.
#[derive(Debug, Clone)]
pub struct SampleConditioner {
    cfg: FilterConfig,
    dt: f32,
    gyr: [Cascade; 3],
    gyr_dt: [f32; 3],
    acc: [Lowpass<f32>; 3],
    acc_dt: f32,
}

impl SampleConditioner {
    pub fn new(cfg: FilterConfig, dt: f32) -> Self {
        let cascade = Cascade {
            stages: [
                cfg.gyro_pass1.map(|stage| Stage::new(stage, dt)),
                cfg.gyro_pass2.map(|stage| Stage::new(stage, dt)),
            ],
        };
        let acc = Lowpass::from_cutoff(cfg.acc_cutoff_hz, dt);
        Self {
            cfg,
            dt,
            gyr: [cascade; 3],
            gyr_dt: [dt; 3],
            acc: [acc; 3],
            acc_dt: dt,
        }
    }

    /// Time since the previous sample, bounded to a usable range. Non-finite
    /// or non-positive values fall back to the nominal period.
    fn sanitize_dt(&self, dt: f32) -> f32 {
        if dt.is_finite() && dt > 0.0 {
            dt.min(self.dt * MAX_GAP_PERIODS)
        } else {
            self.dt
        }
    }

    /// Filter a single gyro value of the given axis, `dt` [s] after the
    /// previous one.
    pub fn filter(&mut self, raw: f32, axis: Axis, dt: f32) -> f32 {
        let dt = self.sanitize_dt(dt);
        let i = axis.index();
        if dt != self.gyr_dt[i] {
            self.gyr[i].set_dt(dt);
            self.gyr_dt[i] = dt;
        }
        self.gyr[i].update(raw)
    }

    pub fn filter_gyr(&mut self, raw: [f32; 3], dt: f32) -> [f32; 3] {
        [
            self.filter(raw[0], Axis::Roll, dt),
            self.filter(raw[1], Axis::Pitch, dt),
            self.filter(raw[2], Axis::Yaw, dt),
        ]
    }

    pub fn filter_acc(&mut self, raw: [f32; 3], dt: f32) -> [f32; 3] {
        let dt = self.sanitize_dt(dt);
        if dt != self.acc_dt {
            self.acc.iter_mut().for_each(|lp| lp.set_dt(dt));
            self.acc_dt = dt;
        }
        [
            self.acc[0].update(raw[0]),
            self.acc[1].update(raw[1]),
            self.acc[2].update(raw[2]),
        ]
    }

    /// Drop all filter states. Only used when the controller is rebuilt.
    pub fn reset(&mut self) {
        *self = Self::new(self.cfg, self.dt);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    const DT: f32 = 0.001;

    fn presets() -> [FilterConfig; 5] {
        let pt1_double = FilterConfig {
            gyro_pass1: Some(StageCfg {
                kind: FilterKind::Pt1,
                cutoff_hz: 90.0,
            }),
            gyro_pass2: Some(StageCfg {
                kind: FilterKind::Pt1,
                cutoff_hz: 120.0,
            }),
            acc_cutoff_hz: 10.0,
            d_filter: DtermFilter::FirstOrder { cutoff_hz: 70.0 },
        };
        [
            FilterPreset::AlienwhoopZero.resolve(),
            FilterPreset::Weak.resolve(),
            FilterPreset::Strong.resolve(),
            FilterPreset::VeryStrong.resolve(),
            FilterPreset::Custom(pt1_double).resolve(),
        ]
    }

    #[test]
    fn output_bounded_by_input_range() {
        for cfg in presets() {
            let mut conditioner = SampleConditioner::new(cfg, DT);
            for i in 0..2000 {
                let raw = if (i / 3) % 2 == 0 { 34.9 } else { -34.9 };
                let out = conditioner.filter(raw, Axis::Roll, DT);
                assert!(out.abs() <= 34.9 + 1e-3, "{out} escaped input range");
            }
        }
    }

    #[test]
    fn constant_input_converges() {
        for cfg in presets() {
            let mut conditioner = SampleConditioner::new(cfg, DT);
            let mut out = 0.0;
            for _ in 0..200 {
                out = conditioner.filter(2.5, Axis::Pitch, DT);
            }
            assert_relative_eq!(out, 2.5, epsilon = 1e-3);
        }
    }

    #[test]
    fn axes_do_not_cross_couple() {
        let mut conditioner = SampleConditioner::new(FilterPreset::Weak.resolve(), DT);
        for _ in 0..100 {
            let out = conditioner.filter_gyr([5.0, 0.0, 0.0], DT);
            assert_eq!(out[1], 0.0);
            assert_eq!(out[2], 0.0);
        }
    }

    #[test]
    fn reset_clears_state() {
        let mut conditioner = SampleConditioner::new(FilterPreset::Strong.resolve(), DT);
        for _ in 0..100 {
            conditioner.filter(1.0, Axis::Yaw, DT);
        }
        conditioner.reset();
        assert!(conditioner.filter(0.0, Axis::Yaw, DT).abs() < 1e-9);
    }

    #[test]
    fn late_sample_advances_filter_further() {
        for cfg in presets() {
            let mut nominal = SampleConditioner::new(cfg, DT);
            let mut late = SampleConditioner::new(cfg, DT);
            let a = nominal.filter(1.0, Axis::Roll, DT);
            let b = late.filter(1.0, Axis::Roll, 2.0 * DT);
            assert!(b > a, "{b} should lead {a}");

            let a = nominal.filter_acc([1.0; 3], DT);
            let b = late.filter_acc([1.0; 3], 2.0 * DT);
            assert!(b[2] > a[2]);
        }
    }

    #[test]
    fn unusable_dt_falls_back_to_nominal() {
        let cfg = FilterPreset::Weak.resolve();
        let mut nominal = SampleConditioner::new(cfg, DT);
        let mut odd = SampleConditioner::new(cfg, DT);
        for dt in [0.0, -DT, f32::NAN, f32::INFINITY] {
            assert_eq!(
                odd.filter(1.0, Axis::Yaw, dt),
                nominal.filter(1.0, Axis::Yaw, DT)
            );
        }
    }
}
