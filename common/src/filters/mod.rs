pub mod angle_pid;
pub mod kalman;
pub mod rate_pid;
pub mod statistics;

use core::array::from_fn;
use core::f32::consts::PI;
#[allow(unused_imports)]
use num_traits::Float;
use serde::{Deserialize, Serialize};

pub trait SisoFilter {
    type Type;
    fn update(&mut self, input: Self::Type) -> Self::Type;
}

/// Time constant of a first order filter with the given cutoff frequency.
/// Returns zero (pass-through) when the cutoff is at or above Nyquist.
pub fn cutoff_to_tau(cutoff_hz: f32, dt: f32) -> f32 {
    if cutoff_hz * dt >= 0.5 {
        0.0
    } else {
        1.0 / (2.0 * PI * cutoff_hz)
    }
}

#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Lowpass<T: Float> {
    tau: T,
    dt: T,
    y: T,
    alpha0: T,
    alpha1: T,
}

impl<T: Float> Lowpass<T> {
    pub fn new(tau: T, dt: T) -> Self {
        let alpha0 = dt / (tau + dt);
        let alpha1 = T::one() - alpha0;
        Self {
            tau,
            dt,
            y: T::zero(),
            alpha0,
            alpha1,
        }
    }

    pub fn set_dt(&mut self, dt: T) {
        self.dt = dt;
        self.alpha0 = dt / (self.tau + dt);
        self.alpha1 = T::one() - self.alpha0;
    }

    /// The gain applied to every new input, in `(0, 1]`
    pub fn alpha(&self) -> T {
        self.alpha0
    }

    /// Overwrite the filter state, e.g. to start from a known value.
    pub fn reset(&mut self, y: T) {
        self.y = y;
    }

    pub fn update(&mut self, x: T) -> T {
        self.y = self.alpha0 * x + self.alpha1 * self.y;
        self.y
    }
}

impl Lowpass<f32> {
    /// First order low-pass (PT1) from a cutoff frequency in Hz. A cutoff
    /// at or above half the sample rate yields a pass-through filter.
    pub fn from_cutoff(cutoff_hz: f32, dt: f32) -> Self {
        Self::new(cutoff_to_tau(cutoff_hz, dt), dt)
    }
}

impl<F: Float> SisoFilter for Lowpass<F> {
    type Type = F;
    fn update(&mut self, input: Self::Type) -> Self::Type {
        self.update(input)
    }
}

#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NthOrderLowpass<T: Float, const N: usize> {
    filters: [Lowpass<T>; N],
}

impl<T: Float, const N: usize> NthOrderLowpass<T, N> {
    pub fn new(tau: T, dt: T) -> Self {
        Self {
            filters: from_fn(|_| Lowpass::new(tau, dt)),
        }
    }

    pub fn set_dt(&mut self, dt: T) {
        for filter in self.filters.iter_mut() {
            filter.set_dt(dt);
        }
    }

    pub fn update(&mut self, x: T) -> T {
        let mut y = x;
        for filter in self.filters.iter_mut() {
            y = filter.update(y);
        }
        y
    }
}

impl<F: Float, const N: usize> SisoFilter for NthOrderLowpass<F, N> {
    type Type = F;
    fn update(&mut self, input: Self::Type) -> Self::Type {
        self.update(input)
    }
}

/// Affine linear function of the form `factor * x + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Linear<T: Float + Serialize> {
    factor: T,
    offset: T,
}

impl Linear<f32> {
    pub const fn const_default() -> Self {
        Self {
            factor: 1.0,
            offset: 0.0,
        }
    }

    pub const fn new(in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> Self {
        let mut new = Self::const_default();
        new.set(in_min, in_max, out_min, out_max);
        new
    }

    // Change the mapping of the linear function
    pub const fn set(&mut self, in_min: f32, in_max: f32, out_min: f32, out_max: f32) {
        self.factor = (out_max - out_min) / (in_max - in_min);
        self.offset = out_min - in_min * (out_max - out_min) / (in_max - in_min);
    }

    pub const fn map(&self, sig: f32) -> f32 {
        sig * self.factor + self.offset
    }
}
