use common::filters::Lowpass;
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

type E = Box<dyn std::error::Error>;

/// Imperfections of a three-axis sensor. Every field is optional.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistortConfig {
    /// Standard deviation of white noise, per axis
    pub noise: Option<[f32; 3]>,
    /// Constant offset, per axis
    pub bias: Option<[f32; 3]>,
    /// Cutoff of the sensor's internal low-pass [Hz]
    pub lowpass_hz: Option<f32>,
    /// Full scale of a 16-bit reading, which quantizes and clips the output
    pub range: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct Distortion {
    noise: Option<[Normal<f32>; 3]>,
    bias: Option<Vector3<f32>>,
    dlpf: Option<[Lowpass<f32>; 3]>,
    range: Option<f32>,
    rng: StdRng,
}

impl Distortion {
    pub fn new(cfg: &DistortConfig, dt: f32, seed: u64) -> Result<Self, E> {
        if let Some(noise) = cfg.noise {
            if noise.iter().any(|std| !(std.is_finite() && *std >= 0.0)) {
                return Err(format!("sensor noise must be non-negative, got {noise:?}").into());
            }
        }

        let noise = match cfg.noise {
            Some(noise) => Some([
                Normal::new(0.0, noise[0])?,
                Normal::new(0.0, noise[1])?,
                Normal::new(0.0, noise[2])?,
            ]),
            None => None,
        };

        if let Some(range) = cfg.range {
            if !(range.is_finite() && range > 0.0) {
                return Err(format!("sensor range must be positive, got {range}").into());
            }
        }

        Ok(Self {
            noise,
            bias: cfg.bias.map(Vector3::from),
            dlpf: cfg
                .lowpass_hz
                .map(|hz| [Lowpass::from_cutoff(hz, dt); 3]),
            range: cfg.range,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// A sensor which reads the truth.
    pub fn ideal() -> Self {
        Self {
            noise: None,
            bias: None,
            dlpf: None,
            range: None,
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn apply(&mut self, input: impl Into<Vector3<f32>>) -> Vector3<f32> {
        let mut output = input.into();

        if let Some(noise) = &self.noise {
            let rng = &mut self.rng;
            output += Vector3::new(
                noise[0].sample(rng),
                noise[1].sample(rng),
                noise[2].sample(rng),
            );
        }

        if let Some(bias) = self.bias {
            output += bias;
        }

        if let Some(dlpf) = self.dlpf.as_mut() {
            output = Vector3::new(
                dlpf[0].update(output.x),
                dlpf[1].update(output.y),
                dlpf[2].update(output.z),
            );
        }

        if let Some(range) = self.range {
            let lsb = range / i16::MAX as f32;
            output = output.map(|v| ((v / lsb).round() * lsb).clamp(-range, range));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn ideal_passes_through() {
        let mut ideal = Distortion::ideal();
        let input = Vector3::new(0.1, -2.0, 30.0);
        assert_eq!(ideal.apply(input), input);
    }

    #[test]
    fn bias_and_clipping() {
        let cfg = DistortConfig {
            bias: Some([0.5, 0.0, 0.0]),
            range: Some(10.0),
            ..Default::default()
        };
        let mut distortion = Distortion::new(&cfg, 0.001, 0).unwrap();
        let out = distortion.apply(Vector3::new(1.0, 20.0, -20.0));
        assert_relative_eq!(out.x, 1.5, epsilon = 1e-3);
        assert_eq!(out.y, 10.0);
        assert_eq!(out.z, -10.0);
    }

    #[test]
    fn seeded_noise_is_repeatable() {
        let cfg = DistortConfig {
            noise: Some([0.1; 3]),
            ..Default::default()
        };
        let mut a = Distortion::new(&cfg, 0.001, 7).unwrap();
        let mut b = Distortion::new(&cfg, 0.001, 7).unwrap();
        for _ in 0..10 {
            assert_eq!(a.apply(Vector3::zeros()), b.apply(Vector3::zeros()));
        }
    }

    #[test]
    fn negative_noise_rejected() {
        let cfg = DistortConfig {
            noise: Some([0.1, -1.0, 0.1]),
            ..Default::default()
        };
        assert!(Distortion::new(&cfg, 0.001, 0).is_err());
    }

    #[test]
    fn non_finite_noise_rejected() {
        let cfg = DistortConfig {
            noise: Some([0.1, 0.1, f32::NAN]),
            ..Default::default()
        };
        assert!(Distortion::new(&cfg, 0.001, 0).is_err());

        let cfg = DistortConfig {
            noise: Some([0.0, 0.0, 0.0]),
            ..Default::default()
        };
        assert!(Distortion::new(&cfg, 0.001, 0).is_ok());
    }
}
