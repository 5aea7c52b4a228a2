use num_traits::real::Real;

/// Running IIR estimate of mean and variance, used for loop timing statistics.
#[derive(Debug, Copy, Clone)]
pub struct Statistics<T> {
    initialized: bool,
    alpha: T,
    mean: T,
    variance: T,
}

impl<T> Statistics<T>
where
    T: Real,
{
    /// Creates a new IIR statistics filter.
    /// `alpha` is the smoothing factor, typically a small value (e.g., 0.01).
    /// A smaller alpha means a "slower" filter that remembers more history.
    /// Values outside `(0, 1]` are clamped into that range.
    pub fn new(alpha: T) -> Self {
        let alpha = alpha.max(T::epsilon()).min(T::one());
        Self {
            alpha,
            mean: T::zero(),
            variance: T::zero(),
            initialized: false,
        }
    }

    /// Adds a single sample to the IIR filter
    pub fn add_sample(&mut self, sample: T) {
        if !self.initialized {
            // First sample: Initialize mean to this sample, variance is 0
            self.mean = sample;
            self.variance = T::zero();
            self.initialized = true;
        } else {
            let delta = sample - self.mean;
            self.mean = self.mean + delta * self.alpha;
            self.variance = (self.variance + delta * delta * self.alpha) * (T::one() - self.alpha);
        }
    }

    /// Returns the current IIR mean and variance
    pub fn mean_var(&self) -> (T, T) {
        (self.mean, self.variance)
    }

    /// Returns the current IIR standard deviation
    pub fn std_dev(&self) -> T {
        self.variance.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_samples_have_no_variance() {
        let mut stats = Statistics::new(0.1f32);
        for _ in 0..50 {
            stats.add_sample(250.0);
        }
        assert_eq!(stats.mean_var(), (250.0, 0.0));
    }
}
