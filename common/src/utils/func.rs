#[allow(unused_imports)]
use num_traits::float::Float;

/// Linearly map `num` from the range `[in_min, in_max]` to the range `[out_min, out_max]`
pub fn linear_map<T: Float>(num: T, in_min: T, in_max: T, out_min: T, out_max: T) -> T {
    let out_delta = out_max - out_min;
    let in_delta = in_max - in_min;
    ((num - in_min) / in_delta) * out_delta + out_min
}

/// Like [`linear_map`], but the output is clamped to the output range,
/// regardless of the order of `out_min` and `out_max`.
pub fn linear_map_clamped<T: Float>(num: T, in_min: T, in_max: T, out_min: T, out_max: T) -> T {
    let (lo, hi) = if out_min < out_max {
        (out_min, out_max)
    } else {
        (out_max, out_min)
    };
    linear_map(num, in_min, in_max, out_min, out_max).max(lo).min(hi)
}

/// Replace non-finite values (NaN, inf) by zero
pub fn finite_or_zero(num: f32) -> f32 {
    if num.is_finite() {
        num
    } else {
        0.0
    }
}

/// Zero the input within `±deadband`, and rescale the remaining range
/// such that full deflection still produces `±1`.
pub fn deadband(num: f32, deadband: f32) -> f32 {
    if deadband <= 0.0 {
        return num;
    }

    if num.abs() <= deadband {
        0.0
    } else {
        num.signum() * (num.abs() - deadband) / (1.0 - deadband)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_voltage_compensation_range() {
        assert_eq!(linear_map_clamped(3.0, 3.0, 4.0, 1.33, 1.0), 1.33);
        assert_eq!(linear_map_clamped(4.0, 3.0, 4.0, 1.33, 1.0), 1.0);
        assert_eq!(linear_map_clamped(4.2, 3.0, 4.0, 1.33, 1.0), 1.0);
        assert_eq!(linear_map_clamped(2.0, 3.0, 4.0, 1.33, 1.0), 1.33);
    }

    #[test]
    fn deadband_keeps_full_range() {
        assert_eq!(deadband(0.001, 0.002), 0.0);
        assert_eq!(deadband(1.0, 0.002), 1.0);
        assert_eq!(deadband(-1.0, 0.002), -1.0);
        assert!(deadband(0.5, 0.002) < 0.5);
    }

    #[test]
    fn non_finite_is_zeroed() {
        assert_eq!(finite_or_zero(f32::NAN), 0.0);
        assert_eq!(finite_or_zero(f32::INFINITY), 0.0);
        assert_eq!(finite_or_zero(0.25), 0.25);
    }
}
