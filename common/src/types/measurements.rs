use serde::{Deserialize, Serialize};

/// A single inertial sample, as handed over by the sensor collaborator.
///
/// Angular rates are in body frame [rad/s] in the order roll, pitch, yaw.
/// The accelerometer reading is in units of [g], and may be absent.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisSample {
    pub timestamp_us: u64,
    pub gyr: [f32; 3],
    pub acc: Option<[f32; 3]>,
    pub valid: bool,
}

impl AxisSample {
    pub fn new(timestamp_us: u64, gyr: [f32; 3], acc: Option<[f32; 3]>) -> Self {
        Self {
            timestamp_us,
            gyr,
            acc,
            valid: true,
        }
    }

    /// A sample is usable when flagged valid and every value is finite.
    pub fn is_usable(&self) -> bool {
        self.valid
            && self.gyr.iter().all(|v| v.is_finite())
            && self
                .acc
                .is_none_or(|acc| acc.iter().all(|v| v.is_finite()))
    }
}
