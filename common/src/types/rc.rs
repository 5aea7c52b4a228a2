use serde::{Deserialize, Serialize};

/// Number of logical channels: roll, pitch, yaw, throttle and 8 aux channels.
pub const NUM_CHANNELS: usize = 12;

/// Number of aux channels following the four primary axes.
pub const NUM_AUX: usize = NUM_CHANNELS - 4;

/// Normalized RC channel values. In order, the numbers represent roll,
/// pitch, yaw and throttle followed by the aux channels. Sticks are in
/// `[-1, 1]`, throttle in `[0, 1]` and aux channels in `[-1, 1]`, where an
/// aux channel is considered "on" when positive.
///
/// Positive stick values command positive body rotation: roll right,
/// pitch nose-down and yaw counter-clockwise seen from above.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelVector(pub [f32; NUM_CHANNELS]);

impl Default for ChannelVector {
    fn default() -> Self {
        Self([0.0; NUM_CHANNELS])
    }
}

impl ChannelVector {
    pub fn new(roll: f32, pitch: f32, yaw: f32, throttle: f32) -> Self {
        let mut channels = [0.0; NUM_CHANNELS];
        channels[..4].copy_from_slice(&[roll, pitch, yaw, throttle]);
        ChannelVector(channels)
    }

    /// Builder-style setter for aux channel number `index` (zero-based).
    #[must_use]
    pub fn with_aux(mut self, index: usize, on: bool) -> Self {
        if let Some(value) = self.0.get_mut(4 + index) {
            *value = if on { 1.0 } else { -1.0 };
        }
        self
    }

    pub fn roll(&self) -> f32 {
        self.0[0]
    }

    pub fn pitch(&self) -> f32 {
        self.0[1]
    }

    pub fn yaw(&self) -> f32 {
        self.0[2]
    }

    pub fn roll_pitch_yaw(&self) -> [f32; 3] {
        [self.0[0], self.0[1], self.0[2]]
    }

    pub fn throttle(&self) -> f32 {
        self.0[3]
    }

    /// Whether aux channel `index` (zero-based) is switched on. Channels
    /// outside the vector are off.
    pub fn aux_on(&self, index: usize) -> bool {
        self.0.get(4 + index).is_some_and(|value| *value > 0.0)
    }

    /// Clamp every channel to its valid range, and replace non-finite
    /// values with zero.
    pub fn sanitized(mut self) -> Self {
        for (i, value) in self.0.iter_mut().enumerate() {
            let min = if i == 3 { 0.0 } else { -1.0 };
            *value = if value.is_finite() {
                value.clamp(min, 1.0)
            } else {
                0.0
            };
        }
        self
    }
}

/// The latest RC state, as handed over by the radio collaborator.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RcInput {
    pub channels: ChannelVector,
    pub link_ok: bool,
}
