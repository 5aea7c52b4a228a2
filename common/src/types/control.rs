use serde::{Deserialize, Serialize};

/// One of the three rotational control axes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Axis {
    Roll = 0,
    Pitch = 1,
    Yaw = 2,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::Roll, Axis::Pitch, Axis::Yaw];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Axis::Roll => "roll",
            Axis::Pitch => "pitch",
            Axis::Yaw => "yaw",
        }
    }
}

/// Per-axis corrections produced by the rate controllers, in order roll,
/// pitch, yaw. Typically within `[-1, 1]`, but not bounded.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisCommands(pub [f32; 3]);

impl AxisCommands {
    pub const ZERO: AxisCommands = AxisCommands([0.0; 3]);

    pub fn roll(&self) -> f32 {
        self.0[0]
    }

    pub fn pitch(&self) -> f32 {
        self.0[1]
    }

    pub fn yaw(&self) -> f32 {
        self.0[2]
    }
}
