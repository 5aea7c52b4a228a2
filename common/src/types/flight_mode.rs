use serde::{Deserialize, Serialize};

/// The flight mode resolved every tick from the aux feature switches.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlightMode {
    /// Rate control on all axes, no self-leveling.
    Acro,

    /// Angle mode will self-level the vehicle according to the
    /// stick deflection. Let go of the sticks, and the vehicle
    /// will return to be level with the horizon.
    Angle,

    /// Self-leveling which fades out towards full stick deflection
    /// and at large inclinations, such that flips are possible.
    Horizon,

    /// Roll is self-leveled, pitch is flown as acro.
    Race,

    /// Roll uses horizon blending, pitch is flown as acro.
    RaceHorizon,
}

impl FlightMode {
    /// Whether any axis uses the angle estimate.
    pub fn is_leveling(&self) -> bool {
        !matches!(self, FlightMode::Acro)
    }
}
