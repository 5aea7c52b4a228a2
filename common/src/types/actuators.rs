use serde::{Deserialize, Serialize};

/// Arming state of the vehicle. Motors are only allowed to spin while
/// `Armed` or while ramping down in `FailsafeLanding`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArmingState {
    Disarmed,
    Armed,
    FailsafeLanding,
}

impl ArmingState {
    pub fn is_disarmed(&self) -> bool {
        matches!(self, ArmingState::Disarmed)
    }

    pub fn motors_enabled(&self) -> bool {
        matches!(self, ArmingState::Armed | ArmingState::FailsafeLanding)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisarmReason {
    Uninitialized,
    UserCommand,
    LandingComplete,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FailsafeReason {
    LinkLoss,
    SensorLoss,
    LowVoltage,
}
