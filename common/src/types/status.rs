use serde::{Deserialize, Serialize};

use crate::gesture::GestureAction;

use super::actuators::{DisarmReason, FailsafeReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ArmingBlocker(u16);

bitflags::bitflags! {
    /// This bitflag represents the possible reasons why the vehicle cannot be armed.
    /// The bitflag is supposed to be `0x0000` when the vehicle is ready to be armed,
    /// which can be checked with the `is_empty()` method.
    impl ArmingBlocker: u16 {

        /// **Bit 0** - No fresh and valid gyroscope data available.
        const NO_GYR_DATA   = 1 << 0;

        /// **Bit 1** - The vehicle is at a higher throttle than allowed.
        const HIGH_THROTTLE_CMD = 1 << 1;

        /// **Bit 2** - The receiver is in failsafe mode.
        const RX_FAILSAFE   = 1 << 2;

        /// **Bit 3** - The battery was below the cutoff voltage at startup.
        const LOW_BATTERY   = 1 << 3;

        /// **Bit 4** - The stick travel check is active.
        const STICK_CHECK   = 1 << 4;

        /// **Bit 5** - The arm switch must be released before arming, since it was
        /// already on when the link came up or when the vehicle was disarmed.
        const SWITCH_LATCHED = 1 << 5;
    }
}

/// Individual controller contributions, for logging and tuning.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidTerms {
    pub p_out: f32,
    pub i_out: f32,
    pub d_out: f32,
}

/// Semantic events for the status indicator. The core never renders
/// these, it only reports them.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusEvent {
    Armed,
    Disarmed(DisarmReason),
    ArmingRejected(ArmingBlocker),
    FailsafeLanding(FailsafeReason),
    LvcActive,
    LowBattery,
    BatteryOk,
    GestureMatched(GestureAction),
    SaveComplete,
    SaveFailed,
    /// Stored parameters could not be read, the defaults are in use
    LoadFailed,
    FullStickTravel,
    TickOverrun,
}

/// Events emitted by a single tick. Events beyond the capacity are dropped.
pub type TickEvents = heapless::Vec<StatusEvent, { crate::MAX_TICK_EVENTS }>;
