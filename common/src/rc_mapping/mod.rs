use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::types::rc::{ChannelVector, NUM_AUX};

pub mod rates;

/// Where a switchable feature takes its state from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AuxSource {
    /// Zero-based aux channel, i.e. `Channel(0)` is the fifth RC channel
    Channel(u8),
    AlwaysOn,
    AlwaysOff,
}

impl AuxSource {
    pub fn is_on(&self, channels: &ChannelVector) -> bool {
        match self {
            AuxSource::Channel(index) => channels.aux_on(*index as usize),
            AuxSource::AlwaysOn => true,
            AuxSource::AlwaysOff => false,
        }
    }
}

/// Binding of every switchable feature to its aux source.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AuxMap {
    pub arming: AuxSource,
    pub idle_up: AuxSource,
    pub level_mode: AuxSource,
    pub horizon: AuxSource,
    pub race_mode: AuxSource,
    pub high_rates: AuxSource,
    pub pid_profile_b: AuxSource,
}

crate::const_default!(
    AuxMap => {
        arming: AuxSource::Channel(0),
        idle_up: AuxSource::Channel(0),
        level_mode: AuxSource::Channel(1),
        horizon: AuxSource::AlwaysOff,
        race_mode: AuxSource::AlwaysOff,
        high_rates: AuxSource::AlwaysOn,
        pid_profile_b: AuxSource::AlwaysOff,
    }
);

impl AuxMap {
    pub fn resolve(&self, channels: &ChannelVector) -> AuxState {
        AuxState {
            arm_switch: self.arming.is_on(channels),
            idle_up: self.idle_up.is_on(channels),
            leveling: self.level_mode.is_on(channels),
            horizon: self.horizon.is_on(channels),
            race: self.race_mode.is_on(channels),
            high_rates: self.high_rates.is_on(channels),
            pid_profile_b: self.pid_profile_b.is_on(channels),
        }
    }

    pub fn sanity_check(&self) -> Result<(), ConfigError> {
        let sources = [
            self.arming,
            self.idle_up,
            self.level_mode,
            self.horizon,
            self.race_mode,
            self.high_rates,
            self.pid_profile_b,
        ];
        for source in sources {
            if let AuxSource::Channel(index) = source {
                if index as usize >= NUM_AUX {
                    return Err(ConfigError::InvalidAuxChannel(index));
                }
            }
        }
        Ok(())
    }
}

/// Feature switch states of a single tick.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AuxState {
    pub arm_switch: bool,
    pub idle_up: bool,
    pub leveling: bool,
    pub horizon: bool,
    pub race: bool,
    pub high_rates: bool,
    pub pid_profile_b: bool,
}
