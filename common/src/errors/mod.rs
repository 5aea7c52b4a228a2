use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod adapter;
use adapter::{embedded_storage::StorageError, postcard::PostcardError};

/// Static configuration that is rejected before the control loop is built.
#[non_exhaustive]
#[derive(Error, Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    #[error("The loop period must be at least 100 us, got {0} us.")]
    InvalidLoopPeriod(u32),
    #[error("Filter cutoff must be a finite, positive frequency, got {0} Hz.")]
    InvalidCutoff(f32),
    #[error("Threshold `{0}` is outside its valid range.")]
    InvalidThreshold(&'static str),
    #[error("Rate `{0}` must be a finite, positive value.")]
    InvalidRate(&'static str),
    #[error("Expo `{0}` must lie within [0, 1].")]
    InvalidExpo(&'static str),
    #[error("Aux channel {0} does not exist.")]
    InvalidAuxChannel(u8),
    #[error("A timeout window of zero ticks is not allowed.")]
    ZeroTimeout,
    #[error("The gesture sampling divider must be non-zero.")]
    ZeroDivider,
}

/// Failure to load or store the tunable parameter set.
#[non_exhaustive]
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PersistError {
    #[error("No valid parameter record exists, defaults should be used.")]
    UseDefaults,
    #[error("The parameter record does not fit in the storage region.")]
    RecordTooLarge,
    #[error("Postcard ser/de error: {0}")]
    Postcard(#[from] PostcardError),
    #[error("Embedded storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Failure to access a tunable parameter by name.
#[non_exhaustive]
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParamError {
    #[error("No parameter with the given name exists.")]
    UnknownName,
    #[error("The value is outside the valid range of the parameter.")]
    InvalidValue,
}

/// Runtime faults. These never propagate out of a tick, but are used to
/// select the reason of a failsafe landing and for logging.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    #[error("No fresh, valid sensor sample within {ticks} ticks.")]
    Sensor { ticks: u32 },
    #[error("No fresh, healthy link within {ticks} ticks.")]
    Link { ticks: u32 },
}
