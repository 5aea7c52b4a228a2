#![cfg_attr(not(test), no_std)]

// Export the logging macros for either defmt or log
#[macro_use]
pub mod logging;

pub mod airframe;
pub mod battery;
pub mod conditioner;
pub mod config;
pub mod consts;
pub mod control_loop;
pub mod errors;
pub mod estimator;
pub mod filters;
pub mod flight_modes;
pub mod flight_state;
pub mod gesture;
pub mod params;
pub mod rc_mapping;
pub mod scheduler;
pub mod sync;
pub mod types;
pub mod utils;

#[allow(unused)]
#[cfg(not(feature = "arch-std"))]
use num_traits::Float as _;

// Re-exported for implementors
pub use embedded_storage;
pub use heapless;
pub use nalgebra;

/// Number of motors driven by the mixer
pub const NUM_MOTORS: usize = 4;

/// Maximum number of status events a single tick may emit
pub const MAX_TICK_EVENTS: usize = 8;

#[macro_export]
macro_rules! const_default {
    ($type:ty => { $($token:tt)+ } ) => {
        impl $crate::ConstDefault for $type {
            const DEFAULT: Self = Self::const_default();
        }

        impl $type {
            pub const fn const_default() -> Self {
                Self { $($token)+ }
            }
        }

        impl Default for $type {
            fn default() -> Self {
                Self::const_default()
            }
        }
    };
    ($type:ty => $($token:tt)+ ) => {
        impl $crate::ConstDefault for $type {
            const DEFAULT: Self = Self::const_default();
        }

        impl $type {
            pub const fn const_default() -> Self {
                $($token)+
            }
        }

        impl Default for $type {
            fn default() -> Self {
                Self::const_default()
            }
        }
    };
}

pub trait ConstDefault {
    const DEFAULT: Self;
}
