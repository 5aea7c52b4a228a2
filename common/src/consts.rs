/// The gravitational constant [m/s^2]
pub const GRAVITY: f32 = 9.81;

/// Nominal control loop period [us]
pub const LOOP_PERIOD_US: u32 = 1000;

/// Degrees to radians
pub const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;

/// Lower end of the voltage compensation map [V]
pub const VCOMP_LOW_V: f32 = 3.0;

/// Upper end of the voltage compensation map [V]
pub const VCOMP_HIGH_V: f32 = 4.0;

/// Largest gain applied by voltage compensation
pub const VCOMP_MAX: f32 = 1.33;
