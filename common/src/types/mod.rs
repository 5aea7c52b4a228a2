pub mod actuators;
pub mod control;
pub mod flight_mode;
pub mod measurements;
pub mod rc;
pub mod status;
