pub mod crc8;
pub mod func;
