pub mod embedded_storage;
pub mod postcard;
