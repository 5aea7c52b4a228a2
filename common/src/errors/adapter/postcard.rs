use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Postcard failures, narrowed to what can go wrong with a fixed-layout
/// parameter record.
#[non_exhaustive]
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PostcardError {
    #[error("The serialize buffer is full")]
    SerializeBufferFull,
    #[error("Hit the end of buffer, expected more data")]
    DeserializeUnexpectedEnd,
    #[error("The stored record does not decode as the expected layout")]
    DeserializeBadEncoding,
    #[error("Some other serialization error occured")]
    Other,
}

impl From<postcard::Error> for PostcardError {
    fn from(value: postcard::Error) -> Self {
        match value {
            postcard::Error::SerializeBufferFull => Self::SerializeBufferFull,
            postcard::Error::DeserializeUnexpectedEnd => Self::DeserializeUnexpectedEnd,
            postcard::Error::DeserializeBadVarint
            | postcard::Error::DeserializeBadBool
            | postcard::Error::DeserializeBadChar
            | postcard::Error::DeserializeBadUtf8
            | postcard::Error::DeserializeBadOption
            | postcard::Error::DeserializeBadEnum
            | postcard::Error::DeserializeBadEncoding => Self::DeserializeBadEncoding,
            _ => Self::Other,
        }
    }
}
