use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind};

#[non_exhaustive]
#[derive(
    serde::Serialize, serde::Deserialize, thiserror::Error, Debug, Clone, Copy, Eq, PartialEq,
)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    #[error("The arguments are not properly aligned.")]
    NotAligned,
    #[error("The arguments are out of bounds.")]
    OutOfBounds,
    #[error("Error specific to the implementation.")]
    Other,
}

impl StorageError {
    /// Map the error of any NOR-flash implementation onto its kind.
    pub fn from_flash<E: NorFlashError>(error: E) -> Self {
        match error.kind() {
            NorFlashErrorKind::NotAligned => StorageError::NotAligned,
            NorFlashErrorKind::OutOfBounds => StorageError::OutOfBounds,
            _ => StorageError::Other,
        }
    }
}
