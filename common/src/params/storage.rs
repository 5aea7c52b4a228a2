//! Persistence of the tunable parameter set.
//!
//! A record is laid out as
//! `[magic: u32][version: u8][len: u16][payload: len][crc8]`, all integers
//! little endian, with a postcard encoded payload. The CRC covers every
//! byte before it.

use embedded_storage::nor_flash::NorFlash;

use crate::errors::{adapter::embedded_storage::StorageError, PersistError};
use crate::utils::crc8::Crc8;

use super::TunableParams;

const ID: &str = "param_store";

pub const RECORD_MAGIC: u32 = 0x5748_5031;
pub const RECORD_VERSION: u8 = 1;

/// Bytes reserved for a single record
pub const RECORD_SIZE: usize = 128;

const HEADER_LEN: usize = 7;
const MAX_PAYLOAD: usize = RECORD_SIZE - HEADER_LEN - 1;

static_assertions::const_assert!(MAX_PAYLOAD <= u16::MAX as usize);

/// Storage of the tunable parameter set. Implementations block until the
/// operation finished, so they must only be used between ticks.
pub trait ParamStore {
    /// Load the stored set, or `PersistError::UseDefaults` if none exists.
    fn load(&mut self) -> Result<TunableParams, PersistError>;

    fn save(&mut self, params: &TunableParams) -> Result<(), PersistError>;
}

/// Encode `params` into a complete record, returning its length.
pub fn encode_record(
    params: &TunableParams,
    buf: &mut [u8; RECORD_SIZE],
) -> Result<usize, PersistError> {
    let payload_len = postcard::to_slice(params, &mut buf[HEADER_LEN..RECORD_SIZE - 1])
        .map_err(|_| PersistError::RecordTooLarge)?
        .len();

    buf[0..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
    buf[4] = RECORD_VERSION;
    buf[5..7].copy_from_slice(&(payload_len as u16).to_le_bytes());

    let crc_at = HEADER_LEN + payload_len;
    buf[crc_at] = Crc8::checksum(&buf[..crc_at]);
    Ok(crc_at + 1)
}

/// Decode a record. Anything which is not a complete, intact record of
/// the current version reads as `UseDefaults`.
pub fn decode_record(buf: &[u8]) -> Result<TunableParams, PersistError> {
    let header = buf.get(..HEADER_LEN).ok_or(PersistError::UseDefaults)?;

    if header[0..4] != RECORD_MAGIC.to_le_bytes() {
        return Err(PersistError::UseDefaults);
    }

    if header[4] != RECORD_VERSION {
        warn!("{}: Record version {} is not supported", ID, header[4]);
        return Err(PersistError::UseDefaults);
    }

    let payload_len = u16::from_le_bytes([header[5], header[6]]) as usize;
    if payload_len > MAX_PAYLOAD {
        return Err(PersistError::UseDefaults);
    }

    let crc_at = HEADER_LEN + payload_len;
    let crc = *buf.get(crc_at).ok_or(PersistError::UseDefaults)?;
    if Crc8::checksum(&buf[..crc_at]) != crc {
        warn!("{}: Record checksum mismatch", ID);
        return Err(PersistError::UseDefaults);
    }

    let params: TunableParams = postcard::from_bytes(&buf[HEADER_LEN..crc_at])
        .map_err(|e| PersistError::Postcard(e.into()))?;

    if !params.is_valid() {
        warn!("{}: Stored parameters are out of range", ID);
        return Err(PersistError::UseDefaults);
    }

    Ok(params)
}

const fn round_up(len: usize, multiple: usize) -> usize {
    len.div_ceil(multiple) * multiple
}

/// Parameter record in a dedicated region of NOR flash, starting at an
/// erase-aligned `offset`.
pub struct FlashParamStore<F: NorFlash> {
    flash: F,
    offset: u32,
}

impl<F: NorFlash> FlashParamStore<F> {
    pub fn new(flash: F, offset: u32) -> Self {
        Self { flash, offset }
    }

    pub fn release(self) -> F {
        self.flash
    }
}

impl<F: NorFlash> ParamStore for FlashParamStore<F> {
    fn load(&mut self) -> Result<TunableParams, PersistError> {
        let mut buf = [0u8; RECORD_SIZE];
        let read_len = round_up(RECORD_SIZE, F::READ_SIZE);
        if read_len > RECORD_SIZE {
            return Err(StorageError::NotAligned.into());
        }

        self.flash
            .read(self.offset, &mut buf[..read_len])
            .map_err(StorageError::from_flash)?;

        decode_record(&buf)
    }

    fn save(&mut self, params: &TunableParams) -> Result<(), PersistError> {
        // Erased flash reads as 0xFF, so pad with the same
        let mut buf = [u8::MAX; RECORD_SIZE];
        let len = encode_record(params, &mut buf)?;

        let write_len = round_up(len, F::WRITE_SIZE);
        if write_len > RECORD_SIZE {
            return Err(StorageError::NotAligned.into());
        }

        let erase_len = round_up(RECORD_SIZE, F::ERASE_SIZE) as u32;
        self.flash
            .erase(self.offset, self.offset + erase_len)
            .map_err(StorageError::from_flash)?;
        self.flash
            .write(self.offset, &buf[..write_len])
            .map_err(StorageError::from_flash)?;

        debug!("{}: Saved {} byte record", ID, len);
        Ok(())
    }
}

/// Volatile store, for hosts without flash and for tests.
#[derive(Debug, Default)]
pub struct MemParamStore {
    record: Option<([u8; RECORD_SIZE], usize)>,
    /// Number of successful saves
    pub saves: usize,
}

impl MemParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip a bit in the stored record, if any.
    pub fn corrupt(&mut self) {
        if let Some((buf, _)) = &mut self.record {
            buf[HEADER_LEN] ^= 0x01;
        }
    }
}

impl ParamStore for MemParamStore {
    fn load(&mut self) -> Result<TunableParams, PersistError> {
        match &self.record {
            Some((buf, len)) => decode_record(&buf[..*len]),
            None => Err(PersistError::UseDefaults),
        }
    }

    fn save(&mut self, params: &TunableParams) -> Result<(), PersistError> {
        let mut buf = [u8::MAX; RECORD_SIZE];
        let len = encode_record(params, &mut buf)?;
        self.record = Some((buf, len));
        self.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuned() -> TunableParams {
        let mut params = TunableParams::const_default();
        params.set("rate.pitch.kd", 0.003).unwrap();
        params.set("lvc_enabled", 0.0).unwrap();
        params
    }

    #[test]
    fn empty_store_uses_defaults() {
        let mut store = MemParamStore::new();
        assert_eq!(store.load(), Err(PersistError::UseDefaults));
        assert_eq!(decode_record(&[u8::MAX; RECORD_SIZE]), Err(PersistError::UseDefaults));
    }

    #[test]
    fn saved_set_loads_back() {
        let mut store = MemParamStore::new();
        store.save(&tuned()).unwrap();
        assert_eq!(store.load(), Ok(tuned()));
        assert_eq!(store.saves, 1);
    }

    #[test]
    fn corrupted_record_uses_defaults() {
        let mut store = MemParamStore::new();
        store.save(&tuned()).unwrap();
        store.corrupt();
        assert_eq!(store.load(), Err(PersistError::UseDefaults));
    }

    #[test]
    fn newer_version_uses_defaults() {
        let mut buf = [u8::MAX; RECORD_SIZE];
        let len = encode_record(&tuned(), &mut buf).unwrap();
        buf[4] = RECORD_VERSION + 1;
        buf[len - 1] = Crc8::checksum(&buf[..len - 1]);
        assert_eq!(decode_record(&buf), Err(PersistError::UseDefaults));
    }

    #[test]
    fn truncated_record_uses_defaults() {
        let mut buf = [u8::MAX; RECORD_SIZE];
        let len = encode_record(&tuned(), &mut buf).unwrap();
        assert_eq!(decode_record(&buf[..len - 1]), Err(PersistError::UseDefaults));
        assert_eq!(decode_record(&buf[..3]), Err(PersistError::UseDefaults));
    }
}
