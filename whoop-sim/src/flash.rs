use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SimFlashError {
    NotAligned,
    OutOfBounds,
    /// Failure injected with [`SimulatedFlash::fail_writes`]
    WriteFailed,
}

impl NorFlashError for SimFlashError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            SimFlashError::NotAligned => NorFlashErrorKind::NotAligned,
            SimFlashError::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            SimFlashError::WriteFailed => NorFlashErrorKind::Other,
        }
    }
}

/// NOR flash held in memory. Erasing sets bits, writing can only clear
/// them, like the real thing.
pub struct SimulatedFlash {
    buf: Vec<u8>,
    fail_writes: bool,
}

impl SimulatedFlash {
    pub fn new(capacity: usize) -> Self {
        Self {
            // Flash is erased to logical high
            buf: vec![u8::MAX; capacity],
            fail_writes: false,
        }
    }

    /// Make every following erase and write fail.
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn contents(&self) -> &[u8] {
        &self.buf
    }

    fn range(&self, offset: u32, len: usize) -> Result<std::ops::Range<usize>, SimFlashError> {
        let start = offset as usize;
        let end = start.checked_add(len).ok_or(SimFlashError::OutOfBounds)?;
        if end > self.buf.len() {
            return Err(SimFlashError::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl ErrorType for SimulatedFlash {
    type Error = SimFlashError;
}

impl ReadNorFlash for SimulatedFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, bytes.len())?;
        bytes.copy_from_slice(&self.buf[range]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl NorFlash for SimulatedFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = 512;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if self.fail_writes {
            log::warn!("Simulated flash write failure");
            return Err(SimFlashError::WriteFailed);
        }
        if from > to || from as usize % Self::ERASE_SIZE != 0 || to as usize % Self::ERASE_SIZE != 0
        {
            return Err(SimFlashError::NotAligned);
        }
        let range = self.range(from, (to - from) as usize)?;
        self.buf[range].fill(u8::MAX);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.fail_writes {
            log::warn!("Simulated flash write failure");
            return Err(SimFlashError::WriteFailed);
        }
        if offset as usize % Self::WRITE_SIZE != 0 || bytes.len() % Self::WRITE_SIZE != 0 {
            return Err(SimFlashError::NotAligned);
        }
        let range = self.range(offset, bytes.len())?;
        for (cell, byte) in self.buf[range].iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::params::storage::{FlashParamStore, ParamStore};
    use common::params::TunableParams;

    use super::*;

    #[test]
    fn writes_only_clear_bits() {
        let mut flash = SimulatedFlash::new(1024);
        flash.write(0, &[0x0F; 4]).unwrap();
        flash.write(0, &[0xF0; 4]).unwrap();
        assert_eq!(&flash.contents()[..4], &[0x00; 4]);

        flash.erase(0, 512).unwrap();
        assert_eq!(&flash.contents()[..4], &[0xFF; 4]);
    }

    #[test]
    fn misaligned_and_out_of_bounds() {
        let mut flash = SimulatedFlash::new(1024);
        assert_eq!(flash.erase(0, 100), Err(SimFlashError::NotAligned));
        assert_eq!(flash.write(2, &[0; 4]), Err(SimFlashError::NotAligned));
        assert_eq!(flash.erase(512, 1536), Err(SimFlashError::OutOfBounds));
        let mut buf = [0; 8];
        assert_eq!(flash.read(1020, &mut buf), Err(SimFlashError::OutOfBounds));
    }

    #[test]
    fn parameter_record_round_trips_through_flash() {
        let mut store = FlashParamStore::new(SimulatedFlash::new(4096), 1024);
        assert!(store.load().is_err());

        let mut params = TunableParams::const_default();
        params.trims = [0.02, -0.01];
        store.save(&params).unwrap();
        assert_eq!(store.load(), Ok(params));

        // Saving again erases first, so the record is not corrupted
        params.lvc_enabled = false;
        store.save(&params).unwrap();
        assert_eq!(store.load(), Ok(params));
    }

    #[test]
    fn failing_flash_reports_error() {
        let mut flash = SimulatedFlash::new(4096);
        flash.fail_writes(true);
        let mut store = FlashParamStore::new(flash, 0);
        assert!(store.save(&TunableParams::const_default()).is_err());
    }
}
