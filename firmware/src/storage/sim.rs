//! RAM-backed flash used for host-side simulation and tests.
//!
//! Behaves like NOR flash: erase sets a page to `0xFF`, programming can only
//! clear bits. A write without a preceding erase therefore corrupts data the
//! same way it would on the device.
//!
//! `READ` sets the read granularity. Reads whose offset or length is not a
//! multiple of it fail with [`RamFlashError::NotAligned`], like word-reading
//! parts do.
use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};
use shared::layout::{ERASED_BYTE, PAGE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamFlashError {
    OutOfBounds,
    NotAligned,
    /// Failure requested through `fail_next_erase` / `fail_next_write`.
    Injected,
}

impl NorFlashError for RamFlashError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            RamFlashError::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            RamFlashError::NotAligned => NorFlashErrorKind::NotAligned,
            RamFlashError::Injected => NorFlashErrorKind::Other,
        }
    }
}

pub struct RamFlash<const PAGES: usize, const READ: usize = 1> {
    pages: [[u8; PAGE_SIZE]; PAGES],
    erase_count: usize,
    write_count: usize,
    fail_next_erase: bool,
    fail_next_write: bool,
}

impl<const PAGES: usize, const READ: usize> Default for RamFlash<PAGES, READ> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const PAGES: usize, const READ: usize> RamFlash<PAGES, READ> {
    pub const fn new() -> Self {
        Self {
            pages: [[ERASED_BYTE; PAGE_SIZE]; PAGES],
            erase_count: 0,
            write_count: 0,
            fail_next_erase: false,
            fail_next_write: false,
        }
    }

    pub fn page(&self, index: usize) -> &[u8; PAGE_SIZE] {
        &self.pages[index]
    }

    pub fn erase_count(&self) -> usize {
        self.erase_count
    }

    pub fn write_count(&self) -> usize {
        self.write_count
    }

    pub fn fail_next_erase(&mut self) {
        self.fail_next_erase = true;
    }

    /// Makes the next program step fail, leaving an erased page behind as a
    /// power cut between erase and program would.
    pub fn fail_next_write(&mut self) {
        self.fail_next_write = true;
    }

    fn check_range(offset: u32, len: usize) -> Result<core::ops::Range<usize>, RamFlashError> {
        let start = offset as usize;
        let end = start.checked_add(len).ok_or(RamFlashError::OutOfBounds)?;
        if end > PAGES * PAGE_SIZE {
            return Err(RamFlashError::OutOfBounds);
        }
        Ok(start..end)
    }

    fn byte_mut(&mut self, address: usize) -> &mut u8 {
        &mut self.pages[address / PAGE_SIZE][address % PAGE_SIZE]
    }
}

impl<const PAGES: usize, const READ: usize> ErrorType for RamFlash<PAGES, READ> {
    type Error = RamFlashError;
}

impl<const PAGES: usize, const READ: usize> ReadNorFlash for RamFlash<PAGES, READ> {
    const READ_SIZE: usize = READ;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let range = Self::check_range(offset, bytes.len())?;
        if range.start % READ != 0 || bytes.len() % READ != 0 {
            return Err(RamFlashError::NotAligned);
        }
        for (address, byte) in range.zip(bytes.iter_mut()) {
            *byte = self.pages[address / PAGE_SIZE][address % PAGE_SIZE];
        }
        Ok(())
    }

    fn capacity(&self) -> usize {
        PAGES * PAGE_SIZE
    }
}

impl<const PAGES: usize, const READ: usize> NorFlash for RamFlash<PAGES, READ> {
    const WRITE_SIZE: usize = 2;
    const ERASE_SIZE: usize = PAGE_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if from > to {
            return Err(RamFlashError::OutOfBounds);
        }
        let range = Self::check_range(from, (to - from) as usize)?;
        if range.start % PAGE_SIZE != 0 || range.end % PAGE_SIZE != 0 {
            return Err(RamFlashError::NotAligned);
        }
        if core::mem::take(&mut self.fail_next_erase) {
            return Err(RamFlashError::Injected);
        }
        for page in range.start / PAGE_SIZE..range.end / PAGE_SIZE {
            self.pages[page] = [ERASED_BYTE; PAGE_SIZE];
        }
        self.erase_count += 1;
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let range = Self::check_range(offset, bytes.len())?;
        if range.start % Self::WRITE_SIZE != 0 || bytes.len() % Self::WRITE_SIZE != 0 {
            return Err(RamFlashError::NotAligned);
        }
        if core::mem::take(&mut self.fail_next_write) {
            return Err(RamFlashError::Injected);
        }
        for (address, byte) in range.zip(bytes.iter()) {
            *self.byte_mut(address) &= *byte;
        }
        self.write_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn programming_only_clears_bits() {
        let mut flash = RamFlash::<1>::new();
        flash.write(0, &[0xF0, 0x0F]).unwrap();
        flash.write(0, &[0x3C, 0xFF]).unwrap();

        let mut bytes = [0u8; 2];
        flash.read(0, &mut bytes).unwrap();
        assert_eq!(bytes, [0x30, 0x0F]);
    }

    #[test]
    fn erase_requires_page_alignment() {
        let mut flash = RamFlash::<2>::new();
        assert_eq!(flash.erase(1, PAGE_SIZE as u32), Err(RamFlashError::NotAligned));
        assert_eq!(
            flash.erase(0, 3 * PAGE_SIZE as u32),
            Err(RamFlashError::OutOfBounds)
        );
        assert_eq!(flash.erase_count(), 0);
    }

    #[test]
    fn word_reads_reject_unaligned_access() {
        let mut flash = RamFlash::<1, 4>::new();
        let mut bytes = [0u8; 10];

        assert_eq!(flash.read(242, &mut bytes), Err(RamFlashError::NotAligned));
        assert_eq!(flash.read(240, &mut bytes), Err(RamFlashError::NotAligned));
        assert!(flash.read(240, &mut [0u8; 12]).is_ok());
    }

    #[test]
    fn injected_failures_fire_once() {
        let mut flash = RamFlash::<1>::new();
        flash.fail_next_write();
        assert_eq!(flash.write(0, &[0, 0]), Err(RamFlashError::Injected));
        assert!(flash.write(0, &[0, 0]).is_ok());
        assert_eq!(flash.write_count(), 1);
    }
}
