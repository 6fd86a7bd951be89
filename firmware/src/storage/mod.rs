//! Page-level access to the flash user page.
//!
//! The medium only supports erase-then-program at page granularity, so every
//! field update is a read-modify-erase-write of the whole page. Power loss
//! between the erase and the program step loses *every* field on the page,
//! not just the one being written; there is no shadow page to recover from.
use core::cell::RefCell;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use embedded_storage::nor_flash::NorFlash;
use shared::RecordError;
use shared::layout::{self, PAGE_SIZE, Region};
use zeroize::Zeroizing;

use crate::crypto::KeyError;

pub mod sim;

/// Device offset of the user page on the STM32F103 (0x0801_DC00 mapped).
pub const USER_PAGE_OFFSET: u32 = 0x0001_DC00;

type FlashMutex = CriticalSectionRawMutex;

#[derive(Debug, PartialEq, Eq)]
pub enum StoreError<E> {
    /// Requested range does not fit inside the page; nothing was touched.
    BoundsViolation { offset: usize, len: usize },
    /// Data handed to a fixed-size region has the wrong length.
    LengthMismatch { expected: usize, actual: usize },
    /// Configuration record magic did not match; treat as uninitialised.
    InvalidRecord(RecordError),
    AuthenticationFailure,
    CredentialTooShort,
    Key(KeyError),
    Flash(E),
}

impl<E> From<KeyError> for StoreError<E> {
    fn from(error: KeyError) -> Self {
        StoreError::Key(error)
    }
}

impl<E> From<RecordError> for StoreError<E> {
    fn from(error: RecordError) -> Self {
        StoreError::InvalidRecord(error)
    }
}

impl<E> core::fmt::Display for StoreError<E>
where
    E: core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StoreError::BoundsViolation { offset, len } => write!(
                f,
                "write of {len} bytes at offset {offset} exceeds the {PAGE_SIZE} byte page"
            ),
            StoreError::LengthMismatch { expected, actual } => {
                write!(f, "expected {expected} bytes, got {actual}")
            }
            StoreError::InvalidRecord(err) => write!(f, "invalid record: {err}"),
            StoreError::AuthenticationFailure => write!(f, "update PIN rejected"),
            StoreError::CredentialTooShort => write!(
                f,
                "update PIN shorter than {} characters",
                layout::UPDATE_PIN_MIN_LEN
            ),
            StoreError::Key(err) => write!(f, "key error: {err}"),
            StoreError::Flash(err) => write!(f, "flash error: {err:?}"),
        }
    }
}

impl<E> core::error::Error for StoreError<E> where E: core::fmt::Debug {}

/// Page-aligned device offsets of the pages this store owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashMap {
    pub user_page: u32,
    /// Page holding the password-safe slots; only touched by secure erase.
    pub password_safe_page: u32,
}

impl FlashMap {
    pub const fn new(user_page: u32, password_safe_page: u32) -> Self {
        Self {
            user_page,
            password_safe_page,
        }
    }

    /// Map with the user page at its fixed device location.
    pub const fn on_device(password_safe_page: u32) -> Self {
        Self::new(USER_PAGE_OFFSET, password_safe_page)
    }
}

/// Exclusive owner of the flash controller.
///
/// Every unlock/erase/program sequence runs inside one critical section, so
/// no other flash operation can interleave with it. Operations are blocking
/// and run to completion once started.
pub struct PageFlash<F> {
    flash: Mutex<FlashMutex, RefCell<F>>,
    map: FlashMap,
}

impl<F> PageFlash<F>
where
    F: NorFlash,
{
    pub fn new(flash: F, map: FlashMap) -> Self {
        debug_assert!(PAGE_SIZE % F::ERASE_SIZE == 0);
        debug_assert!(PAGE_SIZE % F::READ_SIZE == 0);
        Self {
            flash: Mutex::new(RefCell::new(flash)),
            map,
        }
    }

    pub fn map(&self) -> FlashMap {
        self.map
    }

    pub fn into_inner(self) -> F {
        self.flash.into_inner().into_inner()
    }

    /// Runs `f` with exclusive access to the raw flash device.
    pub fn with_flash<U>(&self, f: impl FnOnce(&mut F) -> U) -> U {
        self.flash.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Copies `buffer.len()` bytes at `offset` out of a full page read, so
    /// fields need not be aligned to the device read size.
    pub fn read(&self, offset: usize, buffer: &mut [u8]) -> Result<(), StoreError<F::Error>> {
        if !layout::fits_in_page(offset, buffer.len()) {
            return Err(StoreError::BoundsViolation {
                offset,
                len: buffer.len(),
            });
        }
        let page = self.read_page()?;
        buffer.copy_from_slice(&page[offset..offset + buffer.len()]);
        Ok(())
    }

    pub fn read_region(
        &self,
        region: Region,
        buffer: &mut [u8],
    ) -> Result<(), StoreError<F::Error>> {
        check_len(region, buffer.len())?;
        let page = self.read_page()?;
        buffer.copy_from_slice(region.slice(&page));
        Ok(())
    }

    pub fn read_page(&self) -> Result<Zeroizing<[u8; PAGE_SIZE]>, StoreError<F::Error>> {
        let mut page = Zeroizing::new([0u8; PAGE_SIZE]);
        let address = self.map.user_page;
        self.with_flash(|flash| flash.read(address, &mut page[..]))
            .map_err(StoreError::Flash)?;
        Ok(page)
    }

    /// Overlays `data` at `offset` and rewrites the whole page.
    pub fn write(&self, data: &[u8], offset: usize) -> Result<(), StoreError<F::Error>> {
        if !layout::fits_in_page(offset, data.len()) {
            log::warn!(
                "rejecting {} byte write at offset {offset}: outside user page",
                data.len()
            );
            return Err(StoreError::BoundsViolation {
                offset,
                len: data.len(),
            });
        }

        let page = self.map.user_page;
        self.with_flash(|flash| {
            let mut scratch = Zeroizing::new([0u8; PAGE_SIZE]);
            flash.read(page, &mut scratch[..])?;
            scratch[offset..offset + data.len()].copy_from_slice(data);
            rewrite_page(flash, page, &scratch[..])
        })
        .map_err(|err| {
            log::error!("user page rewrite failed: {err:?}");
            StoreError::Flash(err)
        })?;

        log::debug!("rewrote user page ({} bytes at {offset})", data.len());
        Ok(())
    }

    pub fn write_region(&self, region: Region, data: &[u8]) -> Result<(), StoreError<F::Error>> {
        check_len(region, data.len())?;
        log::debug!("updating {}", region.name);
        self.write(data, region.offset)
    }

    /// Erases and programs a full page image at any page-aligned device offset.
    pub fn overwrite_page(
        &self,
        page_offset: u32,
        image: &[u8; PAGE_SIZE],
    ) -> Result<(), StoreError<F::Error>> {
        self.with_flash(|flash| rewrite_page(flash, page_offset, image))
            .map_err(|err| {
                log::error!("overwrite of page 0x{page_offset:08X} failed: {err:?}");
                StoreError::Flash(err)
            })
    }
}

fn check_len<E>(region: Region, actual: usize) -> Result<(), StoreError<E>> {
    if actual != region.len {
        log::warn!("{} expects {} bytes, got {actual}", region.name, region.len);
        return Err(StoreError::LengthMismatch {
            expected: region.len,
            actual,
        });
    }
    Ok(())
}

fn rewrite_page<F: NorFlash>(flash: &mut F, page: u32, image: &[u8]) -> Result<(), F::Error> {
    flash.erase(page, page + PAGE_SIZE as u32)?;
    flash.write(page, image)
}
