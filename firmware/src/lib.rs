//! Persistent secret and configuration store for the token microcontroller.
//!
//! A single flash user page holds the AES storage key, the configuration
//! record, the XOR mask, the password-safe key, the firmware-update PIN
//! credential and the bootloader flag. [`UserPageStore`] owns the flash
//! controller and exposes one method per logical field update; each of those
//! turns into a full read-modify-erase-write of the page.
#![cfg_attr(not(test), no_std)]

use embedded_storage::nor_flash::NorFlash;
use shared::FirmwareVersion;

pub mod config;
pub mod crypto;
pub mod erase;
pub mod secrets;
pub mod storage;
pub mod update_pin;

#[cfg(test)]
mod fixtures;

pub use crypto::{KeyError, PinKdf, ScryptKdf, UpdatePin};
pub use erase::{ERASE_PASSES, EraseReport};
pub use secrets::BootTarget;
pub use storage::{FlashMap, PageFlash, StoreError};
pub use update_pin::{UPDATE_PIN_CHECK_DELAY, UpdatePinState};

/// Where the store lives and which firmware version it stamps into records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    pub map: FlashMap,
    pub version: FirmwareVersion,
}

impl StoreConfig {
    pub const fn new(map: FlashMap, version: FirmwareVersion) -> Self {
        Self { map, version }
    }
}

pub struct UserPageStore<F, K = ScryptKdf> {
    flash: PageFlash<F>,
    kdf: K,
    version: FirmwareVersion,
}

impl<F, K> UserPageStore<F, K>
where
    F: NorFlash,
    K: PinKdf,
{
    pub fn new(flash: F, config: StoreConfig, kdf: K) -> Self {
        Self {
            flash: PageFlash::new(flash, config.map),
            kdf,
            version: config.version,
        }
    }

    /// Raw page access for callers that manage their own fields.
    pub fn page(&self) -> &PageFlash<F> {
        &self.flash
    }

    pub fn version(&self) -> FirmwareVersion {
        self.version
    }

    pub fn into_flash(self) -> F {
        self.flash.into_inner()
    }
}
