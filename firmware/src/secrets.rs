//! Fixed-size secrets and the bootloader flag.
use embedded_storage::nor_flash::NorFlash;
use shared::layout::{
    self, AES_KEY_LEN, BOOTLOADER_EMPTY, BOOTLOADER_TOKEN, PASSWORD_SAFE_KEY_LEN, Region,
    XOR_MASK_LEN,
};
use zeroize::Zeroizing;

use crate::UserPageStore;
use crate::crypto::PinKdf;
use crate::storage::StoreError;

/// Image the next reset boots into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootTarget {
    Loader,
    Application,
}

impl<F, K> UserPageStore<F, K>
where
    F: NorFlash,
    K: PinKdf,
{
    fn read_secret<const N: usize>(
        &self,
        region: Region,
    ) -> Result<Zeroizing<[u8; N]>, StoreError<F::Error>> {
        let mut secret = Zeroizing::new([0u8; N]);
        self.flash.read_region(region, &mut secret[..])?;
        Ok(secret)
    }

    pub fn write_aes_storage_key(
        &self,
        key: &[u8; AES_KEY_LEN],
    ) -> Result<(), StoreError<F::Error>> {
        self.flash.write_region(layout::AES_STORAGE_KEY, key)
    }

    pub fn read_aes_storage_key(
        &self,
    ) -> Result<Zeroizing<[u8; AES_KEY_LEN]>, StoreError<F::Error>> {
        self.read_secret(layout::AES_STORAGE_KEY)
    }

    /// Mask applied to keys transferred from the smart card.
    pub fn write_xor_mask(&self, mask: &[u8; XOR_MASK_LEN]) -> Result<(), StoreError<F::Error>> {
        self.flash.write_region(layout::XOR_MASK, mask)
    }

    pub fn read_xor_mask(&self) -> Result<Zeroizing<[u8; XOR_MASK_LEN]>, StoreError<F::Error>> {
        self.read_secret(layout::XOR_MASK)
    }

    /// Stores the (already encrypted) password-safe key.
    pub fn write_password_safe_key(
        &self,
        key: &[u8; PASSWORD_SAFE_KEY_LEN],
    ) -> Result<(), StoreError<F::Error>> {
        self.flash.write_region(layout::PASSWORD_SAFE_KEY, key)
    }

    pub fn read_password_safe_key(
        &self,
    ) -> Result<Zeroizing<[u8; PASSWORD_SAFE_KEY_LEN]>, StoreError<F::Error>> {
        self.read_secret(layout::PASSWORD_SAFE_KEY)
    }

    pub fn write_bootloader_flag(&self) -> Result<(), StoreError<F::Error>> {
        log::info!("next reset boots the update loader");
        let flag = BOOTLOADER_TOKEN.to_le_bytes();
        self.flash.write_region(layout::BOOTLOADER_FLAG, &flag)
    }

    pub fn erase_bootloader_flag(&self) -> Result<(), StoreError<F::Error>> {
        let flag = BOOTLOADER_EMPTY.to_le_bytes();
        self.flash.write_region(layout::BOOTLOADER_FLAG, &flag)
    }

    pub fn boot_target(&self) -> Result<BootTarget, StoreError<F::Error>> {
        let mut flag = [0u8; layout::BOOTLOADER_FLAG_LEN];
        self.flash.read_region(layout::BOOTLOADER_FLAG, &mut flag)?;
        Ok(if u32::from_le_bytes(flag) == BOOTLOADER_TOKEN {
            BootTarget::Loader
        } else {
            BootTarget::Application
        })
    }
}
