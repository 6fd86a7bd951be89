//! Multi-pass wipe of the secret-bearing flash pages.
//!
//! Each pass overwrites the target with fresh random data through a full
//! erase/program cycle so that residual charge from earlier contents is
//! scrambled. The fill data only needs to be unpredictable, not secret, so
//! any `RngCore` will do; the update-PIN salt drawn while reinitialising
//! still comes from the caller's `CryptoRng`.
//!
//! The auxiliary OTP/key-slot pages are owned by the slot storage and must be
//! wiped there; this routine does not touch them.
use embedded_storage::nor_flash::NorFlash;
use rand_core::{CryptoRng, RngCore};
use shared::TokenConfig;
use shared::layout::{ERASE_PATTERN_LEN, PAGE_SIZE};
use zeroize::Zeroizing;

use crate::UserPageStore;
use crate::crypto::PinKdf;
use crate::storage::StoreError;

pub const ERASE_PASSES: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EraseReport {
    pub user_page_passes: usize,
    pub password_safe_passes: usize,
}

impl<F, K> UserPageStore<F, K>
where
    F: NorFlash,
    K: PinKdf,
{
    /// Wipes the user page, restores factory configuration and a default
    /// update PIN, then wipes the password-safe page.
    ///
    /// A flash failure aborts the procedure; the report of a successful run
    /// always shows [`ERASE_PASSES`] for both pages.
    pub fn secure_erase<N, R>(
        &self,
        config: &mut TokenConfig,
        fill_rng: &mut N,
        key_rng: &mut R,
    ) -> Result<EraseReport, StoreError<F::Error>>
    where
        N: RngCore,
        R: RngCore + CryptoRng,
    {
        log::info!("secure erase started");
        let mut report = EraseReport::default();

        let mut pattern = Zeroizing::new([0u8; ERASE_PATTERN_LEN]);
        for _ in 0..ERASE_PASSES {
            fill_rng.fill_bytes(&mut pattern[..]);
            self.flash.write(&pattern[..], 0)?;
            report.user_page_passes += 1;
        }

        self.init_config(config, key_rng)?;

        let password_safe_page = self.flash.map().password_safe_page;
        let mut image = Zeroizing::new([0u8; PAGE_SIZE]);
        for _ in 0..ERASE_PASSES {
            fill_rng.fill_bytes(&mut image[..]);
            self.flash.overwrite_page(password_safe_page, &image)?;
            report.password_safe_passes += 1;
        }

        log::info!(
            "secure erase finished ({} + {} passes)",
            report.user_page_passes,
            report.password_safe_passes
        );
        Ok(report)
    }
}
