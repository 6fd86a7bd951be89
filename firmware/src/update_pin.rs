//! Firmware-update PIN credential.
//!
//! The page stores a random salt and the derived hash of the zero-padded PIN.
//! An all-`0xFF` salt means the page was erased and the credential has never
//! been provisioned; it is replaced by the default PIN before any comparison.
use embassy_time::Duration;
use embedded_storage::nor_flash::NorFlash;
use rand_core::{CryptoRng, RngCore};
use shared::layout::{self, ERASED_BYTE, UPDATE_PIN_HASH_LEN, UPDATE_PIN_SALT_LEN};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::UserPageStore;
use crate::crypto::{PinHash, PinKdf, PinSalt, UpdatePin};
use crate::storage::StoreError;

/// Minimum time every PIN check takes, whatever its outcome.
pub const UPDATE_PIN_CHECK_DELAY: Duration = Duration::from_millis(100);

// Hash and salt sit back to back so one page cycle replaces both.
const _: () = assert!(layout::UPDATE_PIN_HASH.end() == layout::UPDATE_PIN_SALT.offset);
const CREDENTIAL_LEN: usize = UPDATE_PIN_HASH_LEN + UPDATE_PIN_SALT_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePinState {
    Uninitialized,
    Provisioned,
}

/// Stalls for [`UPDATE_PIN_CHECK_DELAY`] when dropped, so the delay applies
/// to every return path of a check.
struct CheckThrottle;

impl Drop for CheckThrottle {
    fn drop(&mut self) {
        embassy_time::block_for(UPDATE_PIN_CHECK_DELAY);
    }
}

fn salt_is_erased(salt: &PinSalt) -> bool {
    salt.iter().all(|byte| *byte == ERASED_BYTE)
}

impl<F, K> UserPageStore<F, K>
where
    F: NorFlash,
    K: PinKdf,
{
    pub fn update_pin_state(&self) -> Result<UpdatePinState, StoreError<F::Error>> {
        let salt = self.read_update_pin_salt()?;
        Ok(if salt_is_erased(&salt) {
            UpdatePinState::Uninitialized
        } else {
            UpdatePinState::Provisioned
        })
    }

    /// Compares `candidate` against the stored credential, installing the
    /// default PIN first if none is provisioned.
    ///
    /// Always blocks for at least [`UPDATE_PIN_CHECK_DELAY`].
    pub fn check_update_pin<R>(
        &self,
        candidate: &[u8],
        rng: &mut R,
    ) -> Result<(), StoreError<F::Error>>
    where
        R: RngCore + CryptoRng,
    {
        let _throttle = CheckThrottle;
        let pin = UpdatePin::new(candidate)?;

        let mut salt = self.read_update_pin_salt()?;
        if salt_is_erased(&salt) {
            log::info!("update PIN not provisioned; installing default");
            self.initialize_update_pin(rng)?;
            salt = self.read_update_pin_salt()?;
        }

        let mut derived = Zeroizing::new([0u8; UPDATE_PIN_HASH_LEN]);
        self.kdf.derive(&pin, &salt, &mut derived)?;
        let stored = self.read_update_pin_hash()?;

        if bool::from(derived[..].ct_eq(&stored[..])) {
            Ok(())
        } else {
            log::warn!("update PIN rejected");
            Err(StoreError::AuthenticationFailure)
        }
    }

    /// Replaces the credential with `candidate` under a fresh salt.
    ///
    /// Candidates whose last non-zero byte sits before the eighth position are
    /// rejected with [`StoreError::CredentialTooShort`] and nothing is written.
    pub fn store_update_pin<R>(
        &self,
        candidate: &[u8],
        rng: &mut R,
    ) -> Result<(), StoreError<F::Error>>
    where
        R: RngCore + CryptoRng,
    {
        let pin = UpdatePin::new(candidate)?;
        self.store_pin(&pin, rng)
    }

    /// Installs the default PIN ("12345678").
    pub fn initialize_update_pin<R>(&self, rng: &mut R) -> Result<(), StoreError<F::Error>>
    where
        R: RngCore + CryptoRng,
    {
        self.store_pin(&UpdatePin::default_pin(), rng)
    }

    /// Verifies `current` before rotating to `new`.
    pub fn change_update_pin<R>(
        &self,
        current: &[u8],
        new: &[u8],
        rng: &mut R,
    ) -> Result<(), StoreError<F::Error>>
    where
        R: RngCore + CryptoRng,
    {
        self.check_update_pin(current, rng)?;
        self.store_update_pin(new, rng)
    }

    fn store_pin<R>(&self, pin: &UpdatePin, rng: &mut R) -> Result<(), StoreError<F::Error>>
    where
        R: RngCore + CryptoRng,
    {
        if !pin.meets_minimum() {
            log::warn!(
                "update PIN rotation refused: {} significant bytes",
                pin.significant_len()
            );
            return Err(StoreError::CredentialTooShort);
        }

        let mut salt: PinSalt = [0u8; UPDATE_PIN_SALT_LEN];
        loop {
            rng.fill_bytes(&mut salt);
            if !salt_is_erased(&salt) {
                break;
            }
        }

        let mut hash = Zeroizing::new([0u8; UPDATE_PIN_HASH_LEN]);
        self.kdf.derive(pin, &salt, &mut hash)?;

        let mut credential = Zeroizing::new([0u8; CREDENTIAL_LEN]);
        credential[..UPDATE_PIN_HASH_LEN].copy_from_slice(&hash[..]);
        credential[UPDATE_PIN_HASH_LEN..].copy_from_slice(&salt);

        let offset = layout::UPDATE_PIN_HASH.offset;
        self.flash.write(&credential[..], offset)?;
        log::info!("update PIN credential replaced");
        Ok(())
    }

    fn read_update_pin_salt(&self) -> Result<PinSalt, StoreError<F::Error>> {
        let mut salt = [0u8; UPDATE_PIN_SALT_LEN];
        self.flash.read_region(layout::UPDATE_PIN_SALT, &mut salt)?;
        Ok(salt)
    }

    fn read_update_pin_hash(&self) -> Result<Zeroizing<PinHash>, StoreError<F::Error>> {
        let mut hash = Zeroizing::new([0u8; UPDATE_PIN_HASH_LEN]);
        let region = layout::UPDATE_PIN_HASH;
        self.flash.read_region(region, &mut hash[..])?;
        Ok(hash)
    }
}
