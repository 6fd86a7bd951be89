//! Key derivation for the firmware-update PIN.
use scrypt::{
    Params as ScryptParams,
    errors::{InvalidOutputLen, InvalidParams},
};
use shared::layout::{
    DEFAULT_UPDATE_PIN, UPDATE_PIN_HASH_LEN, UPDATE_PIN_MAX_LEN, UPDATE_PIN_MIN_LEN,
    UPDATE_PIN_SALT_LEN,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

// 128 * r * 2^log_n bytes of working memory; sized for the MCU heap.
const SCRYPT_LOG_N: u8 = 7;
const SCRYPT_R: u32 = 4;
const SCRYPT_P: u32 = 1;

pub type PinSalt = [u8; UPDATE_PIN_SALT_LEN];
pub type PinHash = [u8; UPDATE_PIN_HASH_LEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyError {
    InvalidParameters,
    InvalidOutput,
    PinTooLong,
}

impl From<InvalidParams> for KeyError {
    fn from(_: InvalidParams) -> Self {
        KeyError::InvalidParameters
    }
}

impl From<InvalidOutputLen> for KeyError {
    fn from(_: InvalidOutputLen) -> Self {
        KeyError::InvalidOutput
    }
}

impl core::fmt::Display for KeyError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            KeyError::InvalidParameters => "invalid scrypt parameters",
            KeyError::InvalidOutput => "invalid scrypt output length",
            KeyError::PinTooLong => "update PIN exceeds 20 bytes",
        };
        write!(f, "{label}")
    }
}

impl core::error::Error for KeyError {}

/// Update PIN zero padded to the fixed derivation width.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct UpdatePin([u8; UPDATE_PIN_MAX_LEN]);

impl UpdatePin {
    pub fn new(candidate: &[u8]) -> Result<Self, KeyError> {
        if candidate.len() > UPDATE_PIN_MAX_LEN {
            return Err(KeyError::PinTooLong);
        }
        let mut padded = [0u8; UPDATE_PIN_MAX_LEN];
        padded[..candidate.len()].copy_from_slice(candidate);
        Ok(Self(padded))
    }

    pub fn default_pin() -> Self {
        let mut padded = [0u8; UPDATE_PIN_MAX_LEN];
        padded[..DEFAULT_UPDATE_PIN.len()].copy_from_slice(DEFAULT_UPDATE_PIN);
        Self(padded)
    }

    pub fn as_bytes(&self) -> &[u8; UPDATE_PIN_MAX_LEN] {
        &self.0
    }

    /// Length up to and including the last non-zero byte.
    pub fn significant_len(&self) -> usize {
        self.0
            .iter()
            .rposition(|byte| *byte != 0)
            .map_or(0, |index| index + 1)
    }

    /// Embedded zeros count toward the length; only the trailing padding is
    /// ignored.
    pub fn meets_minimum(&self) -> bool {
        self.significant_len() >= UPDATE_PIN_MIN_LEN
    }
}

impl core::fmt::Debug for UpdatePin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("UpdatePin(..)")
    }
}

/// Derives the stored update-PIN hash from a padded PIN and its salt.
pub trait PinKdf {
    fn derive(&self, pin: &UpdatePin, salt: &PinSalt, output: &mut PinHash)
    -> Result<(), KeyError>;
}

#[derive(Debug, Clone, Copy)]
pub struct ScryptKdf {
    params: ScryptParams,
}

impl ScryptKdf {
    pub fn new(params: ScryptParams) -> Self {
        Self { params }
    }

    pub fn with_cost(log_n: u8, r: u32, p: u32) -> Result<Self, KeyError> {
        Ok(Self::new(ScryptParams::new(log_n, r, p)?))
    }

    /// Cost parameters used on the device.
    pub fn device() -> Result<Self, KeyError> {
        Self::with_cost(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P)
    }

    pub fn params(&self) -> ScryptParams {
        self.params
    }
}

impl PinKdf for ScryptKdf {
    fn derive(
        &self,
        pin: &UpdatePin,
        salt: &PinSalt,
        output: &mut PinHash,
    ) -> Result<(), KeyError> {
        scrypt::scrypt(pin.as_bytes(), salt, &self.params, output).map_err(KeyError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pins_are_zero_padded() {
        let pin = UpdatePin::new(b"abc").unwrap();
        assert_eq!(&pin.as_bytes()[..3], b"abc");
        assert!(pin.as_bytes()[3..].iter().all(|byte| *byte == 0));
        assert_eq!(pin.significant_len(), 3);
    }

    #[test]
    fn oversized_pin_is_rejected() {
        let err = UpdatePin::new(&[b'x'; 21]).unwrap_err();
        assert_eq!(err, KeyError::PinTooLong);
    }

    #[test]
    fn minimum_length_counts_up_to_last_non_zero_byte() {
        assert!(UpdatePin::default_pin().meets_minimum());
        assert!(!UpdatePin::new(b"short").unwrap().meets_minimum());
        assert!(!UpdatePin::new(b"1234567").unwrap().meets_minimum());
        assert!(UpdatePin::new(b"\0\0\0\0\0\0\0x").unwrap().meets_minimum());
        assert!(!UpdatePin::new(b"").unwrap().meets_minimum());
    }

    #[test]
    fn debug_output_hides_pin() {
        let pin = UpdatePin::default_pin();
        assert_eq!(format!("{pin:?}"), "UpdatePin(..)");
    }

    #[test]
    fn scrypt_derivation_depends_on_salt() {
        let kdf = ScryptKdf::with_cost(4, 1, 1).unwrap();
        let pin = UpdatePin::default_pin();
        let mut first = [0u8; UPDATE_PIN_HASH_LEN];
        let mut second = [0u8; UPDATE_PIN_HASH_LEN];

        kdf.derive(&pin, &[1; UPDATE_PIN_SALT_LEN], &mut first).unwrap();
        kdf.derive(&pin, &[2; UPDATE_PIN_SALT_LEN], &mut second).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn device_cost_fits_the_mcu() {
        let params = ScryptKdf::device().unwrap().params();
        assert_eq!(
            (params.log_n(), params.r(), params.p()),
            (SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P)
        );
        // 128 * r * 2^log_n bytes of scratch.
        assert!(128 * params.r() as usize * (1 << params.log_n()) <= 64 * 1024);
    }

    #[test]
    fn invalid_cost_is_rejected() {
        assert_eq!(
            ScryptKdf::with_cost(1, 0, 0).unwrap_err(),
            KeyError::InvalidParameters
        );
    }
}
