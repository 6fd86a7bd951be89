use thiserror::Error;

/// Problems detected while validating a configuration record read from flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("configuration magic 0x{0:04X} does not match; record is uninitialised")]
    InvalidMagic(u16),
}
