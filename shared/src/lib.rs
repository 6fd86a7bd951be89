//! Wire contract between the token firmware and host tooling: the user-page
//! layout and the packed configuration record.
#![cfg_attr(not(feature = "std"), no_std)]

pub mod config;
pub mod error;
pub mod layout;

pub use config::{
    CONFIG_MAGIC, ChangeFlag, DynamicFields, FirmwareVersion, TokenConfig, VolumeAccess,
    VolumeKind,
};
pub use error::RecordError;
