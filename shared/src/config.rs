//! Packed configuration record stored in the user page.
//!
//! The record is also sent verbatim to the host management application, so
//! field order and widths are part of the wire contract. Multi-byte fields are
//! little-endian and there is no padding.
use crate::error::RecordError;
use crate::layout::CONFIGURATION_LEN;

/// Marks a valid record. Bump when the layout changes.
pub const CONFIG_MAGIC: u16 = 0x1810;

/// Read/write mode of one SD card volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum VolumeAccess {
    #[default]
    ReadWrite = 0,
    ReadOnly = 1,
}

impl VolumeAccess {
    pub fn from_wire(value: u8) -> Self {
        match value {
            0 => VolumeAccess::ReadWrite,
            _ => VolumeAccess::ReadOnly,
        }
    }

    pub fn to_wire(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeKind {
    Uncrypted,
    Crypted,
    Hidden,
}

/// A flag in bit 0 with a 7-bit change counter in bits 1-7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeFlag(pub u8);

impl ChangeFlag {
    const FLAG: u8 = 0x01;

    pub const fn is_set(self) -> bool {
        self.0 & Self::FLAG != 0
    }

    pub const fn counter(self) -> u8 {
        self.0 >> 1
    }

    pub fn set(&mut self) {
        self.0 |= Self::FLAG;
    }

    pub fn clear(&mut self) {
        self.0 &= !Self::FLAG;
    }

    /// Sets the flag and advances the counter, wrapping after 127.
    pub fn record_change(&mut self) {
        let counter = self.counter().wrapping_add(1) & 0x7F;
        self.0 = (counter << 1) | Self::FLAG;
    }
}

/// Major/minor firmware version. The two build bytes that follow on the wire
/// are reserved and always written as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl FirmwareVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

/// Fields owned by the card layer that survive a reload of the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DynamicFields {
    pub user_pin_retries: u8,
    pub admin_pin_retries: u8,
    pub active_smart_card_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenConfig {
    pub magic: u16,
    pub uncrypted_volume: VolumeAccess,
    pub crypted_volume: VolumeAccess,
    pub version: FirmwareVersion,
    /// Build bytes; forced to zero on every encode.
    pub reserved: [u8; 2],
    pub hidden_volume: VolumeAccess,
    pub firmware_locked: bool,
    pub new_sd_card: ChangeFlag,
    pub sd_filled_random: ChangeFlag,
    pub active_sd_card_id: u32,
    pub volume_active: u8,
    pub new_smart_card: ChangeFlag,
    pub user_pin_retries: u8,
    pub admin_pin_retries: u8,
    pub active_smart_card_id: u32,
    pub keys_not_initiated: bool,
}

impl TokenConfig {
    pub const ENCODED_LEN: usize = CONFIGURATION_LEN;

    /// Factory state: every volume writable, firmware unlocked, counters and
    /// ids cleared, keys still to be derived.
    pub fn defaults(version: FirmwareVersion) -> Self {
        Self {
            magic: CONFIG_MAGIC,
            uncrypted_volume: VolumeAccess::ReadWrite,
            crypted_volume: VolumeAccess::ReadWrite,
            version,
            reserved: [0; 2],
            hidden_volume: VolumeAccess::ReadWrite,
            firmware_locked: false,
            new_sd_card: ChangeFlag::default(),
            sd_filled_random: ChangeFlag::default(),
            active_sd_card_id: 0,
            volume_active: 0,
            new_smart_card: ChangeFlag::default(),
            user_pin_retries: 0,
            admin_pin_retries: 0,
            active_smart_card_id: 0,
            keys_not_initiated: true,
        }
    }

    /// Record as it decodes from an erased page.
    pub fn erased() -> Self {
        Self::decode([0xFF; Self::ENCODED_LEN])
    }

    pub fn is_valid(&self) -> bool {
        self.magic == CONFIG_MAGIC
    }

    pub fn validate(&self) -> Result<(), RecordError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(RecordError::InvalidMagic(self.magic))
        }
    }

    pub fn clear_reserved(&mut self) {
        self.reserved = [0; 2];
    }

    pub fn dynamic(&self) -> DynamicFields {
        DynamicFields {
            user_pin_retries: self.user_pin_retries,
            admin_pin_retries: self.admin_pin_retries,
            active_smart_card_id: self.active_smart_card_id,
        }
    }

    pub fn restore_dynamic(&mut self, fields: DynamicFields) {
        self.user_pin_retries = fields.user_pin_retries;
        self.admin_pin_retries = fields.admin_pin_retries;
        self.active_smart_card_id = fields.active_smart_card_id;
    }

    pub fn access(&self, kind: VolumeKind) -> VolumeAccess {
        match kind {
            VolumeKind::Uncrypted => self.uncrypted_volume,
            VolumeKind::Crypted => self.crypted_volume,
            VolumeKind::Hidden => self.hidden_volume,
        }
    }

    pub fn set_access(&mut self, kind: VolumeKind, access: VolumeAccess) {
        match kind {
            VolumeKind::Uncrypted => self.uncrypted_volume = access,
            VolumeKind::Crypted => self.crypted_volume = access,
            VolumeKind::Hidden => self.hidden_volume = access,
        }
    }

    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut bytes = [0u8; Self::ENCODED_LEN];
        bytes[0..2].copy_from_slice(&self.magic.to_le_bytes());
        bytes[2] = self.uncrypted_volume.to_wire();
        bytes[3] = self.crypted_volume.to_wire();
        bytes[4] = self.version.major;
        bytes[5] = self.version.minor;
        // bytes[6..8] are the reserved build bytes and stay zero.
        bytes[8] = self.hidden_volume.to_wire();
        bytes[9] = u8::from(self.firmware_locked);
        bytes[10] = self.new_sd_card.0;
        bytes[11] = self.sd_filled_random.0;
        bytes[12..16].copy_from_slice(&self.active_sd_card_id.to_le_bytes());
        bytes[16] = self.volume_active;
        bytes[17] = self.new_smart_card.0;
        bytes[18] = self.user_pin_retries;
        bytes[19] = self.admin_pin_retries;
        bytes[20..24].copy_from_slice(&self.active_smart_card_id.to_le_bytes());
        bytes[24] = u8::from(self.keys_not_initiated);
        bytes
    }

    /// Decodes any byte pattern; call [`TokenConfig::validate`] before trusting
    /// the result.
    ///
    /// Boolean and volume-mode bytes are normalised: any non-zero value reads
    /// as set (or read-only) and is written back as `1`, so the next
    /// [`TokenConfig::encode`] canonicalises those bytes.
    pub fn decode(bytes: [u8; Self::ENCODED_LEN]) -> Self {
        Self {
            magic: u16::from_le_bytes([bytes[0], bytes[1]]),
            uncrypted_volume: VolumeAccess::from_wire(bytes[2]),
            crypted_volume: VolumeAccess::from_wire(bytes[3]),
            version: FirmwareVersion::new(bytes[4], bytes[5]),
            reserved: [bytes[6], bytes[7]],
            hidden_volume: VolumeAccess::from_wire(bytes[8]),
            firmware_locked: bytes[9] != 0,
            new_sd_card: ChangeFlag(bytes[10]),
            sd_filled_random: ChangeFlag(bytes[11]),
            active_sd_card_id: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
            volume_active: bytes[16],
            new_smart_card: ChangeFlag(bytes[17]),
            user_pin_retries: bytes[18],
            admin_pin_retries: bytes[19],
            active_smart_card_id: u32::from_le_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]),
            keys_not_initiated: bytes[24] != 0,
        }
    }
}
