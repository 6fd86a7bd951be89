use shared::layout::CONFIGURATION;
use shared::{CONFIG_MAGIC, ChangeFlag, FirmwareVersion, RecordError, TokenConfig, VolumeAccess};

fn populated() -> TokenConfig {
    TokenConfig {
        magic: CONFIG_MAGIC,
        uncrypted_volume: VolumeAccess::ReadOnly,
        crypted_volume: VolumeAccess::ReadWrite,
        version: FirmwareVersion::new(0, 54),
        reserved: [0; 2],
        hidden_volume: VolumeAccess::ReadOnly,
        firmware_locked: true,
        new_sd_card: ChangeFlag(0x05),
        sd_filled_random: ChangeFlag(0x03),
        active_sd_card_id: 0x1122_3344,
        volume_active: 0x02,
        new_smart_card: ChangeFlag(0x07),
        user_pin_retries: 3,
        admin_pin_retries: 2,
        active_smart_card_id: 0xAABB_CCDD,
        keys_not_initiated: false,
    }
}

#[test]
fn packed_layout_matches_host_contract() {
    let bytes = populated().encode();

    assert_eq!(bytes.len(), CONFIGURATION.len);
    assert_eq!(
        bytes,
        [
            0x10, 0x18, // magic
            0x01, // uncrypted volume
            0x00, // crypted volume
            0x00, 0x36, 0x00, 0x00, // version, reserved build bytes
            0x01, // hidden volume
            0x01, // firmware locked
            0x05, // new sd card
            0x03, // sd filled
            0x44, 0x33, 0x22, 0x11, // active sd card id
            0x02, // active volume
            0x07, // new smart card
            0x03, 0x02, // retry counters
            0xDD, 0xCC, 0xBB, 0xAA, // active smart card id
            0x00, // keys not initiated
        ]
    );
}

#[test]
fn decode_inverts_encode() {
    let config = populated();
    assert_eq!(TokenConfig::decode(config.encode()), config);
}

#[test]
fn reserved_bytes_never_reach_the_wire() {
    let mut config = populated();
    config.reserved = [0xEE, 0xEE];

    let decoded = TokenConfig::decode(config.encode());

    assert_eq!(decoded.reserved, [0, 0]);
}

#[test]
fn foreign_magic_is_reported() {
    let mut bytes = populated().encode();
    bytes[0..2].copy_from_slice(&0x1809u16.to_le_bytes());

    let err = TokenConfig::decode(bytes).validate().unwrap_err();

    assert_eq!(err, RecordError::InvalidMagic(0x1809));
    assert_eq!(
        err.to_string(),
        "configuration magic 0x1809 does not match; record is uninitialised"
    );
}

#[test]
fn flag_bytes_are_canonicalised_on_rewrite() {
    let mut bytes = populated().encode();
    bytes[2] = 0x80; // uncrypted volume
    bytes[9] = 0x02; // firmware locked
    bytes[24] = 0xFF; // keys not initiated

    let decoded = TokenConfig::decode(bytes);
    assert_eq!(decoded.uncrypted_volume, VolumeAccess::ReadOnly);
    assert!(decoded.firmware_locked);
    assert!(decoded.keys_not_initiated);

    let rewritten = decoded.encode();
    assert_eq!((rewritten[2], rewritten[9], rewritten[24]), (1, 1, 1));
    assert_eq!(rewritten[10..24], bytes[10..24]);
}
