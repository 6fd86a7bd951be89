//! Byte layout of the user page shared by the firmware and host tooling.
//!
//! The page is a single erasable flash unit. Every secret lives at a fixed
//! offset so that existing devices and the host management application agree
//! on where each field sits.
use core::ops::Range;

/// Size of the user page in bytes (one flash erase unit).
pub const PAGE_SIZE: usize = 1024;

/// Value every byte reads back as after an erase.
pub const ERASED_BYTE: u8 = 0xFF;

/// Leading span of the page that carries secrets and gets overwritten by each
/// secure-erase pass.
pub const ERASE_PATTERN_LEN: usize = 256;

pub const AES_KEY_LEN: usize = 32;
pub const XOR_MASK_LEN: usize = 32;
pub const PASSWORD_SAFE_KEY_LEN: usize = 32;

/// Candidate update PINs are zero padded to this width before derivation.
pub const UPDATE_PIN_MAX_LEN: usize = 20;
pub const UPDATE_PIN_MIN_LEN: usize = 8;
pub const UPDATE_PIN_SALT_LEN: usize = 10;
pub const UPDATE_PIN_HASH_LEN: usize = 32;

/// Credential installed whenever the update PIN is found uninitialised.
pub const DEFAULT_UPDATE_PIN: &[u8] = b"12345678";

/// "BOOT" token; its presence selects the firmware-update loader.
pub const BOOTLOADER_TOKEN: u32 = 0x424F_4F54;
/// Erased flag value; boots straight into the application.
pub const BOOTLOADER_EMPTY: u32 = 0xFFFF_FFFF;
pub const BOOTLOADER_FLAG_LEN: usize = 4;

/// Size of the packed configuration record.
pub const CONFIGURATION_LEN: usize = 25;

/// A named `(offset, len)` slice of the user page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub name: &'static str,
    pub offset: usize,
    pub len: usize,
}

impl Region {
    pub const fn new(name: &'static str, offset: usize, len: usize) -> Self {
        Self { name, offset, len }
    }

    pub const fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }

    pub const fn overlaps(&self, other: &Region) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }

    /// Returns the bytes of this region inside a full page image.
    pub fn slice<'a>(&self, page: &'a [u8; PAGE_SIZE]) -> &'a [u8] {
        &page[self.range()]
    }
}

pub const AES_STORAGE_KEY: Region = Region::new("aes storage key", 0, AES_KEY_LEN);
pub const CONFIGURATION: Region = Region::new("configuration", 72, CONFIGURATION_LEN);
pub const XOR_MASK: Region = Region::new("xor mask", 146, XOR_MASK_LEN);
pub const PASSWORD_SAFE_KEY: Region =
    Region::new("password safe key", 178, PASSWORD_SAFE_KEY_LEN);
pub const UPDATE_PIN_HASH: Region = Region::new("update pin hash", 210, UPDATE_PIN_HASH_LEN);
pub const UPDATE_PIN_SALT: Region = Region::new("update pin salt", 242, UPDATE_PIN_SALT_LEN);
pub const BOOTLOADER_FLAG: Region = Region::new("bootloader flag", 252, BOOTLOADER_FLAG_LEN);

pub const ALL_REGIONS: [Region; 7] = [
    AES_STORAGE_KEY,
    CONFIGURATION,
    XOR_MASK,
    PASSWORD_SAFE_KEY,
    UPDATE_PIN_HASH,
    UPDATE_PIN_SALT,
    BOOTLOADER_FLAG,
];

const fn regions_are_disjoint(regions: &[Region]) -> bool {
    let mut i = 0;
    while i < regions.len() {
        if regions[i].end() > ERASE_PATTERN_LEN {
            return false;
        }
        let mut j = i + 1;
        while j < regions.len() {
            if regions[i].overlaps(&regions[j]) {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

const _: () = assert!(regions_are_disjoint(&ALL_REGIONS));
const _: () = assert!(ERASE_PATTERN_LEN <= PAGE_SIZE);

/// Checks that `len` bytes starting at `offset` fit inside the page.
pub fn fits_in_page(offset: usize, len: usize) -> bool {
    offset
        .checked_add(len)
        .is_some_and(|end| end <= PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_match_programmed_devices() {
        assert_eq!(AES_STORAGE_KEY.range(), 0..32);
        assert_eq!(CONFIGURATION.range(), 72..97);
        assert_eq!(XOR_MASK.range(), 146..178);
        assert_eq!(PASSWORD_SAFE_KEY.range(), 178..210);
        assert_eq!(UPDATE_PIN_HASH.range(), 210..242);
        assert_eq!(UPDATE_PIN_SALT.range(), 242..252);
        assert_eq!(BOOTLOADER_FLAG.range(), 252..256);
    }

    #[test]
    fn overlap_detection() {
        let a = Region::new("a", 0, 10);
        let b = Region::new("b", 9, 4);
        let c = Region::new("c", 10, 4);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(!regions_are_disjoint(&[a, b]));
    }

    #[test]
    fn page_bounds_reject_overflowing_offsets() {
        assert!(fits_in_page(0, PAGE_SIZE));
        assert!(fits_in_page(PAGE_SIZE, 0));
        assert!(!fits_in_page(PAGE_SIZE - 3, 4));
        assert!(!fits_in_page(usize::MAX, 2));
    }
}
