use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;
use shared::FirmwareVersion;
use shared::layout::PAGE_SIZE;

use crate::storage::sim::RamFlash;
use crate::{FlashMap, ScryptKdf, StoreConfig, UserPageStore};

pub(crate) type TestFlash = RamFlash<2>;
pub(crate) type TestStore = UserPageStore<TestFlash, ScryptKdf>;

pub(crate) const TEST_VERSION: FirmwareVersion = FirmwareVersion::new(0, 54);
pub(crate) const PASSWORD_SAFE_PAGE: u32 = PAGE_SIZE as u32;

pub(crate) fn store() -> TestStore {
    let config = StoreConfig::new(FlashMap::new(0, PASSWORD_SAFE_PAGE), TEST_VERSION);
    let kdf = ScryptKdf::with_cost(4, 1, 1).expect("cheap scrypt params");
    UserPageStore::new(TestFlash::new(), config, kdf)
}

pub(crate) fn rng(seed: u8) -> ChaCha20Rng {
    ChaCha20Rng::from_seed([seed; 32])
}
