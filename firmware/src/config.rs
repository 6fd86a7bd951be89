//! Configuration record manager.
//!
//! The record is a plain value owned by the caller. Every method takes it
//! explicitly and the page is the only persistent copy.
use embedded_storage::nor_flash::NorFlash;
use rand_core::{CryptoRng, RngCore};
use shared::layout;
use shared::{DynamicFields, TokenConfig, VolumeAccess, VolumeKind};

use crate::UserPageStore;
use crate::crypto::PinKdf;
use crate::storage::StoreError;

impl<F, K> UserPageStore<F, K>
where
    F: NorFlash,
    K: PinKdf,
{
    /// Persists `config`, clearing the reserved version bytes first.
    pub fn write_config(&self, config: &mut TokenConfig) -> Result<(), StoreError<F::Error>> {
        config.clear_reserved();
        let bytes = config.encode();
        self.flash.write_region(layout::CONFIGURATION, &bytes)
    }

    /// Decodes whatever the page currently holds, valid or not.
    pub fn load_config(&self) -> Result<TokenConfig, StoreError<F::Error>> {
        let mut bytes = [0u8; TokenConfig::ENCODED_LEN];
        self.flash.read_region(layout::CONFIGURATION, &mut bytes)?;
        Ok(TokenConfig::decode(bytes))
    }

    /// Reloads `config` from the page, keeping its retry counters and active
    /// smart-card id, and validates the magic number.
    ///
    /// On [`StoreError::InvalidRecord`] `config` is left untouched.
    pub fn read_config(&self, config: &mut TokenConfig) -> Result<(), StoreError<F::Error>> {
        let dynamic = config.dynamic();
        let mut stored = self.load_config()?;
        stored.restore_dynamic(dynamic);
        stored.clear_reserved();

        if let Err(err) = stored.validate() {
            log::warn!("stored configuration rejected: {err}");
            return Err(err.into());
        }

        *config = stored;
        Ok(())
    }

    /// Resets `config` to factory defaults, persists it and bootstraps the
    /// update PIN with the default credential.
    pub fn init_config<R>(
        &self,
        config: &mut TokenConfig,
        rng: &mut R,
    ) -> Result<(), StoreError<F::Error>>
    where
        R: RngCore + CryptoRng,
    {
        *config = TokenConfig::defaults(self.version);
        self.write_config(config)?;
        self.initialize_update_pin(rng)?;
        log::info!(
            "configuration initialised (firmware {}.{})",
            self.version.major,
            self.version.minor
        );
        Ok(())
    }

    /// Reloads `config`, falling back to [`Self::init_config`] when the page
    /// holds no valid record.
    pub fn ensure_config<R>(
        &self,
        config: &mut TokenConfig,
        rng: &mut R,
    ) -> Result<(), StoreError<F::Error>>
    where
        R: RngCore + CryptoRng,
    {
        match self.read_config(config) {
            Err(StoreError::InvalidRecord(_)) => self.init_config(config, rng),
            other => other,
        }
    }

    fn modify_config<R>(
        &self,
        config: &mut TokenConfig,
        rng: &mut R,
        update: impl FnOnce(&mut TokenConfig),
    ) -> Result<(), StoreError<F::Error>>
    where
        R: RngCore + CryptoRng,
    {
        self.ensure_config(config, rng)?;
        update(config);
        self.write_config(config)
    }

    pub fn set_keys_not_initiated<R>(
        &self,
        config: &mut TokenConfig,
        rng: &mut R,
    ) -> Result<(), StoreError<F::Error>>
    where
        R: RngCore + CryptoRng,
    {
        self.modify_config(config, rng, |config| config.keys_not_initiated = true)
    }

    pub fn clear_keys_not_initiated<R>(
        &self,
        config: &mut TokenConfig,
        rng: &mut R,
    ) -> Result<(), StoreError<F::Error>>
    where
        R: RngCore + CryptoRng,
    {
        self.modify_config(config, rng, |config| config.keys_not_initiated = false)
    }

    pub fn set_sd_card_filled<R>(
        &self,
        config: &mut TokenConfig,
        rng: &mut R,
    ) -> Result<(), StoreError<F::Error>>
    where
        R: RngCore + CryptoRng,
    {
        self.modify_config(config, rng, |config| {
            config.sd_filled_random.record_change()
        })
    }

    /// Clears the "filled with random data" bit, keeping its change counter.
    pub fn set_sd_card_not_filled<R>(
        &self,
        config: &mut TokenConfig,
        rng: &mut R,
    ) -> Result<(), StoreError<F::Error>>
    where
        R: RngCore + CryptoRng,
    {
        self.modify_config(config, rng, |config| config.sd_filled_random.clear())
    }

    /// Stores a newly inserted SD card id. Re-inserting the active card is a
    /// no-op apart from the rewrite.
    pub fn record_sd_card<R>(
        &self,
        config: &mut TokenConfig,
        card_id: u32,
        rng: &mut R,
    ) -> Result<(), StoreError<F::Error>>
    where
        R: RngCore + CryptoRng,
    {
        self.modify_config(config, rng, |config| {
            if config.active_sd_card_id != card_id {
                config.active_sd_card_id = card_id;
                config.new_sd_card.record_change();
            }
        })
    }

    pub fn set_volume_access<R>(
        &self,
        config: &mut TokenConfig,
        kind: VolumeKind,
        access: VolumeAccess,
        rng: &mut R,
    ) -> Result<(), StoreError<F::Error>>
    where
        R: RngCore + CryptoRng,
    {
        self.modify_config(config, rng, |config| config.set_access(kind, access))
    }

    pub fn set_firmware_locked<R>(
        &self,
        config: &mut TokenConfig,
        locked: bool,
        rng: &mut R,
    ) -> Result<(), StoreError<F::Error>>
    where
        R: RngCore + CryptoRng,
    {
        self.modify_config(config, rng, |config| config.firmware_locked = locked)
    }

    /// The one path that overwrites the card-owned dynamic fields.
    pub fn write_dynamic_fields<R>(
        &self,
        config: &mut TokenConfig,
        fields: DynamicFields,
        rng: &mut R,
    ) -> Result<(), StoreError<F::Error>>
    where
        R: RngCore + CryptoRng,
    {
        self.ensure_config(config, rng)?;
        config.restore_dynamic(fields);
        self.write_config(config)
    }
}

#[cfg(test)]
mod tests {
    use shared::{CONFIG_MAGIC, RecordError};

    use crate::fixtures::{TEST_VERSION, rng, store};

    use super::*;

    #[test]
    fn read_reloads_from_page_before_validating() {
        let store = store();
        let mut persisted = TokenConfig::defaults(TEST_VERSION);
        persisted.active_sd_card_id = 0x1234_5678;
        store.write_config(&mut persisted).unwrap();

        // In-memory copy is stale and carries an invalid magic.
        let mut held = TokenConfig::erased();
        store.read_config(&mut held).unwrap();

        assert_eq!(held.magic, CONFIG_MAGIC);
        assert_eq!(held.active_sd_card_id, 0x1234_5678);
    }

    #[test]
    fn read_rejects_erased_page_even_with_valid_memory_copy() {
        let store = store();
        let mut held = TokenConfig::defaults(TEST_VERSION);

        let err = store.read_config(&mut held).unwrap_err();

        assert_eq!(err, StoreError::InvalidRecord(RecordError::InvalidMagic(0xFFFF)));
        assert_eq!(held, TokenConfig::defaults(TEST_VERSION));
    }

    #[test]
    fn read_preserves_dynamic_fields() {
        let store = store();
        let mut persisted = TokenConfig::defaults(TEST_VERSION);
        persisted.user_pin_retries = 3;
        store.write_config(&mut persisted).unwrap();

        let mut held = TokenConfig::defaults(TEST_VERSION);
        held.user_pin_retries = 1;
        held.admin_pin_retries = 2;
        held.active_smart_card_id = 0xCAFE_F00D;
        held.firmware_locked = true;
        store.read_config(&mut held).unwrap();

        assert_eq!(held.user_pin_retries, 1);
        assert_eq!(held.admin_pin_retries, 2);
        assert_eq!(held.active_smart_card_id, 0xCAFE_F00D);
        assert!(!held.firmware_locked);
    }

    #[test]
    fn init_is_idempotent() {
        let store = store();
        let mut rng = rng(1);
        let mut config = TokenConfig::erased();

        store.init_config(&mut config, &mut rng).unwrap();
        let first = store.page().read_page().unwrap();
        store.init_config(&mut config, &mut rng).unwrap();
        let second = store.page().read_page().unwrap();

        assert_eq!(
            first[layout::CONFIGURATION.range()],
            second[layout::CONFIGURATION.range()]
        );
        assert_eq!(store.load_config().unwrap(), TokenConfig::defaults(TEST_VERSION));
    }

    #[test]
    fn ensure_initialises_blank_page() {
        let store = store();
        let mut rng = rng(2);
        let mut config = TokenConfig::erased();

        store.ensure_config(&mut config, &mut rng).unwrap();

        assert!(config.is_valid());
        assert!(config.keys_not_initiated);
    }

    #[test]
    fn modifiers_persist_single_fields() {
        let store = store();
        let mut rng = rng(3);
        let mut config = TokenConfig::erased();

        store.clear_keys_not_initiated(&mut config, &mut rng).unwrap();
        store
            .set_volume_access(&mut config, VolumeKind::Hidden, VolumeAccess::ReadOnly, &mut rng)
            .unwrap();
        store.set_sd_card_filled(&mut config, &mut rng).unwrap();
        store.set_sd_card_not_filled(&mut config, &mut rng).unwrap();
        store.record_sd_card(&mut config, 42, &mut rng).unwrap();
        store.set_firmware_locked(&mut config, true, &mut rng).unwrap();

        let stored = store.load_config().unwrap();
        assert!(!stored.keys_not_initiated);
        assert_eq!(stored.hidden_volume, VolumeAccess::ReadOnly);
        assert_eq!(stored.uncrypted_volume, VolumeAccess::ReadWrite);
        assert!(!stored.sd_filled_random.is_set());
        assert_eq!(stored.sd_filled_random.counter(), 1);
        assert_eq!(stored.active_sd_card_id, 42);
        assert!(stored.new_sd_card.is_set());
        assert!(stored.firmware_locked);

        store.set_keys_not_initiated(&mut config, &mut rng).unwrap();
        assert!(store.load_config().unwrap().keys_not_initiated);
    }

    #[test]
    fn dynamic_fields_only_change_through_their_writer() {
        let store = store();
        let mut rng = rng(4);
        let mut config = TokenConfig::erased();
        store.ensure_config(&mut config, &mut rng).unwrap();

        let fields = DynamicFields {
            user_pin_retries: 3,
            admin_pin_retries: 3,
            active_smart_card_id: 7,
        };
        store
            .write_dynamic_fields(&mut config, fields, &mut rng)
            .unwrap();

        let mut fresh = TokenConfig::defaults(TEST_VERSION);
        store.read_config(&mut fresh).unwrap();
        assert_eq!(fresh.dynamic(), DynamicFields::default());
        assert_eq!(store.load_config().unwrap().dynamic(), fields);
    }
}
