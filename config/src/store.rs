//! Cached access to the configuration stored in EEPROM.

use alloc::vec::Vec;

use log::{debug, info, warn};

use crate::{
    record::{self, MARKER},
    storage::Storage,
    BridgeConfiguration, ConfigError, Field, TransmitterId, WifiCredential,
};

/// Owns the storage region and a cached copy of the configuration.
///
/// Mutators only change the cached copy. Nothing is written to storage
/// before `save` is called.
pub struct ConfigStore<S> {
    storage: S,
    config: BridgeConfiguration,
    loaded: bool,
}

impl<S: Storage> ConfigStore<S> {
    /// Create a store holding the default configuration. Storage is not read.
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            config: BridgeConfiguration::default(),
            loaded: false,
        }
    }

    /// Create a store and load the configuration from storage.
    pub fn open(storage: S) -> Result<Self, ConfigError> {
        let mut store = Self::new(storage);
        store.load()?;
        Ok(store)
    }

    /// Read the configuration from storage, replacing the cached copy.
    ///
    /// Storage without a valid record yields the default configuration. If
    /// reading fails, the cached copy is left as it was.
    pub fn load(&mut self) -> Result<(), ConfigError> {
        let bytes = self.read_record()?;
        self.config = record::decode(&bytes);
        self.loaded = true;
        Ok(())
    }

    /// Read the raw record bytes, up to and excluding the end of the record.
    fn read_record(&mut self) -> Result<Vec<u8>, ConfigError> {
        let marker = self.storage.read(0)?;
        if marker != MARKER {
            info!("No valid configuration found (marker 0x{:02x})", marker);
            return Ok(Vec::new());
        }

        let mut bytes = Vec::with_capacity(64);
        bytes.push(marker);
        for offset in 1..record::HEADER_LEN {
            bytes.push(self.storage.read(offset)?);
        }
        for offset in record::HEADER_LEN..record::LAST_OFFSET {
            let byte = self.storage.read(offset)?;
            if byte == record::TERMINATOR || byte == record::NUL {
                break;
            }
            bytes.push(byte);
        }
        info!("Loaded configuration record ({} bytes)", bytes.len());
        Ok(bytes)
    }

    /// Write the cached configuration to storage and commit it.
    ///
    /// The record is encoded before anything is written, so storage stays
    /// untouched if the configuration is invalid or too large.
    pub fn save(&mut self) -> Result<(), ConfigError> {
        let data = record::encode(&self.config).map_err(|e| {
            warn!("Not saving configuration: {}", e);
            e
        })?;
        for (offset, byte) in data.iter().enumerate() {
            self.storage.write(offset, *byte)?;
        }
        self.storage.commit()?;
        info!("Saved configuration ({} bytes)", data.len());
        Ok(())
    }

    /// Whether `load` completed at least once.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn get(&self) -> &BridgeConfiguration {
        &self.config
    }

    pub fn transmitter_id(&self) -> TransmitterId {
        self.config.transmitter_id
    }

    pub fn server_address(&self) -> &str {
        &self.config.server_address
    }

    pub fn access_point_name(&self) -> &str {
        &self.config.access_point_name
    }

    pub fn access_point_password(&self) -> &str {
        &self.config.access_point_password
    }

    pub fn set_transmitter_id(&mut self, id: TransmitterId) {
        debug!("Set transmitter id to {:?}", id);
        self.config.transmitter_id = id;
    }

    pub fn set_server_address(&mut self, address: &str) -> Result<(), ConfigError> {
        record::validate_field(Field::ServerAddress, address)?;
        self.config.server_address = address.into();
        Ok(())
    }

    pub fn set_access_point_name(&mut self, name: &str) -> Result<(), ConfigError> {
        record::validate_field(Field::AccessPointName, name)?;
        self.config.access_point_name = name.into();
        Ok(())
    }

    pub fn set_access_point_password(&mut self, password: &str) -> Result<(), ConfigError> {
        record::validate_field(Field::AccessPointPassword, password)?;
        self.config.access_point_password = password.into();
        Ok(())
    }

    /// Remember a Wi-Fi network. Existing entries with the same SSID are kept.
    pub fn save_network(&mut self, ssid: &str, password: &str) -> Result<(), ConfigError> {
        record::validate_field(Field::Ssid, ssid)?;
        record::validate_field(Field::Password, password)?;
        self.config
            .known_networks
            .push(WifiCredential::new(ssid, password));
        Ok(())
    }

    /// Forget every network named `ssid`. Returns the number of removed
    /// entries.
    pub fn delete_network(&mut self, ssid: &str) -> usize {
        let networks = &mut self.config.known_networks;
        let mut removed = 0;
        // Back to front, so that removing never shifts an unvisited entry
        for index in (0..networks.len()).rev() {
            if networks[index].ssid == ssid {
                networks.remove(index);
                removed += 1;
            }
        }
        debug!("Deleted {} networks named {:?}", removed, ssid);
        removed
    }

    pub fn network_count(&self) -> usize {
        self.config.known_networks.len()
    }

    pub fn network_at(&self, index: usize) -> Result<&WifiCredential, ConfigError> {
        self.config
            .known_networks
            .get(index)
            .ok_or(ConfigError::IndexOutOfRange {
                index,
                len: self.network_count(),
            })
    }

    pub fn networks(&self) -> impl Iterator<Item = &WifiCredential> {
        self.config.known_networks.iter()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        record::CAPACITY,
        storage::{MemoryStorage, StorageError},
    };

    /// Storage which fails once a number of operations succeeded.
    struct FailingStorage {
        inner: MemoryStorage,
        remaining: usize,
    }

    impl FailingStorage {
        fn new(inner: MemoryStorage, remaining: usize) -> Self {
            Self { inner, remaining }
        }

        fn tick(&mut self) -> bool {
            if self.remaining == 0 {
                return false;
            }
            self.remaining -= 1;
            true
        }
    }

    impl Storage for FailingStorage {
        fn read(&mut self, offset: usize) -> Result<u8, StorageError> {
            if !self.tick() {
                return Err(StorageError::ReadFailed(offset));
            }
            self.inner.read(offset)
        }

        fn write(&mut self, offset: usize, value: u8) -> Result<(), StorageError> {
            if !self.tick() {
                return Err(StorageError::WriteFailed(offset));
            }
            self.inner.write(offset, value)
        }

        fn commit(&mut self) -> Result<(), StorageError> {
            if !self.tick() {
                return Err(StorageError::CommitFailed);
            }
            self.inner.commit()
        }
    }

    fn example_store() -> ConfigStore<MemoryStorage> {
        let mut store = ConfigStore::open(MemoryStorage::new()).unwrap();
        store.set_transmitter_id(TransmitterId::new(74565));
        store.set_server_address("myaddress.example.com").unwrap();
        store.save_network("home", "secret").unwrap();
        store
    }

    #[test]
    fn test_blank_storage_yields_defaults() {
        let store = ConfigStore::open(MemoryStorage::new()).unwrap();
        assert!(store.is_loaded());
        assert_eq!(store.get(), &BridgeConfiguration::default());
        assert_eq!(store.transmitter_id().as_u32(), 0);
        assert_eq!(store.server_address(), "");
        assert_eq!(store.access_point_name(), "wifi-xBridge");
        assert_eq!(store.access_point_password(), "");
        assert_eq!(store.network_count(), 0);
    }

    #[test]
    fn test_new_does_not_read_storage() {
        let store = ConfigStore::new(FailingStorage::new(MemoryStorage::new(), 0));
        assert!(!store.is_loaded());
        assert_eq!(store.get(), &BridgeConfiguration::default());
    }

    #[test]
    fn test_save_and_reload() {
        let mut store = example_store();
        store.save().unwrap();
        let expected = store.get().clone();

        let storage = store.into_storage();
        assert_eq!(storage.commit_count(), 1);
        assert!(!storage.is_dirty());

        let reloaded = ConfigStore::open(storage).unwrap();
        assert_eq!(reloaded.get(), &expected);
        assert_eq!(reloaded.transmitter_id().as_u32(), 74565);
        assert_eq!(reloaded.server_address(), "myaddress.example.com");
        assert_eq!(reloaded.access_point_name(), "wifi-xBridge");
        assert_eq!(
            reloaded.network_at(0),
            Ok(&WifiCredential::new("home", "secret"))
        );
    }

    #[test]
    fn test_save_writes_record_from_offset_zero() {
        let mut store = example_store();
        store.save().unwrap();
        let expected = record::encode(store.get()).unwrap();
        assert_eq!(&store.storage().as_bytes()[..expected.len()], &expected[..]);
    }

    #[test]
    fn test_mutators_do_not_persist() {
        let mut store = example_store();
        assert_eq!(store.storage().commit_count(), 0);
        assert!(!store.storage().is_dirty());
        assert_eq!(store.storage().as_bytes()[0], 0xFF);

        store.load().unwrap();
        assert_eq!(store.get(), &BridgeConfiguration::default());
    }

    #[test]
    fn test_save_keeps_cache() {
        let mut store = example_store();
        store.save().unwrap();
        assert_eq!(store.transmitter_id().as_u32(), 74565);
        assert_eq!(store.network_count(), 1);
    }

    #[test]
    fn test_save_shorter_record_over_longer_one() {
        let mut store = example_store();
        store.save_network("office", "password").unwrap();
        store.save().unwrap();

        assert_eq!(store.delete_network("office"), 1);
        store.save().unwrap();
        store.load().unwrap();
        let remaining: Vec<_> = store.networks().collect();
        assert_eq!(remaining, vec![&WifiCredential::new("home", "secret")]);
    }

    #[test]
    fn test_delete_all_matching_networks() {
        let mut store = ConfigStore::new(MemoryStorage::new());
        store.save_network("home", "p1").unwrap();
        store.save_network("home", "p2").unwrap();
        assert_eq!(store.delete_network("home"), 2);
        assert_eq!(store.network_count(), 0);
    }

    #[test]
    fn test_delete_keeps_order_of_remaining() {
        let mut store = ConfigStore::new(MemoryStorage::new());
        for (ssid, password) in [("x", "1"), ("a", "2"), ("x", "3"), ("x", "4"), ("b", "5")] {
            store.save_network(ssid, password).unwrap();
        }
        assert_eq!(store.delete_network("x"), 3);
        let remaining: Vec<_> = store.networks().cloned().collect();
        assert_eq!(
            remaining,
            vec![WifiCredential::new("a", "2"), WifiCredential::new("b", "5")]
        );
    }

    #[test]
    fn test_delete_unknown_network_is_noop() {
        let mut store = example_store();
        let before = store.get().clone();
        assert_eq!(store.delete_network("unknown"), 0);
        assert_eq!(store.get(), &before);
    }

    #[rstest]
    #[case(1)]
    #[case(42)]
    fn test_network_at_out_of_range(#[case] index: usize) {
        let store = example_store();
        assert_eq!(
            store.network_at(index),
            Err(ConfigError::IndexOutOfRange { index, len: 1 })
        );
    }

    #[test]
    fn test_setters_reject_reserved_bytes() {
        let mut store = example_store();
        assert_eq!(
            store.set_server_address("bad\u{AC}"),
            Err(ConfigError::ReservedByte {
                field: Field::ServerAddress,
                byte: 0xAC
            })
        );
        assert_eq!(
            store.set_access_point_name("a\0"),
            Err(ConfigError::ReservedByte {
                field: Field::AccessPointName,
                byte: 0x00
            })
        );
        assert!(store.set_access_point_password("\u{AC}").is_err());
        assert_eq!(
            store.save_network("ok", "not\u{AC}ok"),
            Err(ConfigError::ReservedByte {
                field: Field::Password,
                byte: 0xAC
            })
        );
        assert_eq!(store.server_address(), "myaddress.example.com");
        assert_eq!(store.access_point_name(), "wifi-xBridge");
        assert_eq!(store.network_count(), 1);
    }

    #[test]
    fn test_save_capacity_exceeded_leaves_storage_untouched() {
        let mut store = example_store();
        store.save().unwrap();
        let before = *store.storage().as_bytes();

        for i in 0..100 {
            let ssid = format!("network-{}", i);
            store.save_network(&ssid, &"p".repeat(40)).unwrap();
        }
        assert!(matches!(
            store.save(),
            Err(ConfigError::CapacityExceeded { capacity: CAPACITY, .. })
        ));
        assert_eq!(store.storage().as_bytes(), &before);
        assert_eq!(store.storage().commit_count(), 1);
        assert!(!store.storage().is_dirty());
    }

    #[test]
    fn test_load_failure_keeps_snapshot() {
        let mut store = example_store();
        store.save().unwrap();
        let storage = FailingStorage::new(store.into_storage(), 3);

        let mut store = ConfigStore::new(storage);
        store.save_network("cached", "").unwrap();
        assert_eq!(
            store.load(),
            Err(ConfigError::Storage(StorageError::ReadFailed(3)))
        );
        assert!(!store.is_loaded());
        assert_eq!(store.network_at(0), Ok(&WifiCredential::new("cached", "")));
    }

    #[test]
    fn test_open_propagates_storage_failure() {
        let result = ConfigStore::open(FailingStorage::new(MemoryStorage::new(), 0));
        assert!(matches!(
            result,
            Err(ConfigError::Storage(StorageError::ReadFailed(0)))
        ));
    }

    #[test]
    fn test_save_failure_keeps_snapshot() {
        let mut store = ConfigStore::new(FailingStorage::new(MemoryStorage::new(), 10));
        store.save_network("home", "secret").unwrap();
        assert_eq!(
            store.save(),
            Err(ConfigError::Storage(StorageError::WriteFailed(10)))
        );
        assert_eq!(store.network_count(), 1);
    }

    #[test]
    fn test_save_through_mutable_reference() {
        let mut storage = MemoryStorage::new();
        {
            let mut store = ConfigStore::open(&mut storage).unwrap();
            store.set_transmitter_id(TransmitterId::new(1));
            store.save().unwrap();
        }
        let store = ConfigStore::open(storage).unwrap();
        assert_eq!(store.transmitter_id().to_code().as_str(), "00001");
    }
}
