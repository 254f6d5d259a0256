use crate::consts::DEFAULT_DEVICE_ADDRESS;
use crate::layouts::config_record_layout;
use crate::types::{DmxAddress, Role};
use crate::utils::calculate_checksum;

/// Keys of the persisted configuration values.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ConfigKey {
    /// The [Role], stored as its `u8` representation.
    Role = 0x00,
    /// The [DmxAddress] of the device role.
    DeviceAddress = 0x01,
}

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError<E> {
    /// The store holds no value for this key.
    Missing(ConfigKey),
    /// The stored value for this key is invalid or failed its integrity check.
    Corrupted(ConfigKey),
    /// An error raised by the underlying store.
    DriverError(E),
}

impl<E: core::fmt::Display> core::fmt::Display for ConfigError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "no value stored for {:?}", key),
            ConfigError::Corrupted(key) => write!(f, "stored value for {:?} is corrupted", key),
            ConfigError::DriverError(error) => error.fmt(f),
        }
    }
}

#[cfg(feature = "std")]
impl<E: core::fmt::Display + core::fmt::Debug> std::error::Error for ConfigError<E> {}

/// Non-volatile key/value storage for the engine configuration.
pub trait ConfigStore {
    /// A driver specific error.
    type Error;

    /// Read the value of a key. Returns `Ok(None)` if the key was never written.
    fn get(&mut self, key: ConfigKey) -> Result<Option<u16>, ConfigError<Self::Error>>;

    /// Write the value of a key.
    fn set(&mut self, key: ConfigKey, value: u16) -> Result<(), ConfigError<Self::Error>>;
}

impl<S: ConfigStore + ?Sized> ConfigStore for &mut S {
    type Error = S::Error;

    fn get(&mut self, key: ConfigKey) -> Result<Option<u16>, ConfigError<Self::Error>> {
        (**self).get(key)
    }

    fn set(&mut self, key: ConfigKey, value: u16) -> Result<(), ConfigError<Self::Error>> {
        (**self).set(key, value)
    }
}

/// The configuration that survives a power cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineConfig {
    pub role: Role,
    pub device_address: DmxAddress,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            role: Role::Device,
            device_address: DmxAddress::FIRST,
        }
    }
}

impl EngineConfig {
    /// Read and validate the configuration. Every key has to be present.
    pub fn load<S: ConfigStore>(store: &mut S) -> Result<Self, ConfigError<S::Error>> {
        let role = store
            .get(ConfigKey::Role)?
            .ok_or(ConfigError::Missing(ConfigKey::Role))?;
        let device_address = store
            .get(ConfigKey::DeviceAddress)?
            .ok_or(ConfigError::Missing(ConfigKey::DeviceAddress))?;

        Ok(Self {
            role: Role::try_from(role).map_err(|_| ConfigError::Corrupted(ConfigKey::Role))?,
            device_address: DmxAddress::new(device_address)
                .map_err(|_| ConfigError::Corrupted(ConfigKey::DeviceAddress))?,
        })
    }

    /// Write every key of the configuration.
    pub fn store<S: ConfigStore>(&self, store: &mut S) -> Result<(), ConfigError<S::Error>> {
        store.set(ConfigKey::Role, self.role as u16)?;
        store.set(ConfigKey::DeviceAddress, self.device_address.as_u16())?;

        Ok(())
    }
}

/// A [ConfigStore] that keeps the values in ram. Useful for tests and for targets
/// that provision the configuration at startup.
#[derive(Debug, Default, Clone)]
pub struct MemoryConfigStore {
    role: Option<u16>,
    device_address: Option<u16>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            role: Some(config.role as u16),
            device_address: Some(config.device_address.as_u16()),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    type Error = core::convert::Infallible;

    fn get(&mut self, key: ConfigKey) -> Result<Option<u16>, ConfigError<Self::Error>> {
        Ok(match key {
            ConfigKey::Role => self.role,
            ConfigKey::DeviceAddress => self.device_address,
        })
    }

    fn set(&mut self, key: ConfigKey, value: u16) -> Result<(), ConfigError<Self::Error>> {
        match key {
            ConfigKey::Role => self.role = Some(value),
            ConfigKey::DeviceAddress => self.device_address = Some(value),
        }

        Ok(())
    }
}

pub const CONFIG_RECORD_SIZE: usize = 8;
const CONFIG_RECORD_MAGIC: u8 = 0xD5;
const CONFIG_RECORD_VERSION: u8 = 0x01;
const ERASED_BYTE: u8 = 0xFF;

/// Raw access to a fixed size block of non-volatile memory like an eeprom word block.
pub trait RecordStorage {
    /// A driver specific error.
    type Error;

    fn read_record(&mut self, record: &mut [u8; CONFIG_RECORD_SIZE]) -> Result<(), Self::Error>;

    fn write_record(&mut self, record: &[u8; CONFIG_RECORD_SIZE]) -> Result<(), Self::Error>;
}

/// A [ConfigStore] that keeps all keys in one checksummed record.
///
/// An erased record (all bytes `0xFF`) reads as missing. A record with a wrong magic,
/// version or checksum reads as corrupted.
pub struct RecordConfigStore<R: RecordStorage> {
    storage: R,
}

impl<R: RecordStorage> RecordConfigStore<R> {
    pub fn new(storage: R) -> Self {
        Self { storage }
    }

    /// Get a reference to the underlying storage.
    pub fn get_storage(&mut self) -> &mut R {
        &mut self.storage
    }

    fn read_valid_record(
        &mut self,
        key: ConfigKey,
    ) -> Result<Option<[u8; CONFIG_RECORD_SIZE]>, ConfigError<R::Error>> {
        let mut record = [0u8; CONFIG_RECORD_SIZE];
        self.storage
            .read_record(&mut record)
            .map_err(ConfigError::DriverError)?;

        if record.iter().all(|byte| *byte == ERASED_BYTE) {
            return Ok(None);
        }

        let view = config_record_layout::View::new(&record[..]);
        if view.magic().read() != CONFIG_RECORD_MAGIC
            || view.version().read() != CONFIG_RECORD_VERSION
            || view.checksum().read() != calculate_checksum(&record[..CONFIG_RECORD_SIZE - 2])
        {
            return Err(ConfigError::Corrupted(key));
        }

        Ok(Some(record))
    }
}

impl<R: RecordStorage> ConfigStore for RecordConfigStore<R> {
    type Error = R::Error;

    fn get(&mut self, key: ConfigKey) -> Result<Option<u16>, ConfigError<Self::Error>> {
        let record = match self.read_valid_record(key)? {
            None => return Ok(None),
            Some(record) => record,
        };

        let view = config_record_layout::View::new(&record[..]);
        Ok(Some(match key {
            ConfigKey::Role => view.role().read() as u16,
            ConfigKey::DeviceAddress => view.device_address().read(),
        }))
    }

    fn set(&mut self, key: ConfigKey, value: u16) -> Result<(), ConfigError<Self::Error>> {
        // An erased or broken record is rebuilt from the defaults.
        let mut record = match self.read_valid_record(key) {
            Ok(Some(record)) => record,
            Ok(None) | Err(ConfigError::Corrupted(_)) => default_record(),
            Err(error) => return Err(error),
        };

        let mut view = config_record_layout::View::new(&mut record[..]);
        match key {
            ConfigKey::Role => {
                let role = u8::try_from(value).map_err(|_| ConfigError::Corrupted(key))?;
                view.role_mut().write(role);
            },
            ConfigKey::DeviceAddress => view.device_address_mut().write(value),
        }

        let checksum = calculate_checksum(&record[..CONFIG_RECORD_SIZE - 2]);
        config_record_layout::View::new(&mut record[..])
            .checksum_mut()
            .write(checksum);

        self.storage
            .write_record(&record)
            .map_err(ConfigError::DriverError)
    }
}

fn default_record() -> [u8; CONFIG_RECORD_SIZE] {
    let defaults = EngineConfig::default();
    let mut record = [0u8; CONFIG_RECORD_SIZE];

    let mut view = config_record_layout::View::new(&mut record[..]);
    view.magic_mut().write(CONFIG_RECORD_MAGIC);
    view.version_mut().write(CONFIG_RECORD_VERSION);
    view.role_mut().write(defaults.role as u8);
    view.reserved_mut().write(0);
    view.device_address_mut().write(DEFAULT_DEVICE_ADDRESS);

    record
}
