#![cfg_attr(not(any(test, feature = "std")), no_std)]
//! # Device Configuration
//!
//! The bridge configuration is persisted in a 4096 byte EEPROM region.
//!
//! ## Memory Map
//!
//! ```text
//!           0           8          16          24          32
//!           +-----------+-----------+-----------+-----------+
//! 0x0000    | Marker    | TransmitterId (u32, LE)           |
//!           +-----------+-----------+-----------+-----------+
//! 0x0004    | (cont.)   | ServerAddress ...       | 0xAC    |
//!           +-----------+-----------+-----------+-----------+
//!           | AccessPointName ...               | 0xAC      |
//!           +-----------+-----------+-----------+-----------+
//!           | AccessPointPassword ...           | 0xAC      |
//!           +-----------+-----------+-----------+-----------+
//!           | Ssid ... | 0xAC | Password ... | 0xAC | ...   |
//!           +-----------+-----------+-----------+-----------+
//!           | 0xFF      |
//!           +-----------+
//! ```
//!
//! ## Fields
//!
//! ### Header (0x0000 - 0x0005, 5 bytes)
//!
//! - `Marker`: The constant `0xB6` (182). Any other value means that the
//!   EEPROM does not contain a configuration, the defaults are used instead.
//! - `TransmitterId`: Packed Dexcom transmitter id (4 bytes, u32, LE)
//!
//! ### Text fields (from 0x0005, variable length)
//!
//! Every text field is followed by the delimiter byte `0xAC` (172):
//!
//! - `ServerAddress`: Host name of the remote server
//! - `AccessPointName`: Name of the hotspot opened by the bridge
//! - `AccessPointPassword`: Password of that hotspot
//! - Any number of `Ssid` / `Password` pairs of remembered Wi-Fi networks
//!
//! The record ends with the terminator byte `0xFF` (255). While reading, a
//! NUL byte or reaching the last EEPROM byte ends the record as well. Text
//! fields can therefore never contain the bytes `0x00`, `0xAC` or `0xFF`.

extern crate alloc;

use alloc::{string::String, vec::Vec};
use core::fmt;

pub mod record;
pub mod storage;
pub mod store;

pub use record::CAPACITY;
pub use storage::{MemoryStorage, Storage, StorageError};
pub use store::ConfigStore;
pub use xbridge_common::transmitter_id::{TransmitterCode, TransmitterId};

/// Name of the access point opened by the bridge if none is configured.
pub const DEFAULT_ACCESS_POINT_NAME: &str = "wifi-xBridge";

/// The text fields of the configuration record.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum Field {
    ServerAddress,
    AccessPointName,
    AccessPointPassword,
    Ssid,
    Password,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerAddress => write!(f, "server address"),
            Self::AccessPointName => write!(f, "access point name"),
            Self::AccessPointPassword => write!(f, "access point password"),
            Self::Ssid => write!(f, "SSID"),
            Self::Password => write!(f, "Wi-Fi password"),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum ConfigError {
    /// The encoded configuration does not fit into the EEPROM region.
    CapacityExceeded { required: usize, capacity: usize },
    /// A text field contains a byte reserved by the record format.
    ReservedByte { field: Field, byte: u8 },
    /// There is no known network at this index.
    IndexOutOfRange { index: usize, len: usize },
    /// Reading, writing or committing the EEPROM failed.
    Storage(StorageError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded { required, capacity } => write!(
                f,
                "Configuration needs {} bytes, but only {} bytes are available",
                required, capacity
            ),
            Self::ReservedByte { field, byte } => {
                write!(f, "The {} must not contain the byte 0x{:02x}", field, byte)
            }
            Self::IndexOutOfRange { index, len } => write!(
                f,
                "No known network at index {} ({} networks configured)",
                index, len
            ),
            Self::Storage(e) => write!(f, "Storage failure: {}", e),
        }
    }
}

#[cfg(any(test, feature = "std"))]
impl std::error::Error for ConfigError {}

impl From<StorageError> for ConfigError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

/// A remembered Wi-Fi network.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
#[cfg_attr(
    feature = "serde_support",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct WifiCredential {
    pub ssid: String,
    #[cfg_attr(feature = "serde_support", serde(default))]
    pub password: String,
}

impl WifiCredential {
    pub fn new(ssid: &str, password: &str) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
#[cfg_attr(
    feature = "serde_support",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct BridgeConfiguration {
    /// Packed id of the Dexcom transmitter to listen to
    pub transmitter_id: TransmitterId,
    /// Host name or address of the remote server, may be empty
    pub server_address: String,
    /// Name of the hotspot advertised by the bridge
    pub access_point_name: String,
    /// Password of the hotspot, may be empty
    pub access_point_password: String,
    /// Remembered Wi-Fi networks, in the order they were added
    pub known_networks: Vec<WifiCredential>,
}

impl Default for BridgeConfiguration {
    fn default() -> Self {
        Self {
            transmitter_id: TransmitterId::default(),
            server_address: String::new(),
            access_point_name: DEFAULT_ACCESS_POINT_NAME.into(),
            access_point_password: String::new(),
            known_networks: Vec::new(),
        }
    }
}

impl BridgeConfiguration {
    /// Iterate over all text fields, in record order.
    pub fn fields(&self) -> impl Iterator<Item = (Field, &str)> {
        [
            (Field::ServerAddress, self.server_address.as_str()),
            (Field::AccessPointName, self.access_point_name.as_str()),
            (Field::AccessPointPassword, self.access_point_password.as_str()),
        ]
        .into_iter()
        .chain(self.known_networks.iter().flat_map(|network| {
            [
                (Field::Ssid, network.ssid.as_str()),
                (Field::Password, network.password.as_str()),
            ]
        }))
    }
}
