//! Encoding of the configuration record, see the crate documentation for the
//! layout.

use alloc::{string::String, vec::Vec};

use log::debug;

use crate::{BridgeConfiguration, ConfigError, Field, TransmitterId, WifiCredential};

/// Size of the EEPROM region reserved for the configuration.
pub const CAPACITY: usize = 4096;

/// Reaching this offset ends a record while reading.
pub const LAST_OFFSET: usize = CAPACITY - 1;

/// First byte of a valid record.
pub const MARKER: u8 = 0xB6;

/// Ends every text field.
pub const DELIMITER: u8 = 0xAC;

/// Ends the record.
pub const TERMINATOR: u8 = 0xFF;

/// Ends the record as well, as found in zeroed memory.
pub const NUL: u8 = 0x00;

/// Marker byte plus transmitter id.
pub const HEADER_LEN: usize = 5;

/// Bytes which may not appear inside a text field.
pub const RESERVED: [u8; 3] = [NUL, DELIMITER, TERMINATOR];

fn is_end_byte(byte: u8) -> bool {
    byte == TERMINATOR || byte == NUL
}

/// Check that a text field can be stored in a record.
pub fn validate_field(field: Field, value: &str) -> Result<(), ConfigError> {
    match value.bytes().find(|b| RESERVED.contains(b)) {
        Some(byte) => Err(ConfigError::ReservedByte { field, byte }),
        None => Ok(()),
    }
}

/// Number of bytes `encode` produces for this configuration.
pub fn encoded_len(config: &BridgeConfiguration) -> usize {
    let fields: usize = config.fields().map(|(_, value)| value.len() + 1).sum();
    HEADER_LEN + fields + 1
}

/// Serialize the configuration into a record.
///
/// Fails if a field contains a reserved byte or if the record would not fit
/// into `CAPACITY` bytes.
pub fn encode(config: &BridgeConfiguration) -> Result<Vec<u8>, ConfigError> {
    for (field, value) in config.fields() {
        validate_field(field, value)?;
    }

    let required = encoded_len(config);
    if required > CAPACITY {
        return Err(ConfigError::CapacityExceeded {
            required,
            capacity: CAPACITY,
        });
    }

    let mut data = Vec::with_capacity(required);

    // Header
    data.push(MARKER);
    data.extend_from_slice(&config.transmitter_id.as_u32().to_le_bytes());

    // Text fields
    for (_, value) in config.fields() {
        data.extend_from_slice(value.as_bytes());
        data.push(DELIMITER);
    }

    data.push(TERMINATOR);
    debug_assert_eq!(data.len(), required);
    Ok(data)
}

/// Offset of the byte that ends the record: the first terminator or NUL byte
/// after the header, `LAST_OFFSET` or the end of `bytes`, whichever comes
/// first.
pub fn record_end(bytes: &[u8]) -> usize {
    if bytes.len() <= HEADER_LEN {
        return bytes.len();
    }
    let limit = bytes.len().min(LAST_OFFSET).max(HEADER_LEN);
    bytes[HEADER_LEN..limit]
        .iter()
        .position(|&b| is_end_byte(b))
        .map_or(limit, |pos| HEADER_LEN + pos)
}

fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Parse a record.
///
/// Never fails: without a marker byte the default configuration is returned.
/// Fields that are not closed by a delimiter before the end of the record
/// are dropped, as is an SSID without a password.
pub fn decode(bytes: &[u8]) -> BridgeConfiguration {
    let mut config = BridgeConfiguration::default();

    if bytes.len() < HEADER_LEN || bytes[0] != MARKER {
        debug!("No configuration marker, using defaults");
        return config;
    }

    let mut id = [0; 4];
    id.copy_from_slice(&bytes[1..HEADER_LEN]);
    config.transmitter_id = TransmitterId::new(u32::from_le_bytes(id));

    let record = &bytes[HEADER_LEN..record_end(bytes)];
    let closed = match record.iter().rposition(|&b| b == DELIMITER) {
        Some(last_delimiter) => &record[..last_delimiter],
        None => return config,
    };
    let mut fields = closed.split(|&b| b == DELIMITER).map(decode_text);

    if let Some(server_address) = fields.next() {
        config.server_address = server_address;
    }
    if let Some(access_point_name) = fields.next() {
        config.access_point_name = access_point_name;
    }
    if let Some(access_point_password) = fields.next() {
        config.access_point_password = access_point_password;
    }
    while let (Some(ssid), Some(password)) = (fields.next(), fields.next()) {
        config.known_networks.push(WifiCredential { ssid, password });
    }

    debug!(
        "Decoded configuration with {} known networks",
        config.known_networks.len()
    );
    config
}
