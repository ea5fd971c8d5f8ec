//! # Transmitter Identifier
//!
//! Dexcom transmitters are identified by a packed numeric value (the "src").
//! Users type it as a five character code printed on the transmitter.
//!
//! The packed value is split into five groups of five bits, most significant
//! group first. Every group is an index into a 32 symbol alphabet:
//!
//! ```text
//!  bit   24    20 19    15 14    10 9      5 4      0
//!       +--------+--------+--------+--------+--------+
//!       | char 0 | char 1 | char 2 | char 3 | char 4 |
//!       +--------+--------+--------+--------+--------+
//! ```
//!
//! The alphabet contains the digits and all upper case letters except `I`,
//! `O`, `V` and `Z`, which are easily confused with other symbols.

use core::{fmt, str::FromStr};

use bitfield::BitRange;

/// Number of characters in a transmitter code.
pub const CODE_LEN: usize = 5;

/// Number of bits encoded by a single code character.
pub const GROUP_BITS: usize = 5;

/// All symbols a transmitter code may contain, indexed by their value.
pub const ALPHABET: [u8; 32] = *b"0123456789ABCDEFGHJKLMNPQRSTUWXY";

/// Bit offset of the group encoded by the character at `position`.
const fn group_offset(position: usize) -> usize {
    (CODE_LEN - 1 - position) * GROUP_BITS
}

/// Look up the value of a code symbol.
fn symbol_value(symbol: u8) -> Option<u32> {
    ALPHABET
        .iter()
        .position(|&s| s == symbol)
        .map(|index| index as u32)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CodeError {
    /// The code does not consist of exactly five characters.
    InvalidLength(usize),
    /// A character is not part of the transmitter code alphabet.
    InvalidSymbol { position: usize, symbol: char },
}

impl fmt::Display for CodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength(len) => write!(
                f,
                "Transmitter code must have {} characters, not {}",
                CODE_LEN, len
            ),
            Self::InvalidSymbol { position, symbol } => write!(
                f,
                "Invalid symbol {:?} at position {} of transmitter code",
                symbol, position
            ),
        }
    }
}

#[cfg(any(test, feature = "std"))]
impl std::error::Error for CodeError {}

/// A five character transmitter code. Only ever contains alphabet symbols.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct TransmitterCode([u8; CODE_LEN]);

impl TransmitterCode {
    pub fn as_str(&self) -> &str {
        // All alphabet symbols are ASCII
        core::str::from_utf8(&self.0).unwrap_or_default()
    }

    pub fn as_bytes(&self) -> &[u8; CODE_LEN] {
        &self.0
    }
}

impl fmt::Display for TransmitterCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for TransmitterCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransmitterCode({})", self.as_str())
    }
}

impl FromStr for TransmitterCode {
    type Err = CodeError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        to_id(code).map(to_code)
    }
}

/// Convert a packed transmitter id into its five character code.
///
/// Only the lowest 25 bits are encoded, higher bits are ignored.
pub fn to_code(id: u32) -> TransmitterCode {
    let mut code = [0u8; CODE_LEN];
    for (position, symbol) in code.iter_mut().enumerate() {
        let lsb = group_offset(position);
        let group: u32 = id.bit_range(lsb + GROUP_BITS - 1, lsb);
        *symbol = ALPHABET[group as usize];
    }
    TransmitterCode(code)
}

/// Parse a five character transmitter code into the packed transmitter id.
pub fn to_id(code: &str) -> Result<u32, CodeError> {
    let len = code.chars().count();
    if len != CODE_LEN {
        return Err(CodeError::InvalidLength(len));
    }

    let mut id: u32 = 0;
    for (position, symbol) in code.chars().enumerate() {
        let value = u8::try_from(symbol)
            .ok()
            .and_then(symbol_value)
            .ok_or(CodeError::InvalidSymbol { position, symbol })?;
        let lsb = group_offset(position);
        id.set_bit_range(lsb + GROUP_BITS - 1, lsb, value);
    }
    Ok(id)
}

/// Packed transmitter identifier, as stored in EEPROM.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct TransmitterId(u32);

impl TransmitterId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn from_code(code: &str) -> Result<Self, CodeError> {
        to_id(code).map(Self)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn to_code(&self) -> TransmitterCode {
        to_code(self.0)
    }
}

impl From<u32> for TransmitterId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<TransmitterId> for u32 {
    fn from(id: TransmitterId) -> Self {
        id.0
    }
}

impl FromStr for TransmitterId {
    type Err = CodeError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        Self::from_code(code)
    }
}

impl fmt::Display for TransmitterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_code())
    }
}

impl fmt::Debug for TransmitterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransmitterId({} / {})", self.to_code(), self.0)
    }
}

#[cfg(feature = "serde_support")]
mod serde_impl {
    use core::fmt;

    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    use super::TransmitterId;

    impl Serialize for TransmitterId {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(self.to_code().as_str())
        }
    }

    struct CodeVisitor;

    impl<'de> de::Visitor<'de> for CodeVisitor {
        type Value = TransmitterId;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a five character transmitter code")
        }

        fn visit_str<E: de::Error>(self, code: &str) -> Result<Self::Value, E> {
            TransmitterId::from_code(code).map_err(E::custom)
        }
    }

    impl<'de> Deserialize<'de> for TransmitterId {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserializer.deserialize_str(CodeVisitor)
        }
    }
}
