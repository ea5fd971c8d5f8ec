//! Access to the nonvolatile memory holding the configuration.
//!
//! The bridge stores its configuration in an emulated EEPROM: bytes are
//! written into a RAM buffer and only become durable on `commit`.

use core::fmt;

use crate::record::CAPACITY;

/// Value of an erased EEPROM byte.
pub const ERASED: u8 = 0xFF;

#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum StorageError {
    /// The offset lies outside of the storage region.
    OutOfBounds(usize),
    /// The byte at this offset could not be read.
    ReadFailed(usize),
    /// The byte at this offset could not be written.
    WriteFailed(usize),
    /// Flushing the written bytes to nonvolatile memory failed.
    CommitFailed,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds(offset) => write!(f, "Offset {} is out of bounds", offset),
            Self::ReadFailed(offset) => write!(f, "Could not read byte at offset {}", offset),
            Self::WriteFailed(offset) => write!(f, "Could not write byte at offset {}", offset),
            Self::CommitFailed => write!(f, "Could not commit written data"),
        }
    }
}

#[cfg(any(test, feature = "std"))]
impl std::error::Error for StorageError {}

/// Byte addressable nonvolatile storage.
///
/// Offsets are relative to the start of the configuration region.
pub trait Storage {
    /// Read the byte at `offset`.
    fn read(&mut self, offset: usize) -> Result<u8, StorageError>;

    /// Write a byte at `offset`. The change is not durable before `commit`.
    fn write(&mut self, offset: usize, value: u8) -> Result<(), StorageError>;

    /// Make all previous writes durable.
    fn commit(&mut self) -> Result<(), StorageError>;
}

impl<S: Storage + ?Sized> Storage for &mut S {
    fn read(&mut self, offset: usize) -> Result<u8, StorageError> {
        (**self).read(offset)
    }

    fn write(&mut self, offset: usize, value: u8) -> Result<(), StorageError> {
        (**self).write(offset, value)
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        (**self).commit()
    }
}

/// RAM backed configuration region.
///
/// Starts out erased (all bytes `0xFF`), like a blank EEPROM.
#[derive(Clone)]
pub struct MemoryStorage {
    data: [u8; CAPACITY],
    dirty: bool,
    commits: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: [ERASED; CAPACITY],
            dirty: false,
            commits: 0,
        }
    }

    /// Create a region whose first bytes are `bytes`. The rest stays erased.
    ///
    /// Bytes beyond the region capacity are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut storage = Self::new();
        let len = bytes.len().min(CAPACITY);
        storage.data[..len].copy_from_slice(&bytes[..len]);
        storage
    }

    pub fn as_bytes(&self) -> &[u8; CAPACITY] {
        &self.data
    }

    /// Whether there are writes which were not committed yet.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// How many times `commit` was called.
    pub fn commit_count(&self) -> usize {
        self.commits
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("dirty", &self.dirty)
            .field("commits", &self.commits)
            .finish_non_exhaustive()
    }
}

impl Storage for MemoryStorage {
    fn read(&mut self, offset: usize) -> Result<u8, StorageError> {
        self.data
            .get(offset)
            .copied()
            .ok_or(StorageError::OutOfBounds(offset))
    }

    fn write(&mut self, offset: usize, value: u8) -> Result<(), StorageError> {
        let byte = self
            .data
            .get_mut(offset)
            .ok_or(StorageError::OutOfBounds(offset))?;
        *byte = value;
        self.dirty = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.dirty = false;
        self.commits += 1;
        Ok(())
    }
}
