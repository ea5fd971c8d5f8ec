//! Configuration images stored in files on the host.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use config::{MemoryStorage, Storage, StorageError, CAPACITY};
use log::{debug, error};

/// A file holding a copy of the complete EEPROM configuration region.
///
/// Writes go to memory, `commit` writes the whole region back to the file.
pub struct ImageFile {
    path: PathBuf,
    data: MemoryStorage,
}

impl ImageFile {
    /// An erased image which will be written to `path` on commit.
    pub fn blank(path: &Path) -> Self {
        Self {
            path: path.to_owned(),
            data: MemoryStorage::new(),
        }
    }

    /// Read an image. A missing file is treated like an erased EEPROM.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} does not exist, starting blank", path.display());
                return Ok(Self::blank(path));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Could not read {}", path.display()))
            }
        };
        if bytes.len() != CAPACITY {
            bail!(
                "{} has {} bytes, expected an image of {} bytes",
                path.display(),
                bytes.len(),
                CAPACITY
            );
        }
        Ok(Self {
            path: path.to_owned(),
            data: MemoryStorage::from_bytes(&bytes),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn as_bytes(&self) -> &[u8; CAPACITY] {
        self.data.as_bytes()
    }
}

impl Storage for ImageFile {
    fn read(&mut self, offset: usize) -> Result<u8, StorageError> {
        self.data.read(offset)
    }

    fn write(&mut self, offset: usize, value: u8) -> Result<(), StorageError> {
        self.data.write(offset, value)
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        fs::write(&self.path, self.data.as_bytes()).map_err(|e| {
            error!("Could not write {}: {}", self.path.display(), e);
            StorageError::CommitFailed
        })?;
        self.data.commit()
    }
}
