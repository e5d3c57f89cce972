//! File-backed byte store for host (development) builds.
//!
//! Mirrors the device's byte region in a small file so credentials persist
//! across runs. Uses `~/.greenhouse-controller/credentials.bin` by default.
//!
//! # Usage
//!
//! ```ignore
//! use greenhouse_controller::storage::{CredentialStore, FileStore};
//!
//! let store = CredentialStore::new(FileStore::open_default()?)?;
//! if let Some(identity) = store.load() {
//!     log::info!("Stored network: {}", identity.name());
//! }
//! ```

use super::{check_bounds, ByteStore, StorageError, LAYOUT_LEN};
use log::{debug, info};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Get the default store file path.
///
/// Returns `~/.greenhouse-controller/credentials.bin`
pub fn default_store_path() -> io::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home)
        .join(".greenhouse-controller")
        .join("credentials.bin"))
}

/// Byte store persisted to a file.
///
/// The whole image is held in memory; [`ByteStore::commit`] rewrites the
/// file and reads it back to verify the write.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    image: Vec<u8>,
}

impl FileStore {
    /// Open (or lazily create) a store of [`LAYOUT_LEN`] bytes at `path`.
    ///
    /// A missing file is treated as a blank store. A shorter file is
    /// zero-extended.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let mut image = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No store file at {:?}, starting blank", path);
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        if image.len() < LAYOUT_LEN {
            image.resize(LAYOUT_LEN, 0);
        }
        Ok(Self { path, image })
    }

    /// Open the store at the default path.
    pub fn open_default() -> Result<Self, StorageError> {
        Self::open(default_store_path()?)
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteStore for FileStore {
    fn capacity(&self) -> usize {
        self.image.len()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        check_bounds(offset, buf.len(), self.image.len())?;
        buf.copy_from_slice(&self.image[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        check_bounds(offset, data.len(), self.image.len())?;
        self.image[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, &self.image)?;

        // Verify write by reading back
        let read_back = fs::read(&self.path)?;
        if read_back != self.image {
            return Err(StorageError::VerificationFailed);
        }

        info!("Store written to {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkIdentity;
    use crate::storage::CredentialStore;
    use std::env;
    use std::sync::atomic::{AtomicU32, Ordering};

    // Counter to ensure unique test files even in parallel execution
    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn unique_store_path() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let pid = std::process::id();
        env::temp_dir().join(format!("greenhouse-test-{}-{}.bin", pid, id))
    }

    #[test]
    fn test_missing_file_is_blank() {
        let path = unique_store_path();
        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.capacity(), LAYOUT_LEN);
        assert!(!path.exists());

        let credentials = CredentialStore::new(store).unwrap();
        assert!(credentials.load().is_none());
    }

    #[test]
    fn test_credentials_survive_reopen() {
        let path = unique_store_path();

        {
            let mut credentials = CredentialStore::new(FileStore::open(&path).unwrap()).unwrap();
            credentials
                .save(&NetworkIdentity::new("Greenhouse", "secret1").unwrap())
                .unwrap();
        }

        let credentials = CredentialStore::new(FileStore::open(&path).unwrap()).unwrap();
        let loaded = credentials.load().expect("identity should persist");
        assert_eq!(loaded.name(), "Greenhouse");
        assert_eq!(loaded.secret(), "secret1");

        let raw = fs::read(&path).unwrap();
        assert_eq!(raw.len(), LAYOUT_LEN);
        assert_eq!(&raw[32..39], b"secret1");

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_short_file_is_extended() {
        let path = unique_store_path();
        fs::write(&path, b"Net\0").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.capacity(), LAYOUT_LEN);
        let credentials = CredentialStore::new(store).unwrap();
        let loaded = credentials.load().unwrap();
        assert_eq!(loaded.name(), "Net");
        assert!(loaded.is_open());

        let _ = fs::remove_file(&path);
    }
}
