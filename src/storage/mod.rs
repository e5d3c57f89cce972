//! Durable credential storage.
//!
//! The network identity lives in a small byte-addressable region, laid out
//! as two fixed-length, NUL-padded fields:
//!
//! ```text
//! offset  0: network name   (32 bytes)
//! offset 32: network secret (64 bytes)
//! ```
//!
//! # Components
//!
//! - [`ByteStore`] - byte-addressed backend (EEPROM-like)
//! - [`CredentialStore`] - typed access to the identity fields
//! - [`MemoryStore`] - volatile backend for tests and tooling
//! - [`FileStore`] - file-backed backend for host builds
//! - `NvsByteStore` - NVS blob backend (ESP32 only)

mod file;
#[cfg(feature = "esp32")]
mod nvs;

pub use file::{default_store_path, FileStore};
#[cfg(feature = "esp32")]
pub use nvs::NvsByteStore;

use crate::config::NetworkIdentity;
use log::{info, warn};
use std::fmt;
use zeroize::Zeroize;

/// Offset of the network name field.
pub const NAME_OFFSET: usize = 0;

/// Length of the network name field (including the NUL terminator).
pub const NAME_FIELD_LEN: usize = 32;

/// Offset of the secret field.
pub const SECRET_OFFSET: usize = 32;

/// Length of the secret field (including the NUL terminator).
pub const SECRET_FIELD_LEN: usize = 64;

/// Total bytes used by the credential layout.
pub const LAYOUT_LEN: usize = SECRET_OFFSET + SECRET_FIELD_LEN;

/// Byte-addressed durable storage.
///
/// Writes may be buffered until [`ByteStore::commit`] is called.
pub trait ByteStore {
    /// Number of addressable bytes.
    fn capacity(&self) -> usize;

    /// Fill `buf` with the bytes starting at `offset`.
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Write `data` starting at `offset`.
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError>;

    /// Flush buffered writes to the durable medium.
    fn commit(&mut self) -> Result<(), StorageError>;
}

/// Check that `[offset, offset + len)` fits a store of `capacity` bytes.
pub(crate) fn check_bounds(offset: usize, len: usize, capacity: usize) -> Result<(), StorageError> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(StorageError::OutOfBounds {
            offset,
            len,
            capacity,
        }),
    }
}

/// Volatile byte store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStore {
    bytes: Vec<u8>,
    commits: usize,
}

impl MemoryStore {
    /// Create a zero-filled store of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity],
            commits: 0,
        }
    }

    /// Create a store sized for the credential layout.
    pub fn for_credentials() -> Self {
        Self::new(LAYOUT_LEN)
    }

    /// Raw contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of successful commits.
    pub fn commits(&self) -> usize {
        self.commits
    }
}

impl ByteStore for MemoryStore {
    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        check_bounds(offset, buf.len(), self.bytes.len())?;
        buf.copy_from_slice(&self.bytes[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        check_bounds(offset, data.len(), self.bytes.len())?;
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.commits += 1;
        Ok(())
    }
}

/// Typed access to the persisted network identity.
pub struct CredentialStore<B: ByteStore> {
    backend: B,
}

impl<B: ByteStore> CredentialStore<B> {
    /// Wrap a backend. Fails if it cannot hold the layout.
    pub fn new(backend: B) -> Result<Self, StorageError> {
        if backend.capacity() < LAYOUT_LEN {
            return Err(StorageError::TooSmall {
                capacity: backend.capacity(),
                required: LAYOUT_LEN,
            });
        }
        Ok(Self { backend })
    }

    /// Load the stored identity.
    ///
    /// Returns `None` if no name is stored or if the stored data is corrupted.
    pub fn load(&self) -> Option<NetworkIdentity> {
        let mut name = [0u8; NAME_FIELD_LEN];
        let mut secret = [0u8; SECRET_FIELD_LEN];

        if let Err(e) = self
            .backend
            .read(NAME_OFFSET, &mut name)
            .and_then(|_| self.backend.read(SECRET_OFFSET, &mut secret))
        {
            warn!("Failed to read stored credentials: {}", e);
            return None;
        }

        let identity = decode_field(&name).and_then(|name| {
            if name.is_empty() {
                return None;
            }
            let secret = decode_field(&secret)?;
            match NetworkIdentity::new(name, secret) {
                Ok(identity) => Some(identity),
                Err(e) => {
                    warn!("Stored credentials rejected: {}", e);
                    None
                }
            }
        });

        secret.zeroize();
        identity
    }

    /// Persist an identity, overwriting whatever was stored.
    pub fn save(&mut self, identity: &NetworkIdentity) -> Result<(), StorageError> {
        let mut name = [0u8; NAME_FIELD_LEN];
        let mut secret = [0u8; SECRET_FIELD_LEN];
        encode_field(identity.name(), &mut name)?;
        encode_field(identity.secret(), &mut secret)?;

        let result = self
            .backend
            .write(NAME_OFFSET, &name)
            .and_then(|_| self.backend.write(SECRET_OFFSET, &secret))
            .and_then(|_| self.backend.commit());
        secret.zeroize();
        result?;

        info!(
            "Credentials saved for network '{}' (secret {} bytes)",
            identity.name(),
            identity.secret().len()
        );
        Ok(())
    }

    /// Zero both fields.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.backend.write(NAME_OFFSET, &[0u8; NAME_FIELD_LEN])?;
        self.backend.write(SECRET_OFFSET, &[0u8; SECRET_FIELD_LEN])?;
        self.backend.commit()?;
        warn!("Stored credentials cleared");
        Ok(())
    }

    /// Borrow the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

/// Decode a NUL-terminated field. Bytes after the first NUL are ignored.
fn decode_field(field: &[u8]) -> Option<String> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    match std::str::from_utf8(&field[..end]) {
        Ok(s) => Some(s.to_string()),
        Err(e) => {
            warn!("Stored field is not valid UTF-8: {}", e);
            None
        }
    }
}

/// Encode into a fixed field, leaving room for the NUL terminator.
fn encode_field(value: &str, field: &mut [u8]) -> Result<(), StorageError> {
    let bytes = value.as_bytes();
    if bytes.len() >= field.len() {
        return Err(StorageError::FieldTooLong {
            len: bytes.len(),
            max: field.len() - 1,
        });
    }
    field.fill(0);
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// Access outside the store.
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },
    /// Backend cannot hold the credential layout.
    TooSmall { capacity: usize, required: usize },
    /// Value does not fit its field.
    FieldTooLong { len: usize, max: usize },
    /// Data read back differs from what was written.
    VerificationFailed,
    /// Host file I/O error.
    Io(std::io::Error),
    /// ESP-IDF error.
    #[cfg(feature = "esp32")]
    Esp(esp_idf_sys::EspError),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds {
                offset,
                len,
                capacity,
            } => write!(
                f,
                "access of {} bytes at offset {} exceeds capacity {}",
                len, offset, capacity
            ),
            Self::TooSmall { capacity, required } => {
                write!(f, "store too small: {} bytes (need {})", capacity, required)
            }
            Self::FieldTooLong { len, max } => {
                write!(f, "value too long: {} bytes (max {})", len, max)
            }
            Self::VerificationFailed => write!(f, "read-back verification failed"),
            Self::Io(e) => write!(f, "I/O error: {}", e),
            #[cfg(feature = "esp32")]
            Self::Esp(e) => write!(f, "ESP error: {:?}", e),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for StorageError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Esp(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CredentialStore<MemoryStore> {
        CredentialStore::new(MemoryStore::for_credentials()).unwrap()
    }

    // ==================== Layout Tests ====================

    #[test]
    fn test_layout_offsets() {
        let mut store = store();
        let identity = NetworkIdentity::new("Greenhouse", "secret1").unwrap();
        store.save(&identity).unwrap();

        let bytes = store.backend().as_bytes();
        assert_eq!(&bytes[0..10], b"Greenhouse");
        assert!(bytes[10..32].iter().all(|&b| b == 0));
        assert_eq!(&bytes[32..39], b"secret1");
        assert!(bytes[39..96].iter().all(|&b| b == 0));
        assert_eq!(store.backend().commits(), 1);
    }

    #[test]
    fn test_save_then_load() {
        let mut store = store();
        let identity = NetworkIdentity::new("Greenhouse", "secret1").unwrap();
        store.save(&identity).unwrap();
        assert_eq!(store.load(), Some(identity));
    }

    #[test]
    fn test_overwrite_shorter_value() {
        let mut store = store();
        store
            .save(&NetworkIdentity::new("LongNetworkName", "longsecretvalue").unwrap())
            .unwrap();
        store
            .save(&NetworkIdentity::new("Short", "pw").unwrap())
            .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.name(), "Short");
        assert_eq!(loaded.secret(), "pw");
    }

    #[test]
    fn test_max_length_fields() {
        let mut store = store();
        let identity = NetworkIdentity::new("n".repeat(31), "s".repeat(63)).unwrap();
        store.save(&identity).unwrap();
        assert_eq!(store.backend().as_bytes()[31], 0);
        assert_eq!(store.backend().as_bytes()[95], 0);
        assert_eq!(store.load(), Some(identity));
    }

    // ==================== Absence / Corruption Tests ====================

    #[test]
    fn test_blank_store_is_absent() {
        assert!(store().load().is_none());
    }

    #[test]
    fn test_erased_flash_is_absent() {
        // Erased EEPROM reads back as 0xFF, which is not valid UTF-8.
        let mut backend = MemoryStore::for_credentials();
        backend.write(0, &[0xFF; LAYOUT_LEN]).unwrap();
        let store = CredentialStore::new(backend).unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_unterminated_name_field() {
        let mut backend = MemoryStore::for_credentials();
        backend.write(NAME_OFFSET, &[b'a'; NAME_FIELD_LEN]).unwrap();
        let store = CredentialStore::new(backend).unwrap();
        // 32 bytes without a terminator exceeds the 31-byte name limit.
        assert!(store.load().is_none());
    }

    #[test]
    fn test_clear() {
        let mut store = store();
        store
            .save(&NetworkIdentity::new("Greenhouse", "secret1").unwrap())
            .unwrap();
        store.clear().unwrap();
        assert!(store.load().is_none());
        assert!(store.backend().as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_backend_too_small() {
        let result = CredentialStore::new(MemoryStore::new(64));
        assert!(matches!(
            result,
            Err(StorageError::TooSmall {
                capacity: 64,
                required: 96
            })
        ));
    }

    // ==================== MemoryStore Tests ====================

    #[test]
    fn test_memory_store_bounds() {
        let mut store = MemoryStore::new(8);
        assert!(store.write(4, &[1, 2, 3, 4]).is_ok());
        assert!(matches!(
            store.write(5, &[1, 2, 3, 4]),
            Err(StorageError::OutOfBounds { .. })
        ));
        let mut buf = [0u8; 4];
        store.read(4, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
        assert!(store.read(usize::MAX, &mut buf).is_err());
    }
}
