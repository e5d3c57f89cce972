//! Network identity data structures.
//!
//! This module contains platform-independent types for the station-mode
//! network identity that can be tested on the host machine.
//!
//! # Example
//!
//! ```
//! use greenhouse_controller::config::NetworkIdentity;
//!
//! let identity = NetworkIdentity::new("Greenhouse", "secret1").unwrap();
//! assert!(identity.validate().is_ok());
//! assert!(!identity.is_open());
//! ```

use serde::Deserialize;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum network name length. The persisted field is 32 bytes and keeps
/// a NUL terminator.
pub const MAX_NAME_LEN: usize = 31;

/// Maximum secret length. The persisted field is 64 bytes and keeps a NUL
/// terminator.
pub const MAX_SECRET_LEN: usize = 63;

/// Credentials for joining a station-mode network.
///
/// The secret is wiped from memory when the identity is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct NetworkIdentity {
    name: String,
    secret: String,
}

impl NetworkIdentity {
    /// Create a new identity.
    ///
    /// Returns an error if the name is empty or either field is too long.
    pub fn new(name: impl Into<String>, secret: impl Into<String>) -> Result<Self, IdentityError> {
        let identity = Self {
            name: name.into(),
            secret: secret.into(),
        };
        identity.validate()?;
        Ok(identity)
    }

    /// Create an identity for an open network (no secret).
    pub fn open(name: impl Into<String>) -> Result<Self, IdentityError> {
        Self::new(name, String::new())
    }

    /// Validate the identity.
    pub fn validate(&self) -> Result<(), IdentityError> {
        if self.name.is_empty() {
            return Err(IdentityError::NameEmpty);
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(IdentityError::NameTooLong {
                len: self.name.len(),
                max: MAX_NAME_LEN,
            });
        }
        if self.secret.len() > MAX_SECRET_LEN {
            return Err(IdentityError::SecretTooLong {
                len: self.secret.len(),
                max: MAX_SECRET_LEN,
            });
        }
        if self.name.contains('\0') || self.secret.contains('\0') {
            return Err(IdentityError::InvalidFormat("embedded NUL byte".into()));
        }
        Ok(())
    }

    /// Network name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Network secret (empty for open networks).
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Check if this is an open network (no secret).
    pub fn is_open(&self) -> bool {
        self.secret.is_empty()
    }

    /// Parse the structured identity-update payload.
    ///
    /// Format: `{"ssid": "<name>", "password": "<secret>"}`. A missing or
    /// null `password` means an open network.
    pub fn from_json(payload: &[u8]) -> Result<Self, IdentityError> {
        #[derive(Deserialize)]
        struct Payload {
            ssid: String,
            #[serde(default)]
            password: Option<String>,
        }

        let parsed: Payload = serde_json::from_slice(payload)
            .map_err(|e| IdentityError::InvalidFormat(e.to_string()))?;
        Self::new(parsed.ssid, parsed.password.unwrap_or_default())
    }
}

impl fmt::Debug for NetworkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkIdentity")
            .field("name", &self.name)
            .field("secret_len", &self.secret.len())
            .finish()
    }
}

/// Errors that can occur while building an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Network name is empty.
    NameEmpty,
    /// Network name exceeds the persisted field.
    NameTooLong { len: usize, max: usize },
    /// Secret exceeds the persisted field.
    SecretTooLong { len: usize, max: usize },
    /// Payload could not be decoded.
    InvalidFormat(String),
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameEmpty => write!(f, "network name cannot be empty"),
            Self::NameTooLong { len, max } => {
                write!(f, "network name too long: {} bytes (max {})", len, max)
            }
            Self::SecretTooLong { len, max } => {
                write!(f, "secret too long: {} bytes (max {})", len, max)
            }
            Self::InvalidFormat(msg) => write!(f, "invalid format: {}", msg),
        }
    }
}

impl std::error::Error for IdentityError {}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Validation Tests ====================

    #[test]
    fn test_valid_identity() {
        let identity = NetworkIdentity::new("Greenhouse", "secret1").unwrap();
        assert_eq!(identity.name(), "Greenhouse");
        assert_eq!(identity.secret(), "secret1");
        assert!(!identity.is_open());
    }

    #[test]
    fn test_open_network() {
        let identity = NetworkIdentity::open("Barn").unwrap();
        assert!(identity.is_open());
    }

    #[test]
    fn test_empty_name() {
        assert_eq!(
            NetworkIdentity::new("", "secret1"),
            Err(IdentityError::NameEmpty)
        );
    }

    #[test]
    fn test_name_limits() {
        assert!(NetworkIdentity::open("a".repeat(MAX_NAME_LEN)).is_ok());
        assert!(matches!(
            NetworkIdentity::open("a".repeat(MAX_NAME_LEN + 1)),
            Err(IdentityError::NameTooLong { len: 32, max: 31 })
        ));
    }

    #[test]
    fn test_secret_limits() {
        assert!(NetworkIdentity::new("net", "s".repeat(MAX_SECRET_LEN)).is_ok());
        assert!(matches!(
            NetworkIdentity::new("net", "s".repeat(MAX_SECRET_LEN + 1)),
            Err(IdentityError::SecretTooLong { .. })
        ));
    }

    #[test]
    fn test_short_secret_allowed() {
        // The stored field has no minimum; the network decides.
        assert!(NetworkIdentity::new("net", "abc").is_ok());
    }

    #[test]
    fn test_embedded_nul_rejected() {
        assert!(matches!(
            NetworkIdentity::new("ne\0t", "x"),
            Err(IdentityError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_debug_hides_secret() {
        let identity = NetworkIdentity::new("Greenhouse", "hunter22").unwrap();
        let debug = format!("{:?}", identity);
        assert!(debug.contains("Greenhouse"));
        assert!(!debug.contains("hunter22"));
    }

    // ==================== Payload Tests ====================

    #[test]
    fn test_from_json() {
        let identity =
            NetworkIdentity::from_json(br#"{"ssid":"Greenhouse","password":"secret1"}"#).unwrap();
        assert_eq!(identity.name(), "Greenhouse");
        assert_eq!(identity.secret(), "secret1");
    }

    #[test]
    fn test_from_json_null_password() {
        let identity = NetworkIdentity::from_json(br#"{"ssid":"Open","password":null}"#).unwrap();
        assert!(identity.is_open());
        let identity = NetworkIdentity::from_json(br#"{"ssid":"Open"}"#).unwrap();
        assert!(identity.is_open());
    }

    #[test]
    fn test_from_json_malformed() {
        assert!(matches!(
            NetworkIdentity::from_json(b"ssid=Greenhouse"),
            Err(IdentityError::InvalidFormat(_))
        ));
        assert!(matches!(
            NetworkIdentity::from_json(br#"{"password":"x"}"#),
            Err(IdentityError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_from_json_empty_name() {
        assert_eq!(
            NetworkIdentity::from_json(br#"{"ssid":"","password":"x"}"#),
            Err(IdentityError::NameEmpty)
        );
    }
}
