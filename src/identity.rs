//! Device identity and backend tags.
//!
//! A [`DeviceIdentity`] is the canonical, NUL-terminated name of a backing
//! device (a path or URI). The encoded length always counts the terminator,
//! which is the form the engine boundary expects.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum identity payload in bytes (terminator excluded).
pub const MAX_IDENTITY_LEN: usize = 4095;

/// Error types for DeviceIdentity construction
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("device identity is empty")]
    Empty,

    #[error("device identity contains an interior NUL at byte {0}")]
    InteriorNul(usize),

    #[error("device identity is not NUL-terminated")]
    MissingTerminator,

    #[error("encoded length {declared} does not match payload length {actual} + 1")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("device identity exceeds {MAX_IDENTITY_LEN} bytes")]
    TooLong,

    #[error("device identity is not valid UTF-8")]
    NotUtf8,
}

/// Canonical identifier of a backing device.
///
/// Stored as the payload bytes followed by a single NUL. Immutable once built.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceIdentity {
    bytes: Box<[u8]>,
}

impl DeviceIdentity {
    /// Build an identity from a device name or URI.
    pub fn new(name: &str) -> Result<Self, IdentityError> {
        if name.is_empty() {
            return Err(IdentityError::Empty);
        }
        if name.len() > MAX_IDENTITY_LEN {
            return Err(IdentityError::TooLong);
        }
        if let Some(pos) = name.bytes().position(|b| b == 0) {
            return Err(IdentityError::InteriorNul(pos));
        }

        let mut bytes = Vec::with_capacity(name.len() + 1);
        bytes.extend_from_slice(name.as_bytes());
        bytes.push(0);

        Ok(Self {
            bytes: bytes.into_boxed_slice(),
        })
    }

    /// Rebuild an identity from its encoded form.
    ///
    /// `encoded` must hold the payload plus terminator and `size` must equal
    /// `encoded.len()`. This is the check applied to identities arriving
    /// through the C ABI.
    pub fn from_raw(encoded: &[u8], size: usize) -> Result<Self, IdentityError> {
        if size != encoded.len() {
            return Err(IdentityError::LengthMismatch {
                declared: size,
                actual: encoded.len().saturating_sub(1),
            });
        }
        let (last, payload) = encoded.split_last().ok_or(IdentityError::Empty)?;
        if *last != 0 {
            return Err(IdentityError::MissingTerminator);
        }
        let name = std::str::from_utf8(payload).map_err(|_| IdentityError::NotUtf8)?;
        Self::new(name)
    }

    /// Identity payload without the terminator.
    pub fn as_str(&self) -> &str {
        // Payload was validated as UTF-8 on construction.
        std::str::from_utf8(self.payload()).unwrap_or_default()
    }

    /// Payload followed by the NUL terminator.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.bytes
    }

    /// Encoded length, terminator included.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Pointer to the NUL-terminated encoding; valid while `self` lives.
    pub fn as_ptr(&self) -> *const u8 {
        self.bytes.as_ptr()
    }

    fn payload(&self) -> &[u8] {
        &self.bytes[..self.bytes.len() - 1]
    }
}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeviceIdentity").field(&self.as_str()).finish()
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for DeviceIdentity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<DeviceIdentity> for String {
    fn from(value: DeviceIdentity) -> Self {
        value.as_str().to_owned()
    }
}

/// One-byte tag naming the data-object backend behind a device.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BackendType(pub u8);

impl BackendType {
    /// Raw block device.
    pub const BLOCK: BackendType = BackendType(0);
    /// File-backed volume.
    pub const FILE: BackendType = BackendType(1);
    /// Memory-backed volume.
    pub const MEMORY: BackendType = BackendType(2);

    pub fn as_u8(self) -> u8 {
        self.0
    }

    pub fn as_str(&self) -> &'static str {
        match *self {
            BackendType::BLOCK => "block",
            BackendType::FILE => "file",
            BackendType::MEMORY => "memory",
            _ => "custom",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.as_str(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_length_counts_terminator() {
        let id = DeviceIdentity::new("/dev/loop0").unwrap();
        assert_eq!(id.len(), 11);
        assert_eq!(id.as_str(), "/dev/loop0");
        assert_eq!(id.as_bytes_with_nul().last(), Some(&0));
    }

    #[test]
    fn test_identity_rejects_empty() {
        assert_eq!(DeviceIdentity::new(""), Err(IdentityError::Empty));
    }

    #[test]
    fn test_identity_rejects_interior_nul() {
        assert_eq!(
            DeviceIdentity::new("dev\0ice"),
            Err(IdentityError::InteriorNul(3))
        );
    }

    #[test]
    fn test_identity_rejects_oversized() {
        let long = "x".repeat(MAX_IDENTITY_LEN + 1);
        assert_eq!(DeviceIdentity::new(&long), Err(IdentityError::TooLong));
    }

    #[test]
    fn test_from_raw_roundtrip() {
        let id = DeviceIdentity::new("file:///var/disk.img").unwrap();
        let raw = DeviceIdentity::from_raw(id.as_bytes_with_nul(), id.len()).unwrap();
        assert_eq!(raw, id);
    }

    #[test]
    fn test_from_raw_length_mismatch() {
        let result = DeviceIdentity::from_raw(b"/dev/sda\0", 8);
        assert!(matches!(
            result,
            Err(IdentityError::LengthMismatch { declared: 8, .. })
        ));
    }

    #[test]
    fn test_from_raw_missing_terminator() {
        assert_eq!(
            DeviceIdentity::from_raw(b"/dev/sda", 8),
            Err(IdentityError::MissingTerminator)
        );
    }

    #[test]
    fn test_from_raw_terminator_only() {
        assert_eq!(DeviceIdentity::from_raw(b"\0", 1), Err(IdentityError::Empty));
    }

    #[test]
    fn test_backend_names() {
        assert_eq!(BackendType::BLOCK.as_str(), "block");
        assert_eq!(BackendType::FILE.as_str(), "file");
        assert_eq!(BackendType::MEMORY.as_str(), "memory");
        assert_eq!(BackendType(42).as_str(), "custom");
        assert_eq!(BackendType(42).to_string(), "custom(42)");
    }
}
