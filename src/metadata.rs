//! Persisted core table records.
//!
//! The engine keeps one [`CoreRecord`] per core a cache has ever known,
//! attached or not. A cache's table can be snapshotted into a compact,
//! integrity-protected byte blob and loaded back, which is what makes
//! attach-only semantics meaningful across engine restarts.
//!
//! Snapshot format: a MessagePack [`MetadataEnvelope`] holding the
//! LZ4-compressed MessagePack table, its xxHash3-64 checksum and the
//! uncompressed size. Decoding enforces:
//! - 16MB limit on the uncompressed table and on the envelope
//! - 1000x maximum compression ratio
//! - checksum verification after decompression

use crate::config::UserMetadata;
use crate::engine::CacheId;
use crate::identity::{BackendType, DeviceIdentity};
use serde::{Deserialize, Serialize};
use thiserror::Error;
#[cfg(feature = "checksum")]
use xxhash_rust::xxh3::xxh3_64;

/// Error types for metadata snapshots
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetadataError {
    #[error("metadata exceeds maximum size")]
    TooLarge,

    #[error("decompression ratio exceeds safety limit")]
    DecompressionBomb,

    #[error("integrity check failed")]
    ChecksumMismatch,

    #[error("decompression failed")]
    DecompressionFailed,

    #[error("size validation failed")]
    SizeValidationFailed,

    #[error("unsupported metadata format: {0}")]
    UnsupportedFormat(String),

    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    #[error("deserialization failed: {0}")]
    DeserializationFailed(String),
}

pub(crate) const MAX_METADATA_SIZE: usize = 16 * 1024 * 1024;
/// Integer ratio bound; keeps the bomb check free of float rounding.
pub(crate) const MAX_COMPRESSION_RATIO: u64 = 1000;

/// Format tag written into every envelope.
pub const CORE_TABLE_FORMAT: &str = "core-table/v1";

/// What the engine remembers about one core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreRecord {
    pub identity: DeviceIdentity,
    pub backend_type: BackendType,
    pub core_slot: u16,
    pub name: Option<String>,
    pub seq_cutoff_threshold: u32,
    pub user_metadata: UserMetadata,
}

/// All records of one cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreTableSnapshot {
    pub cache: CacheId,
    pub records: Vec<CoreRecord>,
}

/// Compressed, checksummed snapshot container.
#[derive(Debug, Serialize, Deserialize)]
pub struct MetadataEnvelope {
    pub compressed_data: Vec<u8>,
    /// xxHash3-64 of the uncompressed payload, big-endian.
    pub checksum: [u8; 8],
    pub original_size: u32,
    pub format: String,
}

impl MetadataEnvelope {
    #[cfg(all(feature = "compression", feature = "checksum"))]
    pub fn seal(payload: &[u8]) -> Result<Self, MetadataError> {
        if payload.len() > MAX_METADATA_SIZE {
            return Err(MetadataError::TooLarge);
        }

        let compressed_data = lz4_flex::compress(payload);
        if compressed_data.len() > MAX_METADATA_SIZE {
            return Err(MetadataError::TooLarge);
        }

        Ok(MetadataEnvelope {
            compressed_data,
            checksum: xxh3_64(payload).to_be_bytes(),
            original_size: payload.len() as u32,
            format: CORE_TABLE_FORMAT.to_string(),
        })
    }

    #[cfg(all(feature = "compression", feature = "checksum"))]
    pub fn open(&self) -> Result<Vec<u8>, MetadataError> {
        if self.format != CORE_TABLE_FORMAT {
            return Err(MetadataError::UnsupportedFormat(self.format.clone()));
        }

        if self.compressed_data.len() > MAX_METADATA_SIZE
            || self.original_size as usize > MAX_METADATA_SIZE
        {
            return Err(MetadataError::TooLarge);
        }

        let compressed_size = self.compressed_data.len() as u64;
        if compressed_size == 0 {
            return Err(MetadataError::DecompressionBomb);
        }
        let max_allowed_original = MAX_COMPRESSION_RATIO
            .checked_mul(compressed_size)
            .ok_or(MetadataError::DecompressionBomb)?;
        if (self.original_size as u64) > max_allowed_original {
            return Err(MetadataError::DecompressionBomb);
        }

        let payload = lz4_flex::decompress(&self.compressed_data, self.original_size as usize)
            .map_err(|_| MetadataError::DecompressionFailed)?;

        if xxh3_64(&payload).to_be_bytes() != self.checksum {
            return Err(MetadataError::ChecksumMismatch);
        }

        if payload.len() != self.original_size as usize {
            return Err(MetadataError::SizeValidationFailed);
        }

        Ok(payload)
    }
}

impl CoreTableSnapshot {
    /// Serialize and seal the table.
    #[cfg(all(feature = "compression", feature = "checksum", feature = "messagepack"))]
    pub fn encode(&self) -> Result<Vec<u8>, MetadataError> {
        let payload = rmp_serde::to_vec(self)
            .map_err(|e| MetadataError::SerializationFailed(e.to_string()))?;
        let envelope = MetadataEnvelope::seal(&payload)?;
        let bytes = rmp_serde::to_vec(&envelope)
            .map_err(|e| MetadataError::SerializationFailed(e.to_string()))?;

        if bytes.len() > MAX_METADATA_SIZE {
            return Err(MetadataError::TooLarge);
        }
        Ok(bytes)
    }

    /// Verify and decode a sealed table.
    #[cfg(all(feature = "compression", feature = "checksum", feature = "messagepack"))]
    pub fn decode(bytes: &[u8]) -> Result<Self, MetadataError> {
        if bytes.len() > MAX_METADATA_SIZE {
            return Err(MetadataError::TooLarge);
        }

        let envelope: MetadataEnvelope = rmp_serde::from_slice(bytes)
            .map_err(|e| MetadataError::DeserializationFailed(e.to_string()))?;
        let payload = envelope.open()?;

        rmp_serde::from_slice(&payload)
            .map_err(|e| MetadataError::DeserializationFailed(e.to_string()))
    }
}

#[cfg(all(
    test,
    feature = "compression",
    feature = "checksum",
    feature = "messagepack"
))]
mod tests {
    use super::*;

    fn sample_table() -> CoreTableSnapshot {
        CoreTableSnapshot {
            cache: CacheId(1),
            records: vec![
                CoreRecord {
                    identity: DeviceIdentity::new("/dev/loop0").unwrap(),
                    backend_type: BackendType::BLOCK,
                    core_slot: 0,
                    name: Some("core0".to_string()),
                    seq_cutoff_threshold: 1024 * 1024,
                    user_metadata: UserMetadata::default(),
                },
                CoreRecord {
                    identity: DeviceIdentity::new("file:///srv/disk1.img").unwrap(),
                    backend_type: BackendType::FILE,
                    core_slot: 9,
                    name: None,
                    seq_cutoff_threshold: 64 * 1024,
                    user_metadata: UserMetadata::new(vec![0xde, 0xad]),
                },
            ],
        }
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let table = sample_table();
        let bytes = table.encode().unwrap();
        let decoded = CoreTableSnapshot::decode(&bytes).unwrap();
        assert_eq!(decoded, table);
    }

    #[test]
    fn test_envelope_checksum_detects_corruption() {
        let mut envelope = MetadataEnvelope::seal(b"core table payload").unwrap();
        envelope.checksum[0] = !envelope.checksum[0];
        assert_eq!(envelope.open(), Err(MetadataError::ChecksumMismatch));
    }

    #[test]
    fn test_envelope_rejects_unknown_format() {
        let mut envelope = MetadataEnvelope::seal(b"payload").unwrap();
        envelope.format = "core-table/v0".to_string();
        assert!(matches!(
            envelope.open(),
            Err(MetadataError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_envelope_zero_compressed_size_is_bomb() {
        let envelope = MetadataEnvelope {
            compressed_data: vec![],
            checksum: [0u8; 8],
            original_size: 100,
            format: CORE_TABLE_FORMAT.to_string(),
        };
        assert_eq!(envelope.open(), Err(MetadataError::DecompressionBomb));
    }

    #[test]
    fn test_envelope_ratio_over_limit_is_bomb() {
        let envelope = MetadataEnvelope {
            compressed_data: vec![0u8; 10],
            checksum: [0u8; 8],
            original_size: 10_001,
            format: CORE_TABLE_FORMAT.to_string(),
        };
        assert_eq!(envelope.open(), Err(MetadataError::DecompressionBomb));
    }

    #[test]
    fn test_envelope_ratio_at_limit_passes_bomb_check() {
        let envelope = MetadataEnvelope {
            compressed_data: vec![0u8; 10],
            checksum: [0u8; 8],
            original_size: 10_000,
            format: CORE_TABLE_FORMAT.to_string(),
        };
        let result = envelope.open();
        assert!(result.is_err());
        assert_ne!(result, Err(MetadataError::DecompressionBomb));
    }

    #[test]
    fn test_envelope_oversized_claim_rejected_before_ratio() {
        let envelope = MetadataEnvelope {
            compressed_data: vec![0u8; 100],
            checksum: [0u8; 8],
            original_size: u32::MAX,
            format: CORE_TABLE_FORMAT.to_string(),
        };
        assert_eq!(envelope.open(), Err(MetadataError::TooLarge));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = CoreTableSnapshot::decode(b"not a snapshot");
        assert!(matches!(result, Err(MetadataError::DeserializationFailed(_))));
    }

    #[test]
    fn test_decode_oversized_input() {
        let bytes = vec![0u8; MAX_METADATA_SIZE + 1];
        assert_eq!(
            CoreTableSnapshot::decode(&bytes),
            Err(MetadataError::TooLarge)
        );
    }
}
