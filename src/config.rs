//! Core configuration model and builder.
//!
//! A [`CoreConfiguration`] describes how one device is attached to a cache:
//! which device, which backend, which slot in the cache's core table and
//! under which policy. It is built once, validated up front, and then handed
//! by value to a [`Core`](crate::core::Core), which is the only thing allowed
//! to change it afterwards (recording the engine-assigned cache slot).

use crate::error::CoreError;
use crate::identity::{BackendType, DeviceIdentity};
use serde::{Deserialize, Serialize};
use std::ffi::CString;

/// Core slot value meaning "let the engine pick a free slot".
pub const CORE_SLOT_AUTO: u16 = 4096;

/// Largest slot a caller may request explicitly.
pub const MAX_CORE_SLOT: u16 = CORE_SLOT_AUTO - 1;

/// Cache slot reported until an attach succeeds.
pub const CACHE_SLOT_UNASSIGNED: u16 = u16::MAX;

/// Default sequential cutoff threshold (1 MiB).
pub const DEFAULT_SEQ_CUTOFF_THRESHOLD: u32 = 1024 * 1024;

/// Maximum size of the opaque user metadata blob.
pub const MAX_USER_METADATA_SIZE: usize = 4096;

/// Whether attach may create a new core record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AttachPolicy {
    /// The core must already be known to the cache's persisted metadata.
    #[default]
    AttachOnly,
    /// Create the core record when the cache does not know the device yet.
    AttachOrCreate,
}

impl AttachPolicy {
    /// Wire flag: `true` means attach-or-create.
    pub fn as_flag(self) -> bool {
        matches!(self, AttachPolicy::AttachOrCreate)
    }

    pub fn from_flag(try_add: bool) -> Self {
        if try_add {
            AttachPolicy::AttachOrCreate
        } else {
            AttachPolicy::AttachOnly
        }
    }
}

/// Caller-owned opaque blob stored alongside the core record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserMetadata(Vec<u8>);

impl UserMetadata {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for UserMetadata {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

impl From<&[u8]> for UserMetadata {
    fn from(data: &[u8]) -> Self {
        Self(data.to_vec())
    }
}

/// Immutable description of a device attached as a cache core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfiguration {
    identity: DeviceIdentity,
    backend_type: BackendType,
    core_slot: u16,
    name: Option<CString>,
    cache_slot: u16,
    attach_policy: AttachPolicy,
    seq_cutoff_threshold: u32,
    user_metadata: UserMetadata,
}

impl CoreConfiguration {
    /// Start building a configuration for `identity`.
    pub fn builder(identity: DeviceIdentity, backend_type: BackendType) -> CoreConfigBuilder {
        CoreConfigBuilder::new(identity, backend_type)
    }

    /// Attach-only configuration with every other field at its default.
    pub fn using_device(identity: DeviceIdentity, backend_type: BackendType) -> Self {
        Self {
            identity,
            backend_type,
            core_slot: CORE_SLOT_AUTO,
            name: None,
            cache_slot: CACHE_SLOT_UNASSIGNED,
            attach_policy: AttachPolicy::AttachOnly,
            seq_cutoff_threshold: DEFAULT_SEQ_CUTOFF_THRESHOLD,
            user_metadata: UserMetadata::default(),
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn backend_type(&self) -> BackendType {
        self.backend_type
    }

    /// Requested slot; [`CORE_SLOT_AUTO`] when the engine assigns one.
    pub fn core_slot(&self) -> u16 {
        self.core_slot
    }

    pub fn is_auto_slot(&self) -> bool {
        self.core_slot == CORE_SLOT_AUTO
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_ref().and_then(|n| n.to_str().ok())
    }

    pub(crate) fn name_cstr(&self) -> Option<&CString> {
        self.name.as_ref()
    }

    /// Owning cache slot, [`CACHE_SLOT_UNASSIGNED`] until attached.
    pub fn cache_slot(&self) -> u16 {
        self.cache_slot
    }

    pub fn attach_policy(&self) -> AttachPolicy {
        self.attach_policy
    }

    pub fn seq_cutoff_threshold(&self) -> u32 {
        self.seq_cutoff_threshold
    }

    pub fn user_metadata(&self) -> &UserMetadata {
        &self.user_metadata
    }

    pub(crate) fn set_cache_slot(&mut self, cache_slot: u16) {
        self.cache_slot = cache_slot;
    }
}

/// Builder for [`CoreConfiguration`].
///
/// ```
/// use blockcache_core::{AttachPolicy, BackendType, CoreConfiguration, DeviceIdentity};
///
/// let identity = DeviceIdentity::new("/dev/loop0").unwrap();
/// let config = CoreConfiguration::builder(identity, BackendType::BLOCK)
///     .name("core0")
///     .attach_policy(AttachPolicy::AttachOrCreate)
///     .build()
///     .unwrap();
///
/// assert_eq!(config.identity().len(), 11);
/// assert_eq!(config.seq_cutoff_threshold(), 1024 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct CoreConfigBuilder {
    identity: DeviceIdentity,
    backend_type: BackendType,
    core_slot: u16,
    name: Option<String>,
    attach_policy: AttachPolicy,
    seq_cutoff_threshold: u32,
    user_metadata: UserMetadata,
}

impl CoreConfigBuilder {
    pub fn new(identity: DeviceIdentity, backend_type: BackendType) -> Self {
        Self {
            identity,
            backend_type,
            core_slot: CORE_SLOT_AUTO,
            name: None,
            attach_policy: AttachPolicy::AttachOnly,
            seq_cutoff_threshold: DEFAULT_SEQ_CUTOFF_THRESHOLD,
            user_metadata: UserMetadata::default(),
        }
    }

    pub fn core_slot(mut self, core_slot: u16) -> Self {
        self.core_slot = core_slot;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn attach_policy(mut self, policy: AttachPolicy) -> Self {
        self.attach_policy = policy;
        self
    }

    /// Boolean form of [`attach_policy`](Self::attach_policy).
    pub fn try_add(self, try_add: bool) -> Self {
        self.attach_policy(AttachPolicy::from_flag(try_add))
    }

    pub fn seq_cutoff_threshold(mut self, threshold: u32) -> Self {
        self.seq_cutoff_threshold = threshold;
        self
    }

    pub fn user_metadata(mut self, metadata: impl Into<UserMetadata>) -> Self {
        self.user_metadata = metadata.into();
        self
    }

    pub fn build(self) -> Result<CoreConfiguration, CoreError> {
        if self.core_slot > MAX_CORE_SLOT && self.core_slot != CORE_SLOT_AUTO {
            return Err(CoreError::InvalidConfiguration(format!(
                "core slot {} exceeds {}",
                self.core_slot, MAX_CORE_SLOT
            )));
        }

        if self.user_metadata.len() > MAX_USER_METADATA_SIZE {
            return Err(CoreError::InvalidConfiguration(format!(
                "user metadata is {} bytes, limit is {}",
                self.user_metadata.len(),
                MAX_USER_METADATA_SIZE
            )));
        }

        let name = match self.name {
            Some(name) => Some(CString::new(name).map_err(|_| {
                CoreError::InvalidConfiguration("core name contains NUL".to_string())
            })?),
            None => None,
        };

        Ok(CoreConfiguration {
            identity: self.identity,
            backend_type: self.backend_type,
            core_slot: self.core_slot,
            name,
            cache_slot: CACHE_SLOT_UNASSIGNED,
            attach_policy: self.attach_policy,
            seq_cutoff_threshold: self.seq_cutoff_threshold,
            user_metadata: self.user_metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loop0() -> DeviceIdentity {
        DeviceIdentity::new("/dev/loop0").unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let config = CoreConfigBuilder::new(loop0(), BackendType::BLOCK)
            .build()
            .unwrap();

        assert_eq!(config.core_slot(), CORE_SLOT_AUTO);
        assert!(config.is_auto_slot());
        assert_eq!(config.name(), None);
        assert_eq!(config.cache_slot(), CACHE_SLOT_UNASSIGNED);
        assert_eq!(config.attach_policy(), AttachPolicy::AttachOnly);
        assert_eq!(config.seq_cutoff_threshold(), 1_048_576);
        assert!(config.user_metadata().is_empty());
    }

    #[test]
    fn test_builder_roundtrip_fields() {
        let config = CoreConfigBuilder::new(loop0(), BackendType::FILE)
            .core_slot(7)
            .name("core7")
            .try_add(true)
            .seq_cutoff_threshold(4096)
            .user_metadata(vec![1, 2, 3])
            .build()
            .unwrap();

        assert_eq!(config.identity().as_str(), "/dev/loop0");
        assert_eq!(config.backend_type(), BackendType::FILE);
        assert_eq!(config.core_slot(), 7);
        assert_eq!(config.name(), Some("core7"));
        assert_eq!(config.attach_policy(), AttachPolicy::AttachOrCreate);
        assert_eq!(config.seq_cutoff_threshold(), 4096);
        assert_eq!(config.user_metadata().as_bytes(), &[1, 2, 3]);
        assert_eq!(config.cache_slot(), CACHE_SLOT_UNASSIGNED);
    }

    #[test]
    fn test_using_device_matches_builder_defaults() {
        let direct = CoreConfiguration::using_device(loop0(), BackendType::BLOCK);
        let built = CoreConfiguration::builder(loop0(), BackendType::BLOCK)
            .build()
            .unwrap();
        assert_eq!(direct, built);
    }

    #[test]
    fn test_slot_out_of_range_rejected() {
        let result = CoreConfigBuilder::new(loop0(), BackendType::BLOCK)
            .core_slot(CORE_SLOT_AUTO + 1)
            .build();
        assert!(matches!(result, Err(CoreError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_max_explicit_slot_accepted() {
        let config = CoreConfigBuilder::new(loop0(), BackendType::BLOCK)
            .core_slot(MAX_CORE_SLOT)
            .build()
            .unwrap();
        assert!(!config.is_auto_slot());
    }

    #[test]
    fn test_name_with_nul_rejected() {
        let result = CoreConfigBuilder::new(loop0(), BackendType::BLOCK)
            .name("bad\0name")
            .build();
        assert!(matches!(result, Err(CoreError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_oversized_user_metadata_rejected() {
        let result = CoreConfigBuilder::new(loop0(), BackendType::BLOCK)
            .user_metadata(vec![0u8; MAX_USER_METADATA_SIZE + 1])
            .build();
        assert!(matches!(result, Err(CoreError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_policy_flag_conversion() {
        assert!(AttachPolicy::AttachOrCreate.as_flag());
        assert!(!AttachPolicy::AttachOnly.as_flag());
        assert_eq!(AttachPolicy::from_flag(true), AttachPolicy::AttachOrCreate);
        assert_eq!(AttachPolicy::from_flag(false), AttachPolicy::AttachOnly);
    }
}
