//! Cache engine boundary.
//!
//! The engine owns cache instances and their core tables. This crate only
//! talks to it through [`CacheEngine`]; [`MemoryEngine`] is an in-process
//! implementation of the same contract used for tests and for the C ABI.

pub mod memory;

pub use memory::MemoryEngine;

use crate::config::CoreConfiguration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;
use thiserror::Error;

/// Identifier of a cache instance inside an engine.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheId(pub u16);

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache{}", self.0)
    }
}

/// Opaque engine-issued reference to an attached core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineHandle(NonZeroU64);

impl EngineHandle {
    pub fn from_raw(raw: NonZeroU64) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0.get()
    }
}

/// Opaque engine-issued reference to an allocated IO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineIoRef(NonZeroU64);

impl EngineIoRef {
    pub fn from_raw(raw: NonZeroU64) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0.get()
    }
}

/// Result of a successful attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachedCore {
    pub handle: EngineHandle,
    /// Slot of the owning cache, recorded into the configuration.
    pub cache_slot: u16,
    /// Slot the core occupies in the cache's core table.
    pub core_slot: u16,
}

/// Why the engine refused an attach.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachFailure {
    #[error("device identity cannot be resolved to a backend")]
    UnresolvableIdentity,

    #[error("core slot {0} is already occupied")]
    SlotOccupied(u16),

    #[error("cache core table is full")]
    CacheFull,

    #[error("device is not a known core and attach-only was requested")]
    UnknownDevice,

    #[error("device is already attached to this cache")]
    AlreadyAttached,

    #[error("cache instance does not exist")]
    NoSuchCache,
}

/// Opaque engine failure, passed through unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message} (engine code {code})")]
pub struct EngineError {
    pub code: i32,
    pub message: String,
}

impl EngineError {
    pub const NOT_INITIALIZED: i32 = -1;
    pub const NO_SUCH_CORE: i32 = -2;
    pub const STALE_HANDLE: i32 = -3;
    pub const NO_SUCH_CACHE: i32 = -4;
    pub const CACHE_EXISTS: i32 = -5;
    pub const METADATA: i32 = -6;
    pub const POISONED: i32 = -7;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Attach outcome that is not a success.
#[derive(Debug, Clone, PartialEq)]
pub enum AttachError {
    /// The engine evaluated the request and declined it.
    Rejected(AttachFailure),
    /// The engine itself failed.
    Engine(EngineError),
}

impl From<AttachFailure> for AttachError {
    fn from(reason: AttachFailure) -> Self {
        AttachError::Rejected(reason)
    }
}

impl From<EngineError> for AttachError {
    fn from(e: EngineError) -> Self {
        AttachError::Engine(e)
    }
}

/// Operations the core lifecycle consumes from a cache engine.
///
/// Calls are synchronous: they return after the engine has completed or
/// rejected the operation.
pub trait CacheEngine: Send + Sync {
    /// Attach the configured device as a core of `cache`.
    fn attach_core(
        &self,
        cache: CacheId,
        config: &CoreConfiguration,
    ) -> Result<AttachedCore, AttachError>;

    /// Detach a previously attached core. The persisted record is kept.
    fn detach_core(&self, handle: EngineHandle) -> Result<(), EngineError>;

    /// Whether `handle` still refers to an attached core of a running cache.
    fn is_live(&self, handle: EngineHandle) -> bool;

    /// Allocate an engine IO object against the core.
    fn new_io_request(&self, handle: EngineHandle) -> Result<EngineIoRef, EngineError>;
}
