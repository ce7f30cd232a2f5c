//! FFI error codes for the C boundary.

use crate::engine::AttachFailure;
use crate::error::CoreError;

/// C-compatible error codes
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockcacheError {
    /// Operation succeeded
    Ok = 0,
    /// Invalid input provided
    InvalidInput = 1,
    /// Null pointer provided
    NullPointer = 2,
    /// Invalid, freed or stale handle
    InvalidHandle = 3,
    /// Malformed device identity
    InvalidIdentity = 4,
    /// Configuration failed validation
    InvalidConfiguration = 5,
    /// Core is not attached
    NotAttached = 6,
    /// Core was detached and cannot attach again
    Consumed = 7,
    /// Device identity does not resolve to a backend
    AttachUnresolvable = 8,
    /// Requested core slot is taken
    AttachSlotOccupied = 9,
    /// Cache core table is full
    AttachCacheFull = 10,
    /// Attach-only requested for an unknown device
    AttachUnknownDevice = 11,
    /// Device already attached to the cache
    AttachAlreadyAttached = 12,
    /// Target cache is not running
    AttachNoSuchCache = 13,
    /// Engine reported a failure
    EngineFailure = 14,
    /// IO request missing direction or range
    IncompleteRequest = 15,
    /// A panic was caught at the boundary
    Panic = 16,
}

impl From<AttachFailure> for BlockcacheError {
    fn from(reason: AttachFailure) -> Self {
        match reason {
            AttachFailure::UnresolvableIdentity => BlockcacheError::AttachUnresolvable,
            AttachFailure::SlotOccupied(_) => BlockcacheError::AttachSlotOccupied,
            AttachFailure::CacheFull => BlockcacheError::AttachCacheFull,
            AttachFailure::UnknownDevice => BlockcacheError::AttachUnknownDevice,
            AttachFailure::AlreadyAttached => BlockcacheError::AttachAlreadyAttached,
            AttachFailure::NoSuchCache => BlockcacheError::AttachNoSuchCache,
        }
    }
}

impl From<CoreError> for BlockcacheError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidIdentity(_) => BlockcacheError::InvalidIdentity,
            CoreError::InvalidConfiguration(_) => BlockcacheError::InvalidConfiguration,
            CoreError::AttachFailed { reason } => reason.into(),
            CoreError::NotAttached => BlockcacheError::NotAttached,
            CoreError::Consumed => BlockcacheError::Consumed,
            CoreError::InvalidHandle => BlockcacheError::InvalidHandle,
            CoreError::IncompleteRequest(_) => BlockcacheError::IncompleteRequest,
            CoreError::Engine(_) => BlockcacheError::EngineFailure,
        }
    }
}

impl From<crate::engine::EngineError> for BlockcacheError {
    fn from(_: crate::engine::EngineError) -> Self {
        BlockcacheError::EngineFailure
    }
}
