//! Error types for configuration, lifecycle and IO construction.

use crate::engine::{AttachFailure, EngineError};
use crate::identity::IdentityError;
use thiserror::Error;

/// Errors surfaced by the core lifecycle and IO factory.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("invalid device identity: {0}")]
    InvalidIdentity(#[from] IdentityError),

    #[error("invalid core configuration: {0}")]
    InvalidConfiguration(String),

    #[error("attach failed: {reason}")]
    AttachFailed { reason: AttachFailure },

    #[error("core is not attached")]
    NotAttached,

    #[error("core was detached; build a new core to attach again")]
    Consumed,

    #[error("core handle is no longer live")]
    InvalidHandle,

    #[error("io request is incomplete: {0} not set")]
    IncompleteRequest(&'static str),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

impl CoreError {
    /// Whether retrying with different parameters can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CoreError::AttachFailed { .. } | CoreError::Engine(_))
    }
}
