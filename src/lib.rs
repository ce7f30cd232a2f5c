//! # blockcache-core
//!
//! Attach backing devices to a block cache and build IO against them.
//!
//! A [`Core`] pairs a validated [`CoreConfiguration`] with one cache of a
//! [`CacheEngine`]. Attaching yields a [`CoreHandle`], and every
//! [`IoRequest`] built from that handle stays bound to the core it came from.
//!
//! ## Features
//!
//! | Feature | Description | Default |
//! |:--------|:------------|:-------:|
//! | `compression` | LZ4 compression of metadata snapshots via `lz4_flex` | Yes |
//! | `checksum` | xxHash3-64 integrity check on metadata snapshots | Yes |
//! | `messagepack` | MessagePack snapshot encoding via `rmp-serde` | Yes |
//! | `ffi` | C entry points and header generation | No |
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use blockcache_core::{
//!     AttachPolicy, BackendType, CacheId, Core, CoreConfiguration, DeviceIdentity,
//!     IoDirection, MemoryEngine,
//! };
//!
//! let engine = Arc::new(MemoryEngine::new());
//! engine.initialize().unwrap();
//! engine.start_cache(CacheId(1), 16).unwrap();
//!
//! let device = DeviceIdentity::new("/dev/loop0").unwrap();
//! engine.register_device(BackendType::BLOCK, device.clone()).unwrap();
//!
//! let config = CoreConfiguration::builder(device, BackendType::BLOCK)
//!     .attach_policy(AttachPolicy::AttachOrCreate)
//!     .build()
//!     .unwrap();
//!
//! let mut core = Core::new(engine.clone(), CacheId(1), config);
//! core.attach().unwrap();
//!
//! let mut io = core.new_io().unwrap();
//! io.set_direction(IoDirection::Read).set_range(0, 4096);
//! io.submit(engine.as_ref(), |outcome| assert!(outcome.result.is_ok()))
//!     .unwrap();
//!
//! core.detach().unwrap();
//! ```

pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod identity;
pub mod io;
pub mod layout;
pub mod metadata;
pub mod metrics;

pub use config::{
    AttachPolicy, CACHE_SLOT_UNASSIGNED, CORE_SLOT_AUTO, CoreConfigBuilder, CoreConfiguration,
    DEFAULT_SEQ_CUTOFF_THRESHOLD, MAX_CORE_SLOT, MAX_USER_METADATA_SIZE, UserMetadata,
};
pub use self::core::{Core, CoreHandle, CoreId, CoreState};
pub use engine::{
    AttachError, AttachFailure, AttachedCore, CacheEngine, CacheId, EngineError, EngineHandle,
    EngineIoRef, MemoryEngine,
};
pub use error::CoreError;
pub use identity::{BackendType, DeviceIdentity, IdentityError, MAX_IDENTITY_LEN};
pub use io::{
    IoCompletion, IoContext, IoDirection, IoOutcome, IoRequest, IoTransport, PreparedIo,
    new_io_request,
};
pub use layout::{BorrowedRawConfig, RawCoreConfig, RawIdentity, RawUserMetadata};
pub use metadata::{CoreRecord, CoreTableSnapshot, MetadataEnvelope, MetadataError};
pub use metrics::CoreMetrics;

// C FFI layer (feature-gated)
#[cfg(feature = "ffi")]
pub mod ffi;
#[cfg(feature = "ffi")]
pub use ffi::BlockcacheError;
