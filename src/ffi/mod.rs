//! C FFI layer for blockcache-core
//!
//! Exposes the in-memory engine, core lifecycle and IO request submission to
//! C callers. Objects cross the boundary as registry-checked opaque handles
//! and every entry point is panic-safe.

pub mod core;
pub mod engine;
pub mod error;
pub mod handles;

pub use error::BlockcacheError;
pub use handles::*;

pub use self::core::{
    BlockcacheIoCallback, blockcache_core_attach, blockcache_core_detach, blockcache_core_free,
    blockcache_core_get_config, blockcache_core_new, blockcache_core_new_io,
    blockcache_io_configure, blockcache_io_free, blockcache_io_submit,
};
pub use engine::{
    blockcache_engine_free, blockcache_engine_initialize, blockcache_engine_new,
    blockcache_engine_register_device, blockcache_engine_shutdown, blockcache_engine_start_cache,
    blockcache_engine_stop_cache,
};
