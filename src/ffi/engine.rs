//! C entry points for the in-memory cache engine.
//!
//! Every function is wrapped in `catch_unwind`, checks its pointers before
//! use and reports failures through `BlockcacheError`.

use crate::engine::{CacheId, MemoryEngine};
use crate::ffi::error::BlockcacheError;
use crate::ffi::handles::BlockcacheEngine;
use crate::identity::{BackendType, DeviceIdentity};
use crate::layout::RawIdentity;
use std::panic::catch_unwind;
use std::slice;
use std::sync::Arc;

/// Create an engine. It starts uninitialized; call
/// `blockcache_engine_initialize` before starting caches.
///
/// Returns null only if a panic was caught. Free with
/// `blockcache_engine_free`.
#[unsafe(no_mangle)]
pub extern "C" fn blockcache_engine_new() -> *mut BlockcacheEngine {
    catch_unwind(|| BlockcacheEngine::into_opaque_ptr(Arc::new(MemoryEngine::new())))
        .unwrap_or(std::ptr::null_mut())
}

/// Free an engine handle. Cores created from it keep working.
///
/// # Safety
/// - `handle` must come from `blockcache_engine_new` and not be used after
///   this call. Null and already-freed handles are ignored.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blockcache_engine_free(handle: *mut BlockcacheEngine) {
    let _ = catch_unwind(|| {
        // SAFETY: from_opaque_ptr validates the handle against the registry
        let _ = unsafe { BlockcacheEngine::from_opaque_ptr(handle) };
    });
}

/// Bring the engine up. Calling it on a running engine is a no-op.
///
/// # Safety
/// - `handle` must be a live engine handle
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blockcache_engine_initialize(
    handle: *const BlockcacheEngine,
) -> BlockcacheError {
    catch_unwind(|| {
        // SAFETY: as_ref validates the handle against the registry
        let Some(engine) = (unsafe { BlockcacheEngine::as_ref(handle) }) else {
            return BlockcacheError::InvalidHandle;
        };
        match engine.initialize() {
            Ok(_) => BlockcacheError::Ok,
            Err(e) => e.into(),
        }
    })
    .unwrap_or(BlockcacheError::Panic)
}

/// Stop every cache and invalidate every core handle. Calling it on a
/// stopped engine is a no-op.
///
/// # Safety
/// - `handle` must be a live engine handle
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blockcache_engine_shutdown(
    handle: *const BlockcacheEngine,
) -> BlockcacheError {
    catch_unwind(|| {
        // SAFETY: as_ref validates the handle against the registry
        let Some(engine) = (unsafe { BlockcacheEngine::as_ref(handle) }) else {
            return BlockcacheError::InvalidHandle;
        };
        match engine.shutdown() {
            Ok(_) => BlockcacheError::Ok,
            Err(e) => e.into(),
        }
    })
    .unwrap_or(BlockcacheError::Panic)
}

/// Start cache `cache_slot` with room for `capacity` cores.
///
/// # Safety
/// - `handle` must be a live engine handle
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blockcache_engine_start_cache(
    handle: *const BlockcacheEngine,
    cache_slot: u16,
    capacity: usize,
) -> BlockcacheError {
    catch_unwind(|| {
        // SAFETY: as_ref validates the handle against the registry
        let Some(engine) = (unsafe { BlockcacheEngine::as_ref(handle) }) else {
            return BlockcacheError::InvalidHandle;
        };
        match engine.start_cache(CacheId(cache_slot), capacity) {
            Ok(()) => BlockcacheError::Ok,
            Err(e) => e.into(),
        }
    })
    .unwrap_or(BlockcacheError::Panic)
}

/// Stop cache `cache_slot`; handles onto its cores become invalid.
///
/// # Safety
/// - `handle` must be a live engine handle
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blockcache_engine_stop_cache(
    handle: *const BlockcacheEngine,
    cache_slot: u16,
) -> BlockcacheError {
    catch_unwind(|| {
        // SAFETY: as_ref validates the handle against the registry
        let Some(engine) = (unsafe { BlockcacheEngine::as_ref(handle) }) else {
            return BlockcacheError::InvalidHandle;
        };
        match engine.stop_cache(CacheId(cache_slot)) {
            Ok(()) => BlockcacheError::Ok,
            Err(e) => e.into(),
        }
    })
    .unwrap_or(BlockcacheError::Panic)
}

/// Make a device resolvable through backend type `backend_type`.
///
/// # Safety
/// - `handle` must be a live engine handle
/// - `identity.data` must point to `identity.size` readable bytes, the last
///   of which is the NUL terminator
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blockcache_engine_register_device(
    handle: *const BlockcacheEngine,
    backend_type: u8,
    identity: RawIdentity,
) -> BlockcacheError {
    catch_unwind(|| {
        if identity.data.is_null() {
            return BlockcacheError::NullPointer;
        }
        // SAFETY: as_ref validates the handle against the registry
        let Some(engine) = (unsafe { BlockcacheEngine::as_ref(handle) }) else {
            return BlockcacheError::InvalidHandle;
        };
        // SAFETY: caller guarantees `size` readable bytes at `data`
        let encoded = unsafe { slice::from_raw_parts(identity.data.cast::<u8>(), identity.size) };
        let identity = match DeviceIdentity::from_raw(encoded, identity.size) {
            Ok(identity) => identity,
            Err(_) => return BlockcacheError::InvalidIdentity,
        };
        match engine.register_device(BackendType(backend_type), identity) {
            Ok(()) => BlockcacheError::Ok,
            Err(e) => e.into(),
        }
    })
    .unwrap_or(BlockcacheError::Panic)
}
