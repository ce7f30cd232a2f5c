//! C entry points for core lifecycle and IO requests.
//!
//! Configurations cross the boundary as [`RawCoreConfig`] records; they are
//! copied and validated on entry, so the caller's buffers need only live for
//! the duration of the call.

use crate::core::Core;
use crate::engine::{CacheEngine, CacheId};
use crate::ffi::error::BlockcacheError;
use crate::ffi::handles::{BlockcacheCore, BlockcacheEngine, BlockcacheIo};
use crate::io::{IoDirection, IoOutcome};
use crate::layout::RawCoreConfig;
use std::ffi::c_void;
use std::panic::catch_unwind;
use std::slice;
use std::sync::Arc;

/// Completion callback for `blockcache_io_submit`, called once with the
/// caller's `user_data` and the IO result.
pub type BlockcacheIoCallback = extern "C" fn(user_data: *mut c_void, result: BlockcacheError);

fn write_error(error_out: *mut BlockcacheError, code: BlockcacheError) {
    if !error_out.is_null() {
        // SAFETY: checked for null; caller provides writable memory
        unsafe { *error_out = code };
    }
}

/// Create a core for cache `cache_slot` from a C configuration record.
///
/// # Returns
/// Core handle, or null with `*error_out` set to:
/// - `NullPointer` if `config` is null
/// - `InvalidHandle` if `engine` is not a live engine handle
/// - `InvalidIdentity` / `InvalidConfiguration` if the record is malformed
///
/// # Safety
/// - `config` must point to a valid `RawCoreConfig` whose pointers satisfy
///   the contract of `RawCoreConfig::decode`
/// - `error_out` may be null
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blockcache_core_new(
    engine: *const BlockcacheEngine,
    cache_slot: u16,
    config: *const RawCoreConfig,
    error_out: *mut BlockcacheError,
) -> *mut BlockcacheCore {
    let result = catch_unwind(|| {
        if config.is_null() {
            return Err(BlockcacheError::NullPointer);
        }
        // SAFETY: as_ref validates the handle against the registry
        let engine = unsafe { BlockcacheEngine::as_ref(engine) }
            .ok_or(BlockcacheError::InvalidHandle)?;
        // SAFETY: non-null, caller guarantees a valid record
        let config = unsafe { (*config).decode() }.map_err(BlockcacheError::from)?;

        let engine: Arc<dyn CacheEngine> = engine.clone();
        Ok(BlockcacheCore::into_opaque_ptr(Core::new(
            engine,
            CacheId(cache_slot),
            config,
        )))
    });

    match result {
        Ok(Ok(ptr)) => {
            write_error(error_out, BlockcacheError::Ok);
            ptr
        }
        Ok(Err(code)) => {
            write_error(error_out, code);
            std::ptr::null_mut()
        }
        Err(_) => {
            write_error(error_out, BlockcacheError::Panic);
            std::ptr::null_mut()
        }
    }
}

/// Free a core. An attached core is not detached; detach it first if the
/// cache should see it go.
///
/// # Safety
/// - `core` must not be used after this call. Null and already-freed
///   handles are ignored.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blockcache_core_free(core: *mut BlockcacheCore) {
    let _ = catch_unwind(|| {
        // SAFETY: from_opaque_ptr validates the handle against the registry
        let _ = unsafe { BlockcacheCore::from_opaque_ptr(core) };
    });
}

/// Attach the core. Attaching an attached core succeeds without calling
/// the engine again.
///
/// # Safety
/// - `core` must be a live core handle not used concurrently
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blockcache_core_attach(core: *mut BlockcacheCore) -> BlockcacheError {
    catch_unwind(|| {
        // SAFETY: as_mut validates the handle against the registry
        let Some(core) = (unsafe { BlockcacheCore::as_mut(core) }) else {
            return BlockcacheError::InvalidHandle;
        };
        match core.attach() {
            Ok(_) => BlockcacheError::Ok,
            Err(e) => e.into(),
        }
    })
    .unwrap_or(BlockcacheError::Panic)
}

/// Detach the core.
///
/// # Safety
/// - `core` must be a live core handle not used concurrently
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blockcache_core_detach(core: *mut BlockcacheCore) -> BlockcacheError {
    catch_unwind(|| {
        // SAFETY: as_mut validates the handle against the registry
        let Some(core) = (unsafe { BlockcacheCore::as_mut(core) }) else {
            return BlockcacheError::InvalidHandle;
        };
        match core.detach() {
            Ok(()) => BlockcacheError::Ok,
            Err(e) => e.into(),
        }
    })
    .unwrap_or(BlockcacheError::Panic)
}

/// Copy the core's configuration record into `*out`.
///
/// Pointers in the copied record borrow from the core and stay valid until
/// the core is freed.
///
/// # Safety
/// - `core` must be a live core handle
/// - `out` must point to writable memory for one `RawCoreConfig`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blockcache_core_get_config(
    core: *const BlockcacheCore,
    out: *mut RawCoreConfig,
) -> BlockcacheError {
    catch_unwind(|| {
        if out.is_null() {
            return BlockcacheError::NullPointer;
        }
        // SAFETY: as_ref validates the handle against the registry
        let Some(core) = (unsafe { BlockcacheCore::as_ref(core) }) else {
            return BlockcacheError::InvalidHandle;
        };
        let raw = *core.configuration().to_raw().as_raw();
        // SAFETY: non-null, caller provides writable memory
        unsafe { *out = raw };
        BlockcacheError::Ok
    })
    .unwrap_or(BlockcacheError::Panic)
}

/// Allocate an IO request on an attached core.
///
/// # Returns
/// IO handle, or null with `*error_out` set (`InvalidHandle` if the core is
/// not attached or its cache is gone).
///
/// # Safety
/// - `core` must be a live core handle
/// - `error_out` may be null
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blockcache_core_new_io(
    core: *const BlockcacheCore,
    error_out: *mut BlockcacheError,
) -> *mut BlockcacheIo {
    let result = catch_unwind(|| {
        // SAFETY: as_ref validates the handle against the registry
        let core = unsafe { BlockcacheCore::as_ref(core) }.ok_or(BlockcacheError::InvalidHandle)?;
        core.new_io()
            .map(BlockcacheIo::into_opaque_ptr)
            .map_err(BlockcacheError::from)
    });

    match result {
        Ok(Ok(ptr)) => {
            write_error(error_out, BlockcacheError::Ok);
            ptr
        }
        Ok(Err(code)) => {
            write_error(error_out, code);
            std::ptr::null_mut()
        }
        Err(_) => {
            write_error(error_out, BlockcacheError::Panic);
            std::ptr::null_mut()
        }
    }
}

/// Set direction (0 = read, 1 = write) and byte range of an IO request.
///
/// # Safety
/// - `io` must be a live IO handle not used concurrently
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blockcache_io_configure(
    io: *mut BlockcacheIo,
    direction: u8,
    offset: u64,
    length: u32,
) -> BlockcacheError {
    catch_unwind(|| {
        let direction = match direction {
            0 => IoDirection::Read,
            1 => IoDirection::Write,
            _ => return BlockcacheError::InvalidInput,
        };
        // SAFETY: as_mut validates the handle against the registry
        let Some(io) = (unsafe { BlockcacheIo::as_mut(io) }) else {
            return BlockcacheError::InvalidHandle;
        };
        io.set_direction(direction).set_range(offset, length);
        BlockcacheError::Ok
    })
    .unwrap_or(BlockcacheError::Panic)
}

/// Caller-side state carried into the completion.
struct CallerCompletion {
    buffer: *mut u8,
    buffer_len: usize,
    read: bool,
    callback: Option<BlockcacheIoCallback>,
    user_data: *mut c_void,
}

// SAFETY: the caller keeps `buffer` and `user_data` valid and unaliased until
// the callback has run, whichever thread completes the IO
unsafe impl Send for CallerCompletion {}

impl CallerCompletion {
    fn complete(self, outcome: IoOutcome) {
        let code = match outcome.result {
            Ok(()) => BlockcacheError::Ok,
            Err(e) => e.into(),
        };
        if code == BlockcacheError::Ok && self.read && !self.buffer.is_null() {
            let n = self.buffer_len.min(outcome.data.len());
            // SAFETY: caller guarantees `buffer_len` writable bytes at `buffer`
            unsafe { std::ptr::copy_nonoverlapping(outcome.data.as_ptr(), self.buffer, n) };
        }
        if let Some(callback) = self.callback {
            callback(self.user_data, code);
        }
    }
}

/// Submit a configured IO request through `engine`.
///
/// Writes send the `buffer_len` bytes at `buffer`, which must equal the
/// request length. Reads copy the result into `buffer` before `callback`
/// runs; `buffer` may be null to discard it.
///
/// The request handle is consumed by every call that gets past handle
/// validation, including ones that fail with `IncompleteRequest` or
/// `InvalidHandle` from a detached core. `callback` runs only when the call
/// returns `Ok`.
///
/// # Safety
/// - `engine` and `io` must be live handles, `io` not used concurrently
/// - `buffer` must be null or point to `buffer_len` bytes that stay valid
///   until `callback` runs (readable for writes, writable for reads)
/// - `user_data` is passed to `callback` untouched
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blockcache_io_submit(
    engine: *const BlockcacheEngine,
    io: *mut BlockcacheIo,
    buffer: *mut u8,
    buffer_len: usize,
    callback: Option<BlockcacheIoCallback>,
    user_data: *mut c_void,
) -> BlockcacheError {
    catch_unwind(|| {
        // SAFETY: as_ref validates the handle against the registry
        let Some(engine) = (unsafe { BlockcacheEngine::as_ref(engine) }) else {
            return BlockcacheError::InvalidHandle;
        };
        // SAFETY: from_opaque_ptr validates the handle against the registry
        let Some(mut request) = (unsafe { BlockcacheIo::from_opaque_ptr(io) }) else {
            return BlockcacheError::InvalidHandle;
        };

        let read = request.direction() == Some(IoDirection::Read);
        if !buffer.is_null() {
            if read {
                if request.length().is_some_and(|len| buffer_len < len as usize) {
                    return BlockcacheError::InvalidInput;
                }
            } else {
                // SAFETY: caller guarantees `buffer_len` readable bytes
                let data = unsafe { slice::from_raw_parts(buffer, buffer_len) };
                request.set_data(data.to_vec());
            }
        }

        let completion = CallerCompletion {
            buffer,
            buffer_len,
            read,
            callback,
            user_data,
        };
        match request.submit(&**engine, move |outcome| completion.complete(outcome)) {
            Ok(()) => BlockcacheError::Ok,
            Err(e) => e.into(),
        }
    })
    .unwrap_or(BlockcacheError::Panic)
}

/// Free an IO request that will not be submitted.
///
/// # Safety
/// - `io` must not be used after this call. Null and already-freed handles
///   are ignored.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blockcache_io_free(io: *mut BlockcacheIo) {
    let _ = catch_unwind(|| {
        // SAFETY: from_opaque_ptr validates the handle against the registry
        let _ = unsafe { BlockcacheIo::from_opaque_ptr(io) };
    });
}
