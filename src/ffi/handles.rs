//! Opaque FFI handle types
//!
//! C callers only ever see pointers to these zero-sized types. Every live
//! pointer is recorded in a per-type registry so that double frees and use
//! after free come back as `BlockcacheError::InvalidHandle` instead of
//! undefined behavior.

use crate::core::Core;
use crate::engine::MemoryEngine;
use crate::io::IoRequest;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock, Mutex};

/// Live `BlockcacheEngine` pointers. An engine outlives this entry when
/// cores still hold its `Arc`.
static ENGINE_HANDLES: LazyLock<Mutex<HashSet<usize>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Live `BlockcacheCore` pointers. Removing one drops the `Core` without
/// detaching it.
static CORE_HANDLES: LazyLock<Mutex<HashSet<usize>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Live `BlockcacheIo` pointers. Submission and `blockcache_io_free` both
/// remove the entry, so a request reaches the engine at most once.
static IO_HANDLES: LazyLock<Mutex<HashSet<usize>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Generates an opaque FFI handle type with validity tracking.
///
/// Produces a `#[repr(C)]` zero-sized struct plus `into_opaque_ptr`,
/// `from_opaque_ptr`, `is_valid`, `as_ref` and `as_mut`.
macro_rules! opaque_handle {
    (
        $(#[$meta:meta])*
        $handle:ident,
        $inner:ty,
        $registry:ident
    ) => {
        $(#[$meta])*
        #[repr(C)]
        pub struct $handle {
            _private: [u8; 0],
        }

        #[allow(dead_code)]
        impl $handle {
            /// Box `inner` and register the resulting pointer.
            pub(crate) fn into_opaque_ptr(inner: $inner) -> *mut Self {
                let ptr = Box::into_raw(Box::new(inner)) as *mut Self;
                if let Ok(mut handles) = $registry.lock() {
                    handles.insert(ptr as usize);
                }
                ptr
            }

            /// Unregister and unbox. `None` for null, freed or foreign pointers.
            ///
            /// # Safety
            /// On `Some`, the pointer is consumed and must not be used again.
            pub(crate) unsafe fn from_opaque_ptr(ptr: *mut Self) -> Option<$inner> {
                if ptr.is_null() {
                    return None;
                }
                let registered = $registry
                    .lock()
                    .map(|mut handles| handles.remove(&(ptr as usize)))
                    .unwrap_or(false);
                if !registered {
                    return None;
                }
                // SAFETY: registered pointers come from into_opaque_ptr
                Some(unsafe { *Box::from_raw(ptr as *mut $inner) })
            }

            pub(crate) fn is_valid(ptr: *const Self) -> bool {
                if ptr.is_null() {
                    return false;
                }
                $registry
                    .lock()
                    .map(|handles| handles.contains(&(ptr as usize)))
                    .unwrap_or(false)
            }

            /// # Safety
            /// The pointer must stay registered for the lifetime of the reference.
            pub(crate) unsafe fn as_ref<'a>(ptr: *const Self) -> Option<&'a $inner> {
                if !Self::is_valid(ptr) {
                    return None;
                }
                // SAFETY: registered, so valid and aligned
                Some(unsafe { &*(ptr as *const $inner) })
            }

            /// # Safety
            /// The pointer must stay registered for the lifetime of the
            /// reference, and no other reference to it may exist.
            pub(crate) unsafe fn as_mut<'a>(ptr: *mut Self) -> Option<&'a mut $inner> {
                if !Self::is_valid(ptr) {
                    return None;
                }
                // SAFETY: registered, so valid, aligned and exclusively accessed
                Some(unsafe { &mut *(ptr as *mut $inner) })
            }
        }
    };
}

opaque_handle!(
    /// Opaque handle for an in-memory cache engine.
    ///
    /// Create with `blockcache_engine_new`, free with `blockcache_engine_free`.
    /// Cores created from it keep the engine alive after it is freed.
    BlockcacheEngine,
    Arc<MemoryEngine>,
    ENGINE_HANDLES
);

opaque_handle!(
    /// Opaque handle for a core and its lifecycle.
    ///
    /// Create with `blockcache_core_new`, free with `blockcache_core_free`.
    BlockcacheCore,
    Core,
    CORE_HANDLES
);

opaque_handle!(
    /// Opaque handle for an IO request bound to a core.
    ///
    /// Create with `blockcache_core_new_io`. Consumed by `blockcache_io_submit`;
    /// free unsubmitted requests with `blockcache_io_free`.
    BlockcacheIo,
    IoRequest,
    IO_HANDLES
);
