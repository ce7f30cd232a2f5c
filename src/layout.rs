//! Fixed-layout core configuration record for the engine boundary.
//!
//! [`RawCoreConfig`] is the C-compatible shape of a [`CoreConfiguration`].
//! Field order and widths are fixed and every padding byte is an explicit
//! field, so the layout does not depend on compiler padding choices:
//!
//! ```text
//! offset  width  field
//!      0      8  identity.data      (NUL-terminated bytes)
//!      8      8  identity.size      (terminator included)
//!     16      1  backend_type
//!     17      1  _pad0
//!     18      2  core_slot
//!     20      4  _pad1              (64-bit targets only)
//!     24      8  name               (nullable C string)
//!     32      2  cache_slot
//!     34      1  try_add
//!     35      1  _pad2
//!     36      4  seq_cutoff_threshold
//!     40      8  user_metadata.data
//!     48      8  user_metadata.size
//! ```
//!
//! Offsets are for 64-bit targets and are checked at compile time.

use crate::config::{AttachPolicy, CoreConfigBuilder, CoreConfiguration};
use crate::error::CoreError;
use crate::identity::{BackendType, DeviceIdentity, IdentityError};
use std::ffi::{CStr, c_char, c_void};
use std::marker::PhantomData;
use std::slice;

/// Identity as seen by the engine: pointer to NUL-terminated bytes plus size.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawIdentity {
    pub data: *const c_char,
    pub size: usize,
}

/// User metadata as seen by the engine.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawUserMetadata {
    pub data: *const c_void,
    pub size: usize,
}

/// C layout of a core configuration.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawCoreConfig {
    pub identity: RawIdentity,
    pub backend_type: u8,
    pub _pad0: u8,
    pub core_slot: u16,
    #[cfg(target_pointer_width = "64")]
    pub _pad1: [u8; 4],
    pub name: *const c_char,
    pub cache_slot: u16,
    pub try_add: u8,
    pub _pad2: u8,
    pub seq_cutoff_threshold: u32,
    pub user_metadata: RawUserMetadata,
}

#[cfg(target_pointer_width = "64")]
const _: () = {
    use std::mem::{align_of, offset_of, size_of};
    assert!(offset_of!(RawCoreConfig, identity) == 0);
    assert!(offset_of!(RawCoreConfig, backend_type) == 16);
    assert!(offset_of!(RawCoreConfig, core_slot) == 18);
    assert!(offset_of!(RawCoreConfig, name) == 24);
    assert!(offset_of!(RawCoreConfig, cache_slot) == 32);
    assert!(offset_of!(RawCoreConfig, try_add) == 34);
    assert!(offset_of!(RawCoreConfig, seq_cutoff_threshold) == 36);
    assert!(offset_of!(RawCoreConfig, user_metadata) == 40);
    assert!(size_of::<RawCoreConfig>() == 56);
    assert!(align_of::<RawCoreConfig>() == 8);
};

/// A [`RawCoreConfig`] whose pointers borrow from a live configuration.
#[derive(Debug, Clone, Copy)]
pub struct BorrowedRawConfig<'a> {
    raw: RawCoreConfig,
    _config: PhantomData<&'a CoreConfiguration>,
}

impl BorrowedRawConfig<'_> {
    pub fn as_raw(&self) -> &RawCoreConfig {
        &self.raw
    }

    pub fn as_ptr(&self) -> *const RawCoreConfig {
        &self.raw
    }
}

impl CoreConfiguration {
    /// Marshal into the engine layout. The result is only valid while
    /// `self` is borrowed.
    pub fn to_raw(&self) -> BorrowedRawConfig<'_> {
        let metadata = self.user_metadata();
        let raw = RawCoreConfig {
            identity: RawIdentity {
                data: self.identity().as_ptr().cast(),
                size: self.identity().len(),
            },
            backend_type: self.backend_type().as_u8(),
            _pad0: 0,
            core_slot: self.core_slot(),
            #[cfg(target_pointer_width = "64")]
            _pad1: [0; 4],
            name: self
                .name_cstr()
                .map_or(std::ptr::null(), |name| name.as_ptr()),
            cache_slot: self.cache_slot(),
            try_add: self.attach_policy().as_flag() as u8,
            _pad2: 0,
            seq_cutoff_threshold: self.seq_cutoff_threshold(),
            user_metadata: RawUserMetadata {
                data: if metadata.is_empty() {
                    std::ptr::null()
                } else {
                    metadata.as_bytes().as_ptr().cast()
                },
                size: metadata.len(),
            },
        };

        BorrowedRawConfig {
            raw,
            _config: PhantomData,
        }
    }
}

impl RawCoreConfig {
    /// Copy a C-supplied record into an owned, validated configuration.
    ///
    /// The engine-populated `cache_slot` is ignored; a fresh configuration
    /// always starts unassigned.
    ///
    /// # Safety
    /// - `identity.data` must point to `identity.size` readable bytes
    /// - `name` must be null or a valid NUL-terminated string
    /// - `user_metadata.data` must be null or point to `user_metadata.size`
    ///   readable bytes
    pub unsafe fn decode(&self) -> Result<CoreConfiguration, CoreError> {
        if self.identity.data.is_null() || self.identity.size == 0 {
            return Err(CoreError::InvalidIdentity(IdentityError::Empty));
        }
        // SAFETY: caller guarantees `size` readable bytes at `data`
        let encoded =
            unsafe { slice::from_raw_parts(self.identity.data.cast::<u8>(), self.identity.size) };
        let identity = DeviceIdentity::from_raw(encoded, self.identity.size)?;

        let mut builder = CoreConfigBuilder::new(identity, BackendType(self.backend_type))
            .core_slot(self.core_slot)
            .attach_policy(AttachPolicy::from_flag(self.try_add != 0))
            .seq_cutoff_threshold(self.seq_cutoff_threshold);

        if !self.name.is_null() {
            // SAFETY: caller guarantees a valid C string
            let name = unsafe { CStr::from_ptr(self.name) };
            let name = name.to_str().map_err(|_| {
                CoreError::InvalidConfiguration("core name is not valid UTF-8".to_string())
            })?;
            builder = builder.name(name);
        }

        if !self.user_metadata.data.is_null() && self.user_metadata.size > 0 {
            // SAFETY: caller guarantees `size` readable bytes at `data`
            let blob = unsafe {
                slice::from_raw_parts(
                    self.user_metadata.data.cast::<u8>(),
                    self.user_metadata.size,
                )
            };
            builder = builder.user_metadata(blob);
        }

        builder.build()
    }
}
