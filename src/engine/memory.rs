//! In-process cache engine.
//!
//! Implements the [`CacheEngine`] contract over plain tables: caches with a
//! bounded core table, a registry of resolvable devices, and one persisted
//! [`CoreRecord`] per core the cache knows. It never stores block data; IO
//! handed to it through [`IoTransport`] completes immediately.
//!
//! The engine must be brought up explicitly with [`MemoryEngine::initialize`]
//! and can be torn down with [`MemoryEngine::shutdown`]. Both calls are
//! idempotent and report whether they changed anything.

use super::{
    AttachError, AttachFailure, AttachedCore, CacheEngine, CacheId, EngineError, EngineHandle,
    EngineIoRef,
};
use crate::config::{AttachPolicy, CoreConfiguration, MAX_CORE_SLOT};
use crate::identity::{BackendType, DeviceIdentity};
use crate::io::{IoOutcome, IoTransport, PreparedIo};
use crate::metadata::CoreRecord;
#[cfg(all(feature = "compression", feature = "checksum", feature = "messagepack"))]
use crate::metadata::{CoreTableSnapshot, MetadataError};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::num::NonZeroU64;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Default number of cores a cache accepts.
pub const DEFAULT_CORE_CAPACITY: usize = 64;

#[derive(Debug)]
struct SlotEntry {
    record: CoreRecord,
    handle: Option<EngineHandle>,
}

#[derive(Debug)]
struct CacheTable {
    capacity: usize,
    cores: BTreeMap<u16, SlotEntry>,
}

impl CacheTable {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            cores: BTreeMap::new(),
        }
    }

    fn find_by_identity(&self, identity: &DeviceIdentity) -> Option<u16> {
        self.cores
            .iter()
            .find(|(_, entry)| &entry.record.identity == identity)
            .map(|(slot, _)| *slot)
    }

    fn first_free_slot(&self) -> Option<u16> {
        (0..=MAX_CORE_SLOT).find(|slot| !self.cores.contains_key(slot))
    }
}

#[derive(Debug, Default)]
struct EngineState {
    initialized: bool,
    caches: HashMap<CacheId, CacheTable>,
    devices: HashSet<(BackendType, DeviceIdentity)>,
    handles: HashMap<EngineHandle, (CacheId, u16)>,
    next_handle: u64,
    next_io: u64,
    attach_calls: u64,
    detach_calls: u64,
    io_allocated: u64,
    io_submitted: u64,
}

impl EngineState {
    fn require_initialized(&self) -> Result<(), EngineError> {
        if self.initialized {
            Ok(())
        } else {
            Err(EngineError::new(
                EngineError::NOT_INITIALIZED,
                "engine is not initialized",
            ))
        }
    }

    fn drop_cache_handles(&mut self, cache: CacheId) -> usize {
        let before = self.handles.len();
        self.handles.retain(|_, (owner, _)| *owner != cache);
        before - self.handles.len()
    }
}

/// In-memory implementation of the cache engine boundary.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    state: Mutex<EngineState>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngineState>, EngineError> {
        self.state
            .lock()
            .map_err(|_| EngineError::new(EngineError::POISONED, "engine state lock poisoned"))
    }

    /// Bring the engine up. Returns `false` if it was already running.
    pub fn initialize(&self) -> Result<bool, EngineError> {
        let mut state = self.lock()?;
        if state.initialized {
            return Ok(false);
        }
        state.initialized = true;
        info!("cache engine initialized");
        Ok(true)
    }

    /// Tear the engine down, stopping every cache and invalidating every
    /// handle. Returns `false` if it was not running.
    pub fn shutdown(&self) -> Result<bool, EngineError> {
        let mut state = self.lock()?;
        if !state.initialized {
            return Ok(false);
        }
        state.initialized = false;
        state.caches.clear();
        state.handles.clear();
        info!("cache engine shut down");
        Ok(true)
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().map(|s| s.initialized).unwrap_or(false)
    }

    /// Start an empty cache instance with room for `capacity` cores.
    pub fn start_cache(&self, cache: CacheId, capacity: usize) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        state.require_initialized()?;
        if state.caches.contains_key(&cache) {
            return Err(EngineError::new(
                EngineError::CACHE_EXISTS,
                format!("{cache} is already running"),
            ));
        }
        state.caches.insert(cache, CacheTable::new(capacity));
        info!(%cache, capacity, "cache started");
        Ok(())
    }

    /// Stop a cache. Every handle onto its cores becomes invalid and its
    /// records are discarded unless saved beforehand.
    pub fn stop_cache(&self, cache: CacheId) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        state.require_initialized()?;
        if state.caches.remove(&cache).is_none() {
            return Err(EngineError::new(
                EngineError::NO_SUCH_CACHE,
                format!("{cache} is not running"),
            ));
        }
        let invalidated = state.drop_cache_handles(cache);
        info!(%cache, invalidated, "cache stopped");
        Ok(())
    }

    /// Make `identity` resolvable through the `backend` data-object type.
    pub fn register_device(
        &self,
        backend: BackendType,
        identity: DeviceIdentity,
    ) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        debug!(%backend, device = %identity, "registered device");
        state.devices.insert((backend, identity));
        Ok(())
    }

    /// Number of records (attached or not) in a cache's core table.
    pub fn core_count(&self, cache: CacheId) -> usize {
        self.lock()
            .ok()
            .and_then(|s| s.caches.get(&cache).map(|t| t.cores.len()))
            .unwrap_or(0)
    }

    /// Number of currently attached cores in a cache.
    pub fn attached_count(&self, cache: CacheId) -> usize {
        self.lock()
            .ok()
            .and_then(|s| {
                s.caches
                    .get(&cache)
                    .map(|t| t.cores.values().filter(|e| e.handle.is_some()).count())
            })
            .unwrap_or(0)
    }

    /// Persisted record for `slot`, if any.
    pub fn core_record(&self, cache: CacheId, slot: u16) -> Option<CoreRecord> {
        self.lock()
            .ok()
            .and_then(|s| {
                s.caches
                    .get(&cache)
                    .and_then(|t| t.cores.get(&slot))
                    .map(|e| e.record.clone())
            })
    }

    /// Total `attach_core` invocations, including rejected ones.
    pub fn attach_calls(&self) -> u64 {
        self.lock().map(|s| s.attach_calls).unwrap_or(0)
    }

    /// Total `detach_core` invocations.
    pub fn detach_calls(&self) -> u64 {
        self.lock().map(|s| s.detach_calls).unwrap_or(0)
    }

    /// IO objects allocated and IO requests submitted so far.
    pub fn io_counts(&self) -> (u64, u64) {
        self.lock()
            .map(|s| (s.io_allocated, s.io_submitted))
            .unwrap_or((0, 0))
    }

    /// Snapshot the core table of a running cache.
    #[cfg(all(feature = "compression", feature = "checksum", feature = "messagepack"))]
    pub fn save_metadata(&self, cache: CacheId) -> Result<Vec<u8>, EngineError> {
        let state = self.lock()?;
        state.require_initialized()?;
        let table = state.caches.get(&cache).ok_or_else(|| {
            EngineError::new(EngineError::NO_SUCH_CACHE, format!("{cache} is not running"))
        })?;

        let snapshot = CoreTableSnapshot {
            cache,
            records: table.cores.values().map(|e| e.record.clone()).collect(),
        };
        let bytes = snapshot.encode()?;
        debug!(%cache, records = snapshot.records.len(), bytes = bytes.len(), "saved core table");
        Ok(bytes)
    }

    /// Start `cache` from a saved snapshot. Loaded cores are known but
    /// detached, so attach-only requests for them succeed.
    #[cfg(all(feature = "compression", feature = "checksum", feature = "messagepack"))]
    pub fn load_cache(
        &self,
        cache: CacheId,
        capacity: usize,
        bytes: &[u8],
    ) -> Result<usize, EngineError> {
        let snapshot = CoreTableSnapshot::decode(bytes)?;

        let mut state = self.lock()?;
        state.require_initialized()?;
        if state.caches.contains_key(&cache) {
            return Err(EngineError::new(
                EngineError::CACHE_EXISTS,
                format!("{cache} is already running"),
            ));
        }
        if snapshot.records.len() > capacity {
            return Err(EngineError::new(
                EngineError::METADATA,
                format!(
                    "snapshot holds {} cores, capacity is {capacity}",
                    snapshot.records.len()
                ),
            ));
        }
        if snapshot.cache != cache {
            warn!(saved = %snapshot.cache, %cache, "loading core table saved for another cache");
        }

        let mut table = CacheTable::new(capacity);
        for record in snapshot.records {
            let slot = record.core_slot;
            if table.cores.insert(slot, SlotEntry { record, handle: None }).is_some() {
                return Err(EngineError::new(
                    EngineError::METADATA,
                    format!("snapshot lists core slot {slot} twice"),
                ));
            }
        }
        let loaded = table.cores.len();
        state.caches.insert(cache, table);
        info!(%cache, loaded, "cache loaded from metadata");
        Ok(loaded)
    }
}

#[cfg(all(feature = "compression", feature = "checksum", feature = "messagepack"))]
impl From<MetadataError> for EngineError {
    fn from(e: MetadataError) -> Self {
        EngineError::new(EngineError::METADATA, e.to_string())
    }
}

impl CacheEngine for MemoryEngine {
    fn attach_core(
        &self,
        cache: CacheId,
        config: &CoreConfiguration,
    ) -> Result<AttachedCore, AttachError> {
        let mut state = self.lock()?;
        state.attach_calls += 1;
        state.require_initialized()?;

        let key = (config.backend_type(), config.identity().clone());
        if !state.devices.contains(&key) {
            return Err(AttachFailure::UnresolvableIdentity.into());
        }

        let state = &mut *state;
        let table = state
            .caches
            .get_mut(&cache)
            .ok_or(AttachFailure::NoSuchCache)?;

        let slot = match table.find_by_identity(config.identity()) {
            Some(known) => {
                let entry = table.cores.get(&known);
                if entry.is_some_and(|e| e.handle.is_some()) {
                    return Err(AttachFailure::AlreadyAttached.into());
                }
                // A known core resolves only through the backend it was created with
                if entry.is_some_and(|e| e.record.backend_type != config.backend_type()) {
                    return Err(AttachFailure::UnresolvableIdentity.into());
                }
                let target = if config.is_auto_slot() {
                    known
                } else {
                    config.core_slot()
                };
                if target != known {
                    if table.cores.contains_key(&target) {
                        return Err(AttachFailure::SlotOccupied(target).into());
                    }
                    if let Some(mut entry) = table.cores.remove(&known) {
                        entry.record.core_slot = target;
                        table.cores.insert(target, entry);
                    }
                }
                if let Some(entry) = table.cores.get_mut(&target) {
                    entry.record.name = config.name().map(str::to_owned);
                    entry.record.seq_cutoff_threshold = config.seq_cutoff_threshold();
                    if !config.user_metadata().is_empty() {
                        entry.record.user_metadata = config.user_metadata().clone();
                    }
                }
                target
            }
            None => {
                if config.attach_policy() == AttachPolicy::AttachOnly {
                    return Err(AttachFailure::UnknownDevice.into());
                }
                if !config.is_auto_slot() && table.cores.contains_key(&config.core_slot()) {
                    return Err(AttachFailure::SlotOccupied(config.core_slot()).into());
                }
                if table.cores.len() >= table.capacity {
                    return Err(AttachFailure::CacheFull.into());
                }
                let slot = if config.is_auto_slot() {
                    table.first_free_slot().ok_or(AttachFailure::CacheFull)?
                } else {
                    config.core_slot()
                };
                let record = CoreRecord {
                    identity: config.identity().clone(),
                    backend_type: config.backend_type(),
                    core_slot: slot,
                    name: config.name().map(str::to_owned),
                    seq_cutoff_threshold: config.seq_cutoff_threshold(),
                    user_metadata: config.user_metadata().clone(),
                };
                table.cores.insert(slot, SlotEntry { record, handle: None });
                debug!(%cache, slot, device = %config.identity(), "created core record");
                slot
            }
        };

        state.next_handle += 1;
        let handle = EngineHandle::from_raw(
            NonZeroU64::new(state.next_handle).unwrap_or(NonZeroU64::MIN),
        );
        if let Some(entry) = table.cores.get_mut(&slot) {
            entry.handle = Some(handle);
        }
        state.handles.insert(handle, (cache, slot));

        Ok(AttachedCore {
            handle,
            cache_slot: cache.0,
            core_slot: slot,
        })
    }

    fn detach_core(&self, handle: EngineHandle) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        state.detach_calls += 1;
        state.require_initialized()?;

        let (cache, slot) = state.handles.remove(&handle).ok_or_else(|| {
            EngineError::new(
                EngineError::NO_SUCH_CORE,
                format!("handle {} is not attached", handle.as_raw()),
            )
        })?;
        if let Some(entry) = state
            .caches
            .get_mut(&cache)
            .and_then(|t| t.cores.get_mut(&slot))
        {
            entry.handle = None;
        }
        debug!(%cache, slot, "core detached");
        Ok(())
    }

    fn is_live(&self, handle: EngineHandle) -> bool {
        self.lock()
            .map(|s| s.initialized && s.handles.contains_key(&handle))
            .unwrap_or(false)
    }

    fn new_io_request(&self, handle: EngineHandle) -> Result<EngineIoRef, EngineError> {
        let mut state = self.lock()?;
        state.require_initialized()?;
        if !state.handles.contains_key(&handle) {
            return Err(EngineError::new(
                EngineError::STALE_HANDLE,
                format!("handle {} is stale", handle.as_raw()),
            ));
        }
        state.next_io += 1;
        state.io_allocated += 1;
        Ok(EngineIoRef::from_raw(
            NonZeroU64::new(state.next_io).unwrap_or(NonZeroU64::MIN),
        ))
    }
}

impl IoTransport for MemoryEngine {
    fn submit(&self, io: PreparedIo) -> Result<(), EngineError> {
        {
            let mut state = self.lock()?;
            state.require_initialized()?;
            if !state.handles.contains_key(&io.handle) {
                return Err(EngineError::new(
                    EngineError::STALE_HANDLE,
                    format!("handle {} is stale", io.handle.as_raw()),
                ));
            }
            state.io_submitted += 1;
        }

        let (completion, data, context) = (io.completion, io.data, io.context);
        completion(IoOutcome {
            result: Ok(()),
            data,
            context,
        });
        Ok(())
    }
}
