//! Core lifecycle: attach a configured device to a cache and hold the handle.
//!
//! ```text
//!  Unattached --attach()--> Attaching --ok--> Attached --detach()--> Detached
//!       ^                       |
//!       +--------- error -------+
//! ```
//!
//! A [`Core`] owns its [`CoreConfiguration`] and uses it for at most one
//! successful attach. Once detached, the configuration stays readable but the
//! core cannot be attached again; build a new `Core` instead.
//!
//! Stopping the owning cache or shutting the engine down also ends the
//! attachment. The core notices on its next transition and settles into
//! `Detached` without calling the engine.
//!
//! Transitions take `&mut self`, so one `Core` never has two transitions in
//! flight. The [`CoreHandle`] handed out on attach is cheap to clone and may
//! be used from many threads to build IO requests.

use crate::config::CoreConfiguration;
use crate::engine::{AttachError, CacheEngine, CacheId, EngineHandle};
use crate::error::CoreError;
use crate::io::{IoRequest, new_io_request};
use crate::metrics::CoreMetrics;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Process-wide counter for core identities.
static NEXT_CORE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one `Core` instance, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoreId(u64);

impl CoreId {
    fn next() -> Self {
        CoreId(NEXT_CORE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "core#{}", self.0)
    }
}

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreState {
    Unattached,
    Attaching,
    Attached,
    Detached,
}

struct HandleInner {
    engine_handle: EngineHandle,
    core: CoreId,
    core_slot: u16,
    cache_slot: u16,
    live: AtomicBool,
    io_created: AtomicU64,
    engine: Arc<dyn CacheEngine>,
}

/// Live reference to an attached core.
///
/// Valid from a successful attach until the core is detached or its cache is
/// torn down; [`is_live`](Self::is_live) checks both.
#[derive(Clone)]
pub struct CoreHandle {
    inner: Arc<HandleInner>,
}

impl CoreHandle {
    pub fn engine_handle(&self) -> EngineHandle {
        self.inner.engine_handle
    }

    pub fn core_id(&self) -> CoreId {
        self.inner.core
    }

    /// Slot the engine placed the core in.
    pub fn core_slot(&self) -> u16 {
        self.inner.core_slot
    }

    pub fn cache_slot(&self) -> u16 {
        self.inner.cache_slot
    }

    pub fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::Acquire) && self.inner.engine.is_live(self.inner.engine_handle)
    }

    /// Allocate an IO request on this core.
    pub fn new_io(&self) -> Result<IoRequest, CoreError> {
        new_io_request(self)
    }

    pub(crate) fn engine(&self) -> &dyn CacheEngine {
        self.inner.engine.as_ref()
    }

    pub(crate) fn record_io(&self) {
        self.inner.io_created.fetch_add(1, Ordering::Relaxed);
    }

    fn invalidate(&self) {
        self.inner.live.store(false, Ordering::Release);
    }
}

impl PartialEq for CoreHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.core == other.inner.core && self.inner.engine_handle == other.inner.engine_handle
    }
}

impl Eq for CoreHandle {}

impl fmt::Debug for CoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreHandle")
            .field("core", &self.inner.core)
            .field("engine_handle", &self.inner.engine_handle)
            .field("core_slot", &self.inner.core_slot)
            .field("cache_slot", &self.inner.cache_slot)
            .field("live", &self.inner.live.load(Ordering::Relaxed))
            .finish()
    }
}

enum Lifecycle {
    Unattached,
    Attaching,
    Attached(CoreHandle),
    Detached(CoreHandle),
}

/// A device being attached to, or attached to, one cache.
pub struct Core {
    id: CoreId,
    engine: Arc<dyn CacheEngine>,
    cache: CacheId,
    config: CoreConfiguration,
    lifecycle: Lifecycle,
    metrics: CoreMetrics,
}

impl Core {
    /// Take ownership of `config` for attaching to `cache` through `engine`.
    pub fn new(engine: Arc<dyn CacheEngine>, cache: CacheId, config: CoreConfiguration) -> Self {
        Self {
            id: CoreId::next(),
            engine,
            cache,
            config,
            lifecycle: Lifecycle::Unattached,
            metrics: CoreMetrics::new(),
        }
    }

    pub fn id(&self) -> CoreId {
        self.id
    }

    pub fn cache(&self) -> CacheId {
        self.cache
    }

    pub fn state(&self) -> CoreState {
        match &self.lifecycle {
            Lifecycle::Unattached => CoreState::Unattached,
            Lifecycle::Attaching => CoreState::Attaching,
            Lifecycle::Attached(handle) if handle.is_live() => CoreState::Attached,
            Lifecycle::Attached(_) | Lifecycle::Detached(_) => CoreState::Detached,
        }
    }

    /// Available in every state.
    pub fn configuration(&self) -> &CoreConfiguration {
        &self.config
    }

    /// Attach the core, or return the existing handle if already attached.
    pub fn attach(&mut self) -> Result<CoreHandle, CoreError> {
        self.settle_dropped_handle();
        match &self.lifecycle {
            Lifecycle::Attached(handle) => return Ok(handle.clone()),
            Lifecycle::Detached(_) => return Err(CoreError::Consumed),
            Lifecycle::Attaching | Lifecycle::Unattached => {}
        }

        self.lifecycle = Lifecycle::Attaching;
        let start = Instant::now();
        let result = self.engine.attach_core(self.cache, &self.config);
        let elapsed_micros = start.elapsed().as_micros() as u64;

        match result {
            Ok(attached) => {
                self.config.set_cache_slot(attached.cache_slot);
                let handle = CoreHandle {
                    inner: Arc::new(HandleInner {
                        engine_handle: attached.handle,
                        core: self.id,
                        core_slot: attached.core_slot,
                        cache_slot: attached.cache_slot,
                        live: AtomicBool::new(true),
                        io_created: AtomicU64::new(0),
                        engine: Arc::clone(&self.engine),
                    }),
                };
                self.metrics = self.metrics.clone().with_attach(elapsed_micros, true);
                self.lifecycle = Lifecycle::Attached(handle.clone());
                info!(
                    core = %self.id,
                    cache = %self.cache,
                    device = %self.config.identity(),
                    core_slot = attached.core_slot,
                    "core attached"
                );
                Ok(handle)
            }
            Err(e) => {
                self.metrics = self.metrics.clone().with_attach(elapsed_micros, false);
                self.lifecycle = Lifecycle::Unattached;
                let err = match e {
                    AttachError::Rejected(reason) => CoreError::AttachFailed { reason },
                    AttachError::Engine(e) => CoreError::Engine(e),
                };
                warn!(
                    core = %self.id,
                    cache = %self.cache,
                    device = %self.config.identity(),
                    error = %err,
                    "core attach failed"
                );
                Err(err)
            }
        }
    }

    /// Detach an attached core. Any other state is `NotAttached` and does
    /// not reach the engine.
    pub fn detach(&mut self) -> Result<(), CoreError> {
        if self.settle_dropped_handle() {
            return Err(CoreError::NotAttached);
        }
        let handle = match &self.lifecycle {
            Lifecycle::Attached(handle) => handle.clone(),
            _ => return Err(CoreError::NotAttached),
        };

        let start = Instant::now();
        self.engine.detach_core(handle.engine_handle())?;
        self.metrics = self
            .metrics
            .clone()
            .with_detach(start.elapsed().as_micros() as u64);

        handle.invalidate();
        self.lifecycle = Lifecycle::Detached(handle);
        debug!(core = %self.id, cache = %self.cache, "core detached");
        Ok(())
    }

    /// Handle of the attached core.
    pub fn handle(&self) -> Result<CoreHandle, CoreError> {
        match &self.lifecycle {
            Lifecycle::Attached(handle) if handle.is_live() => Ok(handle.clone()),
            _ => Err(CoreError::NotAttached),
        }
    }

    /// Move an attached core whose handle the engine no longer knows to
    /// `Detached`. Returns whether the state changed.
    fn settle_dropped_handle(&mut self) -> bool {
        let dropped = match &self.lifecycle {
            Lifecycle::Attached(handle) if !handle.is_live() => handle.clone(),
            _ => return false,
        };
        dropped.invalidate();
        warn!(
            core = %self.id,
            cache = %self.cache,
            "engine dropped the core handle, marking core detached"
        );
        self.lifecycle = Lifecycle::Detached(dropped);
        true
    }

    /// Allocate an IO request on this core.
    pub fn new_io(&self) -> Result<IoRequest, CoreError> {
        match &self.lifecycle {
            Lifecycle::Attached(handle) => new_io_request(handle),
            _ => Err(CoreError::InvalidHandle),
        }
    }

    pub fn metrics(&self) -> CoreMetrics {
        let io_created = match &self.lifecycle {
            Lifecycle::Attached(h) | Lifecycle::Detached(h) => {
                h.inner.io_created.load(Ordering::Relaxed)
            }
            _ => 0,
        };
        self.metrics.clone().with_io_requests(io_created)
    }
}

impl fmt::Debug for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Core")
            .field("id", &self.id)
            .field("cache", &self.cache)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}
