//! Test fixtures: device names, cache ids and engine builders.

use blockcache_core::{
    AttachPolicy, BackendType, CacheId, Core, CoreConfiguration, DeviceIdentity, MemoryEngine,
};
use std::sync::Arc;

// ============================================================================
// Devices
// ============================================================================

/// Loop device used by most lifecycle scenarios
pub const LOOP_DEVICE: &str = "/dev/loop0";

/// Second device for slot collision scenarios
pub const SECOND_DEVICE: &str = "/dev/loop1";

/// URI-style identity
pub const URI_DEVICE: &str = "nvme://host-a/ns1";

/// Device the engine has never heard of
pub const UNREGISTERED_DEVICE: &str = "/dev/unregistered";

// ============================================================================
// Caches
// ============================================================================

pub const TEST_CACHE: CacheId = CacheId(1);

pub const TEST_CACHE_CAPACITY: usize = 16;

// ============================================================================
// Helper Functions
// ============================================================================

pub fn identity(name: &str) -> DeviceIdentity {
    DeviceIdentity::new(name).expect("fixture identity should be valid")
}

/// Initialized engine running `TEST_CACHE` with every fixture device
/// registered as a block device.
pub fn running_engine() -> Arc<MemoryEngine> {
    let engine = Arc::new(MemoryEngine::new());
    engine.initialize().expect("initialize");
    engine
        .start_cache(TEST_CACHE, TEST_CACHE_CAPACITY)
        .expect("start cache");
    for name in [LOOP_DEVICE, SECOND_DEVICE, URI_DEVICE] {
        engine
            .register_device(BackendType::BLOCK, identity(name))
            .expect("register device");
    }
    engine
}

/// Configuration for `name` with the given policy and everything else default.
pub fn config(name: &str, policy: AttachPolicy) -> CoreConfiguration {
    CoreConfiguration::builder(identity(name), BackendType::BLOCK)
        .attach_policy(policy)
        .build()
        .expect("fixture configuration should be valid")
}

/// Core for `name` on `TEST_CACHE`, not yet attached.
pub fn core(engine: &Arc<MemoryEngine>, name: &str, policy: AttachPolicy) -> Core {
    Core::new(engine.clone(), TEST_CACHE, config(name, policy))
}
