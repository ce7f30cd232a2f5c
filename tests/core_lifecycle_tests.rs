//! Core lifecycle integration tests
//!
//! Exercises configuration, attach, detach and handle validity against the
//! in-memory engine through the public API only.

mod common;

use blockcache_core::{
    AttachFailure, AttachPolicy, BackendType, CACHE_SLOT_UNASSIGNED, CORE_SLOT_AUTO, CacheId,
    Core, CoreConfiguration, CoreError, CoreState, DEFAULT_SEQ_CUTOFF_THRESHOLD, EngineError,
};
use common::fixtures::*;

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_identity_length_includes_terminator() {
    let config = CoreConfiguration::using_device(identity(LOOP_DEVICE), BackendType::BLOCK);
    assert_eq!(config.identity().len(), 11);
    assert_eq!(config.identity().as_str(), LOOP_DEVICE);
}

#[test]
fn test_using_device_defaults() {
    let config = CoreConfiguration::using_device(identity(URI_DEVICE), BackendType::FILE);
    assert_eq!(config.core_slot(), CORE_SLOT_AUTO);
    assert!(config.is_auto_slot());
    assert_eq!(config.name(), None);
    assert_eq!(config.cache_slot(), CACHE_SLOT_UNASSIGNED);
    assert_eq!(config.attach_policy(), AttachPolicy::AttachOnly);
    assert_eq!(config.seq_cutoff_threshold(), 1_048_576);
    assert_eq!(config.seq_cutoff_threshold(), DEFAULT_SEQ_CUTOFF_THRESHOLD);
    assert!(config.user_metadata().is_empty());
}

#[test]
fn test_configuration_rejects_out_of_range_slot() {
    let result = CoreConfiguration::builder(identity(LOOP_DEVICE), BackendType::BLOCK)
        .core_slot(CORE_SLOT_AUTO + 1)
        .build();
    assert!(matches!(result, Err(CoreError::InvalidConfiguration(_))));
}

// ============================================================================
// Attach
// ============================================================================

#[test]
fn test_attach_only_unknown_device_fails() {
    let engine = running_engine();
    let mut core = core(&engine, LOOP_DEVICE, AttachPolicy::AttachOnly);

    let result = core.attach();
    assert_eq!(
        result,
        Err(CoreError::AttachFailed {
            reason: AttachFailure::UnknownDevice
        })
    );
    assert_eq!(core.state(), CoreState::Unattached);
    assert_eq!(engine.core_count(TEST_CACHE), 0);
}

#[test]
fn test_attach_or_create_then_new_io() {
    let engine = running_engine();
    let mut core = core(&engine, LOOP_DEVICE, AttachPolicy::AttachOrCreate);

    let handle = core.attach().expect("attach should succeed");
    assert_eq!(core.state(), CoreState::Attached);
    assert_eq!(core.configuration().cache_slot(), TEST_CACHE.0);

    let io = handle.new_io().expect("io allocation should succeed");
    assert_eq!(io.owner(), core.id());
}

#[test]
fn test_attach_only_succeeds_for_known_core() {
    let engine = running_engine();
    let mut first = core(&engine, LOOP_DEVICE, AttachPolicy::AttachOrCreate);
    first.attach().unwrap();
    first.detach().unwrap();

    let mut second = core(&engine, LOOP_DEVICE, AttachPolicy::AttachOnly);
    let handle = second.attach().expect("known core should attach");
    assert_eq!(engine.core_count(TEST_CACHE), 1);
    assert_eq!(handle.core_slot(), 0);
}

#[test]
fn test_unregistered_device_is_unresolvable() {
    let engine = running_engine();
    let mut core = core(&engine, UNREGISTERED_DEVICE, AttachPolicy::AttachOrCreate);
    assert_eq!(
        core.attach(),
        Err(CoreError::AttachFailed {
            reason: AttachFailure::UnresolvableIdentity
        })
    );
}

#[test]
fn test_duplicate_explicit_slot_fails() {
    let engine = running_engine();

    let config_a = CoreConfiguration::builder(identity(LOOP_DEVICE), BackendType::BLOCK)
        .core_slot(7)
        .try_add(true)
        .build()
        .unwrap();
    let config_b = CoreConfiguration::builder(identity(SECOND_DEVICE), BackendType::BLOCK)
        .core_slot(7)
        .try_add(true)
        .build()
        .unwrap();

    let mut a = Core::new(engine.clone(), TEST_CACHE, config_a);
    let mut b = Core::new(engine.clone(), TEST_CACHE, config_b);

    assert_eq!(a.attach().unwrap().core_slot(), 7);
    assert_eq!(
        b.attach(),
        Err(CoreError::AttachFailed {
            reason: AttachFailure::SlotOccupied(7)
        })
    );
    assert_eq!(b.state(), CoreState::Unattached);
}

#[test]
fn test_same_device_twice_is_already_attached() {
    let engine = running_engine();
    let mut a = core(&engine, LOOP_DEVICE, AttachPolicy::AttachOrCreate);
    let mut b = core(&engine, LOOP_DEVICE, AttachPolicy::AttachOrCreate);

    a.attach().unwrap();
    assert_eq!(
        b.attach(),
        Err(CoreError::AttachFailed {
            reason: AttachFailure::AlreadyAttached
        })
    );
}

#[test]
fn test_cache_full() {
    let engine = running_engine();
    engine.start_cache(CacheId(9), 1).unwrap();

    let policy = AttachPolicy::AttachOrCreate;
    let mut a = Core::new(engine.clone(), CacheId(9), config(LOOP_DEVICE, policy));
    let mut b = Core::new(engine.clone(), CacheId(9), config(SECOND_DEVICE, policy));

    a.attach().unwrap();
    assert_eq!(
        b.attach(),
        Err(CoreError::AttachFailed {
            reason: AttachFailure::CacheFull
        })
    );
}

#[test]
fn test_attach_to_missing_cache() {
    let engine = running_engine();
    let mut core = Core::new(
        engine.clone(),
        CacheId(42),
        config(LOOP_DEVICE, AttachPolicy::AttachOrCreate),
    );
    assert_eq!(
        core.attach(),
        Err(CoreError::AttachFailed {
            reason: AttachFailure::NoSuchCache
        })
    );
}

#[test]
fn test_engine_failure_passes_through() {
    let engine = running_engine();
    engine.shutdown().unwrap();

    let mut core = core(&engine, LOOP_DEVICE, AttachPolicy::AttachOrCreate);
    match core.attach() {
        Err(CoreError::Engine(e)) => assert_eq!(e.code, EngineError::NOT_INITIALIZED),
        other => panic!("expected engine error, got {:?}", other),
    }
    assert_eq!(core.state(), CoreState::Unattached);
}

#[test]
fn test_retry_after_failed_attach() {
    let engine = running_engine();
    let mut core = Core::new(
        engine.clone(),
        CacheId(3),
        config(LOOP_DEVICE, AttachPolicy::AttachOrCreate),
    );
    assert!(core.attach().is_err());

    engine.start_cache(CacheId(3), 4).unwrap();
    assert!(core.attach().is_ok());
    assert_eq!(core.metrics().attach_attempts, 2);
    assert_eq!(core.metrics().attach_failures, 1);
}

#[test]
fn test_attach_twice_calls_engine_once() {
    let engine = running_engine();
    let mut core = core(&engine, LOOP_DEVICE, AttachPolicy::AttachOrCreate);

    let first = core.attach().unwrap();
    let second = core.attach().unwrap();
    assert_eq!(first, second);
    assert_eq!(engine.attach_calls(), 1);
}

// ============================================================================
// Detach
// ============================================================================

#[test]
fn test_detach_unattached_is_not_attached() {
    let engine = running_engine();
    let mut core = core(&engine, LOOP_DEVICE, AttachPolicy::AttachOrCreate);
    assert_eq!(core.detach(), Err(CoreError::NotAttached));
    assert_eq!(engine.detach_calls(), 0);
}

#[test]
fn test_detach_twice_is_not_attached() {
    let engine = running_engine();
    let mut core = core(&engine, LOOP_DEVICE, AttachPolicy::AttachOrCreate);
    core.attach().unwrap();
    core.detach().unwrap();

    assert_eq!(core.detach(), Err(CoreError::NotAttached));
    assert_eq!(engine.detach_calls(), 1);
    assert_eq!(core.state(), CoreState::Detached);
}

#[test]
fn test_detach_keeps_record() {
    let engine = running_engine();
    let mut core = core(&engine, LOOP_DEVICE, AttachPolicy::AttachOrCreate);
    core.attach().unwrap();
    core.detach().unwrap();

    assert_eq!(engine.core_count(TEST_CACHE), 1);
    assert_eq!(engine.attached_count(TEST_CACHE), 0);
    assert_eq!(core.configuration().identity().as_str(), LOOP_DEVICE);
}

#[test]
fn test_new_io_after_detach_is_invalid_handle() {
    let engine = running_engine();
    let mut core = core(&engine, LOOP_DEVICE, AttachPolicy::AttachOrCreate);
    let handle = core.attach().unwrap();
    core.detach().unwrap();

    assert_eq!(handle.new_io().unwrap_err(), CoreError::InvalidHandle);
    assert_eq!(core.new_io().unwrap_err(), CoreError::InvalidHandle);
}

#[test]
fn test_reattach_after_detach_is_consumed() {
    let engine = running_engine();
    let mut core = core(&engine, LOOP_DEVICE, AttachPolicy::AttachOrCreate);
    core.attach().unwrap();
    core.detach().unwrap();
    assert_eq!(core.attach(), Err(CoreError::Consumed));
}

// ============================================================================
// Engine teardown
// ============================================================================

#[test]
fn test_stop_cache_invalidates_handle() {
    let engine = running_engine();
    let mut core = core(&engine, LOOP_DEVICE, AttachPolicy::AttachOrCreate);
    let handle = core.attach().unwrap();

    engine.stop_cache(TEST_CACHE).unwrap();
    assert!(!handle.is_live());
    assert_eq!(handle.new_io().unwrap_err(), CoreError::InvalidHandle);
}

#[test]
fn test_shutdown_invalidates_handle() {
    let engine = running_engine();
    let mut core = core(&engine, LOOP_DEVICE, AttachPolicy::AttachOrCreate);
    let handle = core.attach().unwrap();

    assert!(engine.shutdown().unwrap());
    assert!(!engine.shutdown().unwrap());
    assert!(!handle.is_live());
}

#[test]
fn test_shutdown_settles_core_as_detached() {
    let engine = running_engine();
    let mut core = core(&engine, LOOP_DEVICE, AttachPolicy::AttachOrCreate);
    core.attach().unwrap();
    engine.shutdown().unwrap();

    assert_eq!(core.detach(), Err(CoreError::NotAttached));
    assert_eq!(core.state(), CoreState::Detached);
    assert_eq!(core.new_io().unwrap_err(), CoreError::InvalidHandle);
    assert_eq!(engine.detach_calls(), 0);
}

#[test]
fn test_restarted_cache_does_not_revive_core() {
    let engine = running_engine();
    let mut core = core(&engine, LOOP_DEVICE, AttachPolicy::AttachOrCreate);
    core.attach().unwrap();

    engine.stop_cache(TEST_CACHE).unwrap();
    engine.start_cache(TEST_CACHE, TEST_CACHE_CAPACITY).unwrap();

    assert_eq!(core.attach(), Err(CoreError::Consumed));
    assert_eq!(core.handle(), Err(CoreError::NotAttached));
    assert_eq!(core.detach(), Err(CoreError::NotAttached));
    assert_eq!(core.detach(), Err(CoreError::NotAttached));
    assert_eq!(core.state(), CoreState::Detached);
    assert_eq!(engine.attach_calls(), 1);
    assert_eq!(engine.detach_calls(), 0);

    // A fresh core for the same device attaches to the restarted cache
    let mut fresh = common::fixtures::core(&engine, LOOP_DEVICE, AttachPolicy::AttachOrCreate);
    assert!(fresh.attach().is_ok());
}
