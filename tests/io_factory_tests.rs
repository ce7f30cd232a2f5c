//! IO request factory integration tests
//!
//! Requests must always report the core they were created from, and must
//! never outlive the handle that created them.

mod common;

use blockcache_core::{AttachPolicy, CoreError, IoDirection, new_io_request};
use common::fixtures::*;
use std::sync::mpsc;

#[test]
fn test_requests_are_bound_to_their_core() {
    let engine = running_engine();
    let mut a = core(&engine, LOOP_DEVICE, AttachPolicy::AttachOrCreate);
    let mut b = core(&engine, SECOND_DEVICE, AttachPolicy::AttachOrCreate);
    let handle_a = a.attach().unwrap();
    let handle_b = b.attach().unwrap();

    let io_a = new_io_request(&handle_a).unwrap();
    let io_b = new_io_request(&handle_b).unwrap();

    assert_eq!(io_a.owner(), a.id());
    assert_eq!(io_b.owner(), b.id());
    assert_ne!(io_a.owner(), io_b.owner());
    assert_ne!(io_a.engine_io(), io_b.engine_io());
}

#[test]
fn test_each_call_allocates_a_fresh_request() {
    let engine = running_engine();
    let mut core = core(&engine, LOOP_DEVICE, AttachPolicy::AttachOrCreate);
    let handle = core.attach().unwrap();

    let first = handle.new_io().unwrap();
    let second = handle.new_io().unwrap();
    assert_ne!(first.engine_io(), second.engine_io());
    assert_eq!(engine.io_counts().0, 2);
    assert_eq!(core.metrics().io_requests_created, 2);
}

#[test]
fn test_write_roundtrips_buffer_to_completion() {
    let engine = running_engine();
    let mut core = core(&engine, URI_DEVICE, AttachPolicy::AttachOrCreate);
    core.attach().unwrap();
    let (tx, rx) = mpsc::channel();

    let mut io = core.new_io().unwrap();
    io.set_direction(IoDirection::Write)
        .set_range(8192, 4)
        .set_io_class(3)
        .set_flags(0x10)
        .set_data(vec![0xde, 0xad, 0xbe, 0xef]);
    assert_eq!(io.io_class(), 3);
    assert_eq!(io.flags(), 0x10);

    io.submit(engine.as_ref(), move |outcome| {
        tx.send((outcome.result, outcome.data)).unwrap();
    })
    .unwrap();

    let (result, data) = rx.recv().unwrap();
    assert!(result.is_ok());
    assert_eq!(data, vec![0xde, 0xad, 0xbe, 0xef]);
    assert_eq!(engine.io_counts(), (1, 1));
}

#[test]
fn test_zero_length_is_rejected() {
    let engine = running_engine();
    let mut core = core(&engine, LOOP_DEVICE, AttachPolicy::AttachOrCreate);
    core.attach().unwrap();

    let mut io = core.new_io().unwrap();
    io.set_direction(IoDirection::Read).set_range(0, 0);
    assert_eq!(
        io.submit(engine.as_ref(), |_| {}),
        Err(CoreError::IncompleteRequest("length"))
    );
    assert_eq!(engine.io_counts().1, 0);
}

#[test]
fn test_request_dies_with_cache() {
    let engine = running_engine();
    let mut core = core(&engine, LOOP_DEVICE, AttachPolicy::AttachOrCreate);
    core.attach().unwrap();

    let mut io = core.new_io().unwrap();
    io.set_direction(IoDirection::Read).set_range(0, 512);
    engine.stop_cache(TEST_CACHE).unwrap();

    assert_eq!(
        io.submit(engine.as_ref(), |_| panic!("must not complete")),
        Err(CoreError::InvalidHandle)
    );
}
