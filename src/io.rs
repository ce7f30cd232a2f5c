//! IO requests scoped to an attached core.
//!
//! [`new_io_request`] turns a live [`CoreHandle`] into an unconfigured
//! [`IoRequest`]. The caller sets direction, range and buffer, then hands the
//! request to an [`IoTransport`] with [`IoRequest::submit`], which consumes
//! it. The completion callback runs exactly once per accepted submission.

use crate::core::{CoreHandle, CoreId};
use crate::engine::{EngineError, EngineHandle, EngineIoRef};
use crate::error::CoreError;
use std::any::Any;
use std::fmt;
use tracing::debug;

/// Data direction of an IO request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoDirection {
    Read,
    Write,
}

/// Caller-supplied value returned untouched on completion.
pub type IoContext = Box<dyn Any + Send>;

/// Completion callback, invoked once with the outcome.
pub type IoCompletion = Box<dyn FnOnce(IoOutcome) + Send>;

/// What a completed IO reports back.
pub struct IoOutcome {
    pub result: Result<(), EngineError>,
    /// The request buffer; filled for reads.
    pub data: Vec<u8>,
    pub context: Option<IoContext>,
}

impl fmt::Debug for IoOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoOutcome")
            .field("result", &self.result)
            .field("data_len", &self.data.len())
            .field("has_context", &self.context.is_some())
            .finish()
    }
}

/// A fully configured request as handed to the transport.
pub struct PreparedIo {
    pub io: EngineIoRef,
    pub handle: EngineHandle,
    pub core: CoreId,
    pub direction: IoDirection,
    pub offset: u64,
    pub length: u32,
    pub io_class: u32,
    pub flags: u64,
    pub data: Vec<u8>,
    pub context: Option<IoContext>,
    pub completion: IoCompletion,
}

/// Carries prepared IO to the engine.
///
/// If `submit` returns an error the completion callback must not be called.
pub trait IoTransport {
    fn submit(&self, io: PreparedIo) -> Result<(), EngineError>;
}

/// An IO request bound to one core for its whole life.
pub struct IoRequest {
    owner: CoreHandle,
    io: EngineIoRef,
    direction: Option<IoDirection>,
    range: Option<(u64, u32)>,
    io_class: u32,
    flags: u64,
    data: Vec<u8>,
    context: Option<IoContext>,
}

/// Allocate a new IO request against the core behind `handle`.
pub fn new_io_request(handle: &CoreHandle) -> Result<IoRequest, CoreError> {
    if !handle.is_live() {
        return Err(CoreError::InvalidHandle);
    }

    let io = handle.engine().new_io_request(handle.engine_handle())?;
    handle.record_io();
    debug!(core = %handle.core_id(), io = io.as_raw(), "allocated io request");

    Ok(IoRequest {
        owner: handle.clone(),
        io,
        direction: None,
        range: None,
        io_class: 0,
        flags: 0,
        data: Vec::new(),
        context: None,
    })
}

impl IoRequest {
    /// Core this request is bound to.
    pub fn owner(&self) -> CoreId {
        self.owner.core_id()
    }

    pub fn core_handle(&self) -> &CoreHandle {
        &self.owner
    }

    pub fn engine_io(&self) -> EngineIoRef {
        self.io
    }

    pub fn direction(&self) -> Option<IoDirection> {
        self.direction
    }

    pub fn offset(&self) -> Option<u64> {
        self.range.map(|(offset, _)| offset)
    }

    pub fn length(&self) -> Option<u32> {
        self.range.map(|(_, length)| length)
    }

    pub fn io_class(&self) -> u32 {
        self.io_class
    }

    pub fn flags(&self) -> u64 {
        self.flags
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn set_direction(&mut self, direction: IoDirection) -> &mut Self {
        self.direction = Some(direction);
        self
    }

    pub fn set_range(&mut self, offset: u64, length: u32) -> &mut Self {
        self.range = Some((offset, length));
        self
    }

    pub fn set_data(&mut self, data: Vec<u8>) -> &mut Self {
        self.data = data;
        self
    }

    pub fn set_io_class(&mut self, io_class: u32) -> &mut Self {
        self.io_class = io_class;
        self
    }

    pub fn set_flags(&mut self, flags: u64) -> &mut Self {
        self.flags = flags;
        self
    }

    pub fn set_context(&mut self, context: IoContext) -> &mut Self {
        self.context = Some(context);
        self
    }

    /// Hand the request to `transport`. Consumes the request, so it can be
    /// submitted at most once.
    ///
    /// Reads without a buffer get a zeroed buffer of `length` bytes. Writes
    /// must carry exactly `length` bytes.
    pub fn submit<F>(self, transport: &dyn IoTransport, on_complete: F) -> Result<(), CoreError>
    where
        F: FnOnce(IoOutcome) + Send + 'static,
    {
        let direction = self
            .direction
            .ok_or(CoreError::IncompleteRequest("direction"))?;
        let (offset, length) = self.range.ok_or(CoreError::IncompleteRequest("range"))?;
        if length == 0 {
            return Err(CoreError::IncompleteRequest("length"));
        }

        let mut data = self.data;
        match direction {
            IoDirection::Read if data.is_empty() => data = vec![0u8; length as usize],
            _ if data.len() != length as usize => {
                return Err(CoreError::IncompleteRequest("data buffer of matching length"));
            }
            _ => {}
        }

        if !self.owner.is_live() {
            return Err(CoreError::InvalidHandle);
        }

        debug!(
            core = %self.owner.core_id(),
            io = self.io.as_raw(),
            ?direction,
            offset,
            length,
            "submitting io request"
        );

        transport.submit(PreparedIo {
            io: self.io,
            handle: self.owner.engine_handle(),
            core: self.owner.core_id(),
            direction,
            offset,
            length,
            io_class: self.io_class,
            flags: self.flags,
            data,
            context: self.context,
            completion: Box::new(on_complete),
        })?;
        Ok(())
    }
}

impl fmt::Debug for IoRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoRequest")
            .field("owner", &self.owner.core_id())
            .field("io", &self.io)
            .field("direction", &self.direction)
            .field("range", &self.range)
            .field("io_class", &self.io_class)
            .field("flags", &self.flags)
            .field("data_len", &self.data.len())
            .finish()
    }
}
