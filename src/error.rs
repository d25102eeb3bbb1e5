use crate::types::StreamType;
use std::cell::RefCell;
use std::fmt::Write;

/// Errors surfaced to the caller of a camera session.
///
/// Data loss inside the pipeline (queue overflow, frame/metadata desync) is
/// never reported here; it is absorbed by the synthesizer and only shows up
/// as gaps in the retrieved data.
#[derive(Debug, thiserror::Error)]
pub enum StereoCamError {
    #[error("Camera not opened")]
    NotOpened,

    #[error("Camera already opened")]
    AlreadyOpened,

    #[error("Stream {0:?} is disabled")]
    StreamDisabled(StreamType),

    #[error("Unsupported configuration: {0}")]
    Unsupported(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("IMU side channel failed to start")]
    ImuOpenFailed,

    #[error("Invalid blob: expected at least {expected} bytes, got {actual}")]
    InvalidBlob { expected: usize, actual: usize },

    #[error("Buffer too small: need {needed} bytes, got {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Most recent error message for C callers, kept NUL-terminated.
///
/// Not `Sync`; the FFI layer keeps one per thread.
pub(crate) struct LastError {
    message: RefCell<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: RefCell::new(String::new()),
        }
    }

    pub fn set(&self, err: &StereoCamError) {
        let mut msg = self.message.borrow_mut();
        msg.clear();
        let _ = write!(msg, "{}", err);
        msg.push('\0');
    }

    pub fn clear(&self) {
        self.message.borrow_mut().clear();
    }

    /// Pointer to the message, null when no error is recorded.
    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        let msg = self.message.borrow();
        if msg.is_empty() {
            std::ptr::null()
        } else {
            msg.as_ptr().cast()
        }
    }
}
