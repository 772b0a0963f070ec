//! Guarded codec calls.
//!
//! The JPEG library may bail out of any call, either by returning a fatal
//! error or by panicking deep inside its decoder. Every codec call made by a
//! session runs through [`guarded`], which turns both into a
//! [`CodecError::Fatal`] so the session can shut down before reporting it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use super::{CodecError, CodecResult};

/// Run `op`, converting a panic into a fatal codec error.
pub fn guarded<T, F>(op: F) -> CodecResult<T>
where
    F: FnOnce() -> CodecResult<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(op)) {
        Ok(result) => result,
        Err(payload) => Err(CodecError::Fatal(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("codec aborted: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("codec aborted: {}", s)
    } else {
        "codec aborted".to_string()
    }
}

/// Last fault seen by a session.
#[derive(Debug, Default, Clone)]
pub struct FaultContext {
    last: Option<String>,
    count: u64,
}

impl FaultContext {
    /// Record a fault message.
    pub fn record(&mut self, message: &str) {
        self.last = Some(message.to_string());
        self.count += 1;
    }

    /// Message of the most recent fault.
    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }

    /// Number of faults recorded over the session's lifetime.
    pub fn count(&self) -> u64 {
        self.count
    }
}
