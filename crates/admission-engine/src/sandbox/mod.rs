//! Script sandbox: runs operator-authored policy scripts against request data.
//!
//! Every invocation gets a fresh interpreter, a snapshot of the request data,
//! a restricted set of host functions and a hard wall-clock deadline. The
//! deadline is enforced cooperatively: a timer raises an interrupt flag and
//! the interpreter's progress hook aborts at the next operation boundary.
//! The blocking worker's join handle is the single place where abnormal
//! endings (deadline abort, panic) are caught and classified.

mod host;
mod runtime;

use thiserror::Error;

use admission_core::error::AdmissionError;

pub use host::{
    builtin_extensions, in_domain, CacheAccess, CacheHandle, DenySink, Denials, HostContext,
    HostExtension, ImageHelpers, Logging, StringHelpers,
};
pub use runtime::{Bindings, Interrupt, ScriptSandbox, SandboxOutcome, DEFAULT_TIMEOUT};

/// Why a sandbox invocation did not complete cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    /// The script ran past its deadline and was interrupted.
    #[error("operation timed out")]
    Timeout,
    /// Syntax, reference or runtime fault raised by the program text.
    #[error("script error: {0}")]
    Script(String),
    /// Request data could not be converted for the interpreter.
    #[error("unable to convert {what} for the script runtime: {reason}")]
    HostData { what: String, reason: String },
    /// The interpreter or a host function panicked.
    #[error("script runtime panicked: {0}")]
    Panicked(String),
}

impl SandboxError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SandboxError::Timeout)
    }
}

impl From<SandboxError> for AdmissionError {
    fn from(e: SandboxError) -> Self {
        AdmissionError::Internal(e.to_string())
    }
}
