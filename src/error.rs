//! Errors returned by the tracing pipeline.
//!
//! Pipeline failures are recovered locally and must never amplify into an
//! application fault, so most of these errors are logged and swallowed at
//! the processor layer rather than surfaced to callers.

use std::time::Duration;
use thiserror::Error;

/// Result type returned from fallible pipeline operations.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors raised while producing or exporting trace data.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// An exporter failed to deliver a batch of spans.
    #[error("export failed: {0}")]
    ExportFailed(String),

    /// An export did not complete within the allowed time.
    #[error("export timed out after {0:?}")]
    ExportTimedOut(Duration),

    /// A tracer provider was already installed as the process-wide default.
    #[error("a tracer provider is already registered for this process")]
    AlreadyRegistered,

    /// The tracer provider has already been shut down.
    #[error("tracer provider is already shut down")]
    AlreadyShutdown,

    /// Any other error not covered by the variants above.
    #[error("{0}")]
    Other(String),
}

impl From<&'static str> for TraceError {
    fn from(msg: &'static str) -> Self {
        TraceError::Other(msg.to_string())
    }
}

impl From<String> for TraceError {
    fn from(msg: String) -> Self {
        TraceError::Other(msg)
    }
}
