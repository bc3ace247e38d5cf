//! Trace exporters.
//!
//! An exporter is the terminal stage of the pipeline: given a batch of
//! finished spans it attempts delivery to some destination and reports
//! the outcome. Exporters never panic through the caller; failures are
//! returned as [`TraceError`] values for the processor to swallow.
//!
//! [`TraceError`]: crate::TraceError

pub mod http;
pub mod otlp;
pub mod stdout;

use crate::error::TraceResult;
use crate::trace::SpanData;
use futures_util::future::BoxFuture;
use std::fmt::Debug;

/// Result of an export attempt.
pub type ExportResult = TraceResult<()>;

/// A sink that serializes and transmits batches of finished spans.
pub trait SpanExporter: Send + Sync + Debug {
    /// Export a batch of finished spans.
    ///
    /// Delivery is at-most-once: the caller clears its buffer regardless
    /// of the outcome and never redelivers a batch.
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult>;

    /// Release any resources held by the exporter. Called once when the
    /// owning processor shuts down.
    fn shutdown(&mut self) {}
}
