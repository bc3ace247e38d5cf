//! In-memory exporter for tests and assertions.

use crate::error::{TraceError, TraceResult};
use crate::export::{ExportResult, SpanExporter};
use crate::trace::SpanData;
use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// An exporter that collects finished spans in memory.
///
/// Clones share the same storage, so a clone can be handed to a processor
/// while the original is used for assertions. `set_failing(true)` makes
/// every export attempt fail, for exercising delivery-failure paths.
///
/// ```
/// use webtrace::trace::{InMemorySpanExporter, SimpleSpanProcessor, TracerProvider};
///
/// let exporter = InMemorySpanExporter::default();
/// let provider = TracerProvider::builder()
///     .with_span_processor(SimpleSpanProcessor::new(Box::new(exporter.clone())))
///     .build();
///
/// provider.tracer("test").start("operation").end();
/// assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
    should_fail: Arc<AtomicBool>,
}

impl InMemorySpanExporter {
    /// Returns the finished spans this exporter has received so far.
    pub fn get_finished_spans(&self) -> TraceResult<Vec<SpanData>> {
        self.spans
            .lock()
            .map(|spans| spans.clone())
            .map_err(|err| TraceError::Other(err.to_string()))
    }

    /// Clears the collected spans.
    pub fn reset(&self) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.clear();
        }
    }

    /// When set, every subsequent export attempt fails without recording
    /// the batch.
    pub fn set_failing(&self, failing: bool) {
        self.should_fail.store(failing, Ordering::SeqCst);
    }
}

impl SpanExporter for InMemorySpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Box::pin(std::future::ready(Err(TraceError::ExportFailed(
                "in-memory exporter set to fail".to_string(),
            ))));
        }

        let result = self
            .spans
            .lock()
            .map(|mut spans| spans.extend(batch))
            .map_err(|err| TraceError::Other(err.to_string()));

        Box::pin(std::future::ready(result))
    }
}
