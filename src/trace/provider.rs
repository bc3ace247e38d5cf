//! The tracer provider, root of the tracing subsystem.
//!
//! The `TracerProvider` owns the ordered list of span processors and the
//! resource attached to every span, and issues [`Tracer`]s. It is an
//! explicitly constructed, cheaply clonable handle; [`register`] installs
//! it as the process-wide default exactly once, per the init-once,
//! alive-for-process-lifetime singleton lifecycle.
//!
//! [`register`]: TracerProvider::register

use crate::error::{TraceError, TraceResult};
use crate::export::SpanExporter;
use crate::resource::Resource;
use crate::trace::id_generator::{IdGenerator, RandomIdGenerator};
use crate::trace::span_processor::{
    BatchConfig, BatchSpanProcessor, SimpleSpanProcessor, SpanProcessor,
};
use crate::trace::tracer::Tracer;
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) struct TracerProviderInner {
    processors: Vec<Box<dyn SpanProcessor>>,
    resource: Resource,
    id_generator: Box<dyn IdGenerator>,
    is_shutdown: AtomicBool,
}

impl fmt::Debug for TracerProviderInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracerProviderInner")
            .field("processors", &self.processors.len())
            .field("resource", &self.resource)
            .finish()
    }
}

impl TracerProviderInner {
    fn shutdown(&self) -> Vec<TraceResult<()>> {
        let mut results = Vec::with_capacity(self.processors.len());
        for processor in &self.processors {
            let result = processor.shutdown();
            if let Err(err) = &result {
                log::debug!("processor shutdown error: {err}");
            }
            results.push(result);
        }
        results
    }
}

impl Drop for TracerProviderInner {
    fn drop(&mut self) {
        if !self.is_shutdown.load(Ordering::Relaxed) {
            let _ = self.shutdown();
        }
    }
}

/// Creator of [`Tracer`] instances and owner of the span pipeline.
///
/// Cloning creates a new reference to the same provider. Dropping the
/// last reference triggers shutdown, flushing remaining spans through the
/// registered processors.
#[derive(Clone, Debug)]
pub struct TracerProvider {
    inner: Arc<TracerProviderInner>,
}

impl Default for TracerProvider {
    fn default() -> Self {
        TracerProvider::builder().build()
    }
}

impl TracerProvider {
    /// Create a new [`TracerProvider`] builder.
    pub fn builder() -> TracerProviderBuilder {
        TracerProviderBuilder::default()
    }

    /// Returns a tracer for the given instrumentation scope name.
    ///
    /// Repeated calls with the same name return equivalent handles.
    pub fn tracer(&self, name: impl Into<Cow<'static, str>>) -> Tracer {
        Tracer::new(name.into(), self.clone())
    }

    /// Install this provider as the process-wide default tracer source.
    ///
    /// Exactly one provider may be registered per process lifetime; a
    /// second call fails with [`TraceError::AlreadyRegistered`].
    pub fn register(&self) -> TraceResult<()> {
        crate::global::set_tracer_provider(self.clone())
    }

    /// Span processors associated with this provider, in registration
    /// order.
    pub(crate) fn span_processors(&self) -> &[Box<dyn SpanProcessor>] {
        &self.inner.processors
    }

    /// Resource attached to every span from this provider.
    pub(crate) fn resource(&self) -> &Resource {
        &self.inner.resource
    }

    pub(crate) fn id_generator(&self) -> &dyn IdGenerator {
        self.inner.id_generator.as_ref()
    }

    /// `true` once the provider has been shut down. Spans ended after
    /// shutdown are dropped.
    pub fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown.load(Ordering::Relaxed)
    }

    /// Force every processor to export its buffered spans now.
    pub fn force_flush(&self) -> TraceResult<()> {
        let results: Vec<_> = self
            .span_processors()
            .iter()
            .map(|processor| processor.force_flush())
            .collect();
        if results.iter().all(|r| r.is_ok()) {
            Ok(())
        } else {
            Err(TraceError::Other(format!("errs: {results:?}")))
        }
    }

    /// Shut down this provider and its processors, flushing first.
    ///
    /// Idempotent: a second call fails with
    /// [`TraceError::AlreadyShutdown`] without touching the processors
    /// again.
    pub fn shutdown(&self) -> TraceResult<()> {
        if self
            .inner
            .is_shutdown
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let results = self.inner.shutdown();
            if results.iter().all(|r| r.is_ok()) {
                Ok(())
            } else {
                Err(TraceError::Other(format!("errs: {results:?}")))
            }
        } else {
            Err(TraceError::AlreadyShutdown)
        }
    }
}

/// Builder for [`TracerProvider`].
#[derive(Debug, Default)]
pub struct TracerProviderBuilder {
    processors: Vec<Box<dyn SpanProcessor>>,
    resource: Option<Resource>,
    id_generator: Option<Box<dyn IdGenerator>>,
}

impl TracerProviderBuilder {
    /// Add a span processor. Processors are invoked in the order they
    /// were added; every processor observes every finished span.
    pub fn with_span_processor<P: SpanProcessor + 'static>(mut self, processor: P) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Wrap the exporter in a [`SimpleSpanProcessor`] and add it.
    pub fn with_simple_exporter<E: SpanExporter + 'static>(self, exporter: E) -> Self {
        self.with_span_processor(SimpleSpanProcessor::new(Box::new(exporter)))
    }

    /// Wrap the exporter in a [`BatchSpanProcessor`] with default batch
    /// configuration and add it.
    pub fn with_batch_exporter<E: SpanExporter + 'static>(self, exporter: E) -> Self {
        self.with_span_processor(BatchSpanProcessor::new(exporter, BatchConfig::default()))
    }

    /// Set the resource attached to every span.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Replace the default random id generator.
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, id_generator: G) -> Self {
        self.id_generator = Some(Box::new(id_generator));
        self
    }

    /// Build the provider.
    pub fn build(self) -> TracerProvider {
        TracerProvider {
            inner: Arc::new(TracerProviderInner {
                processors: self.processors,
                resource: self.resource.unwrap_or_default(),
                id_generator: self
                    .id_generator
                    .unwrap_or_else(|| Box::<RandomIdGenerator>::default()),
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Key, Value};
    use crate::trace::in_memory_exporter::InMemorySpanExporter;

    #[test]
    fn resource_present_on_every_exported_span() {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_resource(Resource::builder().with_service_name("otelpoc").build())
            .with_simple_exporter(exporter.clone())
            .build();

        let tracer = provider.tracer("test");
        tracer.start("a").end();
        tracer.start("b").end();

        let finished = exporter.get_finished_spans().unwrap();
        assert_eq!(finished.len(), 2);
        for span in finished {
            assert_eq!(
                span.resource.get(&Key::new("service.name")),
                Some(&Value::from("otelpoc"))
            );
        }
    }

    #[test]
    fn processors_fan_out_in_registration_order() {
        let first = InMemorySpanExporter::default();
        let second = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_simple_exporter(first.clone())
            .with_simple_exporter(second.clone())
            .build();

        provider.tracer("test").start("fanned").end();

        assert_eq!(first.get_finished_spans().unwrap().len(), 1);
        assert_eq!(second.get_finished_spans().unwrap().len(), 1);
    }

    #[test]
    fn spans_processed_in_end_order() {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();

        let tracer = provider.tracer("test");
        let mut early = tracer.start("ends-second");
        tracer.start("ends-first").end();
        early.end();

        let finished = exporter.get_finished_spans().unwrap();
        assert_eq!(finished[0].name, "ends-first");
        assert_eq!(finished[1].name, "ends-second");
    }

    #[test]
    fn shutdown_is_idempotent_and_drops_late_spans() {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let tracer = provider.tracer("test");

        provider.shutdown().unwrap();
        assert!(matches!(
            provider.shutdown(),
            Err(TraceError::AlreadyShutdown)
        ));

        tracer.start("late").end();
        assert!(exporter.get_finished_spans().unwrap().is_empty());
    }
}
