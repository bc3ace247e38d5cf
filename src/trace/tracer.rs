//! Tracers, the span factories handed out by a [`TracerProvider`].
//!
//! [`TracerProvider`]: crate::trace::TracerProvider

use crate::context::Context;
use crate::trace::provider::TracerProvider;
use crate::trace::span::{Span, SpanContext, SpanData, SpanId, Status};
use std::borrow::Cow;
use std::time::SystemTime;

/// A handle for starting spans, tied to the provider that issued it.
///
/// Tracers obtained from the same provider under the same name are
/// interchangeable.
#[derive(Clone, Debug)]
pub struct Tracer {
    scope_name: Cow<'static, str>,
    provider: TracerProvider,
}

impl Tracer {
    pub(crate) fn new(scope_name: Cow<'static, str>, provider: TracerProvider) -> Self {
        Tracer {
            scope_name,
            provider,
        }
    }

    /// The instrumentation scope name this tracer was requested under.
    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }

    /// Start a span, parented from the current context's active span.
    pub fn start(&self, name: impl Into<Cow<'static, str>>) -> Span {
        let name = name.into();
        Context::map_current(|cx| self.start_with_context(name, cx))
    }

    /// Start a span with an explicit parent context.
    ///
    /// If the context carries an active span, the new span joins its
    /// trace; otherwise a new trace id is generated. The span is
    /// decorated with the provider's resource before any processor can
    /// observe it.
    pub fn start_with_context(&self, name: impl Into<Cow<'static, str>>, cx: &Context) -> Span {
        let id_generator = self.provider.id_generator();
        let (trace_id, parent_span_id) = match cx.span() {
            Some(parent) => (parent.trace_id(), parent.span_id()),
            None => (id_generator.new_trace_id(), SpanId::INVALID),
        };
        let span_context = SpanContext::new(trace_id, id_generator.new_span_id());

        let start_time = SystemTime::now();
        let data = SpanData {
            span_context,
            parent_span_id,
            name: name.into(),
            start_time,
            // Placeholder; overwritten when the span ends. Processors only
            // ever observe the post-end snapshot.
            end_time: start_time,
            attributes: Vec::new(),
            status: Status::Unset,
            resource: self.provider.resource().clone(),
        };

        Span::new(data, self.provider.clone())
    }

    /// Start a span, run `f` with it attached as the current context, and
    /// end it afterwards.
    pub fn in_span<T, F>(&self, name: impl Into<Cow<'static, str>>, f: F) -> T
    where
        F: FnOnce(&mut Span) -> T,
    {
        let mut span = self.start(name);
        let cx = Context::current_with_span(span.span_context().clone());
        let _guard = cx.attach();
        let result = f(&mut span);
        span.end();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::in_memory_exporter::InMemorySpanExporter;
    use crate::trace::span_processor::SimpleSpanProcessor;

    fn test_provider() -> (TracerProvider, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_span_processor(SimpleSpanProcessor::new(Box::new(exporter.clone())))
            .build();
        (provider, exporter)
    }

    #[test]
    fn root_spans_get_fresh_traces() {
        let (provider, _exporter) = test_provider();
        let tracer = provider.tracer("test");
        let a = tracer.start("a");
        let b = tracer.start("b");
        assert_ne!(a.span_context().trace_id(), b.span_context().trace_id());
    }

    #[test]
    fn child_joins_parent_trace() {
        let (provider, exporter) = test_provider();
        let tracer = provider.tracer("test");

        let parent_context = tracer.in_span("parent", |parent| {
            let child = tracer.start("child");
            assert_eq!(
                child.span_context().trace_id(),
                parent.span_context().trace_id()
            );
            parent.span_context().clone()
        });

        let finished = exporter.get_finished_spans().unwrap();
        let child = finished.iter().find(|s| s.name == "child").unwrap();
        assert_eq!(child.parent_span_id, parent_context.span_id());
    }

    #[test]
    fn explicit_context_overrides_ambient() {
        let (provider, _exporter) = test_provider();
        let tracer = provider.tracer("test");

        let parent = tracer.start("parent");
        let cx = Context::new().with_span(parent.span_context().clone());
        let child = tracer.start_with_context("child", &cx);

        assert_eq!(
            child.span_context().trace_id(),
            parent.span_context().trace_id()
        );
    }

    #[test]
    fn in_span_ends_span() {
        let (provider, exporter) = test_provider();
        provider.tracer("test").in_span("scoped", |_span| {});

        let finished = exporter.get_finished_spans().unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].name, "scoped");
    }
}
