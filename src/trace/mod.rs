//! The tracing pipeline: spans, tracers, the provider, and processors.
//!
//! Spans flow from [`Tracer::start`] through [`Span::end`] into every
//! [`SpanProcessor`] registered on the owning [`TracerProvider`], which
//! drives them to their exporters.

mod id_generator;
pub mod in_memory_exporter;
mod provider;
mod span;
mod span_processor;
mod tracer;

pub use id_generator::{IdGenerator, RandomIdGenerator};
pub use in_memory_exporter::InMemorySpanExporter;
pub use provider::{TracerProvider, TracerProviderBuilder};
pub use span::{Span, SpanContext, SpanData, SpanId, Status, TraceId};
pub use span_processor::{
    BatchConfig, BatchConfigBuilder, BatchSpanProcessor, BatchSpanProcessorBuilder,
    SimpleSpanProcessor, SpanProcessor,
};
pub use tracer::Tracer;
