//! The span data model.
//!
//! A [`Span`] represents a single named, timed unit of traced work. It is
//! created by a [`Tracer`], may accumulate attributes while open, and is
//! closed exactly once — the first `end` snapshots an immutable
//! [`SpanData`] and hands it to every processor registered on the owning
//! provider, in registration order. Later ends and post-end mutation are
//! no-ops.
//!
//! [`Tracer`]: crate::trace::Tracer

use crate::common::KeyValue;
use crate::resource::Resource;
use crate::trace::provider::TracerProvider;
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;
use std::time::SystemTime;

/// The correlation identifier shared by all spans of one trace.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(u128);

impl TraceId {
    /// Invalid (all zero) trace id.
    pub const INVALID: TraceId = TraceId(0);

    /// The raw value.
    pub fn to_u128(self) -> u128 {
        self.0
    }
}

impl From<u128> for TraceId {
    fn from(value: u128) -> Self {
        TraceId(value)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({:032x})", self.0)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl Serialize for TraceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Identifier of a single span within a trace.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(u64);

impl SpanId {
    /// Invalid (all zero) span id, used as the parent id of root spans.
    pub const INVALID: SpanId = SpanId(0);

    /// The raw value.
    pub fn to_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for SpanId {
    fn from(value: u64) -> Self {
        SpanId(value)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({:016x})", self.0)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Serialize for SpanId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Immutable identity of a span: its trace id and span id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
}

impl SpanContext {
    /// Create a new span context.
    pub fn new(trace_id: TraceId, span_id: SpanId) -> Self {
        SpanContext { trace_id, span_id }
    }

    /// The trace this span belongs to.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// This span's id.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }
}

/// The status of a finished span.
#[derive(Clone, Debug, PartialEq, Default, Serialize)]
pub enum Status {
    /// The default status.
    #[default]
    Unset,

    /// The operation contains an error.
    Error {
        /// The description of the error
        description: Cow<'static, str>,
    },
}

impl Status {
    /// Create an error status with the given description.
    pub fn error(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }
}

/// Immutable data of a finished span, as observed by span processors.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanData {
    /// Span identity.
    pub span_context: SpanContext,
    /// Span id of the parent, `SpanId::INVALID` for root spans.
    pub parent_span_id: SpanId,
    /// Span name.
    pub name: Cow<'static, str>,
    /// Time the span was started.
    pub start_time: SystemTime,
    /// Time the span was ended.
    pub end_time: SystemTime,
    /// Attributes recorded while the span was open.
    pub attributes: Vec<KeyValue>,
    /// Span status.
    pub status: Status,
    /// Identity attributes of the producing process.
    pub resource: Resource,
}

/// A started, recording span.
///
/// Ending the span (explicitly, or implicitly on drop) forwards its
/// [`SpanData`] to the owning provider's processors. A span that outlives
/// its provider's shutdown is silently dropped.
#[derive(Debug)]
pub struct Span {
    span_context: SpanContext,
    data: Option<SpanData>,
    provider: TracerProvider,
}

impl Span {
    pub(crate) fn new(data: SpanData, provider: TracerProvider) -> Self {
        Span {
            span_context: data.span_context.clone(),
            data: Some(data),
            provider,
        }
    }

    /// This span's identity, available before and after `end`.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// Returns `true` until the span is ended.
    pub fn is_recording(&self) -> bool {
        self.data.is_some()
    }

    /// Record an attribute. Ignored once the span has ended.
    pub fn set_attribute(&mut self, attribute: KeyValue) {
        match &mut self.data {
            Some(data) => data.attributes.push(attribute),
            None => {
                log::debug!(
                    "attribute {:?} set on ended span {}, ignored",
                    attribute.key,
                    self.span_context.span_id()
                );
            }
        }
    }

    /// Set the span status. Ignored once the span has ended.
    pub fn set_status(&mut self, status: Status) {
        match &mut self.data {
            Some(data) => data.status = status,
            None => {
                log::debug!(
                    "status set on ended span {}, ignored",
                    self.span_context.span_id()
                );
            }
        }
    }

    /// End the span, forwarding it to the provider's processors.
    ///
    /// Only the first call has any effect.
    pub fn end(&mut self) {
        match self.data.take() {
            Some(mut data) => {
                data.end_time = SystemTime::now();
                if self.provider.is_shutdown() {
                    log::debug!("span ended after provider shutdown, dropped");
                    return;
                }
                for processor in self.provider.span_processors() {
                    processor.on_end(data.clone());
                }
            }
            None => {
                log::debug!("span {} ended twice, ignored", self.span_context.span_id());
            }
        }
    }
}

impl Drop for Span {
    /// Report the span on drop if it was not explicitly ended.
    fn drop(&mut self) {
        if self.data.is_some() {
            self.end();
        }
    }
}
