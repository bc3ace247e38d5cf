//! Fault boundary for UI render trees.
//!
//! A [`FaultBoundary`] wraps the render attempt of a component subtree
//! and intercepts otherwise-unhandled rendering faults — both `Err`
//! results and panics. On the first fault it invokes its fault handler
//! (typically [`emit_error_span`], which records a terminal diagnostic
//! span) and switches permanently to a fixed fallback view; only an
//! external remount recovers it. Diagnostic capture never suppresses the
//! user-visible degradation: a handler failure, or even a handler panic,
//! still lands on the fallback view.

use crate::common::KeyValue;
use crate::trace::TracerProvider;
use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// A rendering fault: what went wrong, and where.
#[derive(Clone, Debug)]
pub struct RenderFault {
    /// Fault classification, e.g. `"Error"`.
    pub name: String,
    /// Human-readable description.
    pub message: String,
    /// Stack trace at the point the fault was raised, or empty when
    /// unavailable.
    pub stack: String,
}

impl RenderFault {
    /// Create a fault, capturing the current backtrace.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        RenderFault {
            name: name.into(),
            message: message.into(),
            stack: Backtrace::force_capture().to_string(),
        }
    }

    /// Create a fault with an explicit (possibly empty) stack.
    pub fn with_stack(
        name: impl Into<String>,
        message: impl Into<String>,
        stack: impl Into<String>,
    ) -> Self {
        RenderFault {
            name: name.into(),
            message: message.into(),
            stack: stack.into(),
        }
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        RenderFault::new("panic", message)
    }
}

impl fmt::Display for RenderFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for RenderFault {}

/// Rendering-location diagnostics supplied by the host UI tree.
#[derive(Clone, Debug, Default)]
pub struct RenderInfo {
    /// The component stack at the fault location, or empty when
    /// unavailable.
    pub component_stack: String,
}

impl RenderInfo {
    /// Create render info with the given component stack.
    pub fn new(component_stack: impl Into<String>) -> Self {
        RenderInfo {
            component_stack: component_stack.into(),
        }
    }
}

/// Handler invoked with the fault and its rendering location.
pub type FaultHandler = Box<dyn FnMut(&RenderFault, &RenderInfo) + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BoundaryState {
    Normal,
    Fallback,
}

/// A fault barrier around a component subtree.
///
/// ```
/// use webtrace::boundary::{FaultBoundary, RenderFault, RenderInfo};
///
/// let mut boundary = FaultBoundary::new("Something went wrong".to_string());
/// let info = RenderInfo::new("    at Widget");
///
/// let ok = boundary.render(&info, || Ok("<widget/>".to_string()));
/// assert_eq!(ok, "<widget/>");
///
/// let degraded = boundary.render(&info, || Err(RenderFault::new("Error", "boom")));
/// assert_eq!(degraded, "Something went wrong");
/// ```
pub struct FaultBoundary<V> {
    fallback: V,
    state: BoundaryState,
    on_fault: Option<FaultHandler>,
}

impl<V: fmt::Debug> fmt::Debug for FaultBoundary<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultBoundary")
            .field("fallback", &self.fallback)
            .field("state", &self.state)
            .finish()
    }
}

impl<V: Clone> FaultBoundary<V> {
    /// Create a boundary with the given static fallback view and no
    /// fault handler.
    pub fn new(fallback: V) -> Self {
        FaultBoundary {
            fallback,
            state: BoundaryState::Normal,
            on_fault: None,
        }
    }

    /// Create a boundary whose handler emits a diagnostic span through
    /// the given provider on every captured fault.
    pub fn with_tracing(fallback: V, provider: TracerProvider) -> Self {
        Self::new(fallback).on_fault(move |fault, info| emit_error_span(&provider, fault, info))
    }

    /// Set the fault handler.
    pub fn on_fault(
        mut self,
        handler: impl FnMut(&RenderFault, &RenderInfo) + Send + 'static,
    ) -> Self {
        self.on_fault = Some(Box::new(handler));
        self
    }

    /// `true` once a fault has been captured.
    pub fn is_degraded(&self) -> bool {
        self.state == BoundaryState::Fallback
    }

    /// Run a render attempt under this boundary.
    ///
    /// Returns the rendered view on success, or the fallback view once
    /// any attempt has faulted. Faults are captured from both `Err`
    /// returns and panics.
    pub fn render<F>(&mut self, info: &RenderInfo, attempt: F) -> V
    where
        F: FnOnce() -> Result<V, RenderFault>,
    {
        if self.state == BoundaryState::Fallback {
            return self.fallback.clone();
        }

        match panic::catch_unwind(AssertUnwindSafe(attempt)) {
            Ok(Ok(view)) => view,
            Ok(Err(fault)) => self.degrade(fault, info),
            Err(payload) => self.degrade(RenderFault::from_panic(payload), info),
        }
    }

    fn degrade(&mut self, fault: RenderFault, info: &RenderInfo) -> V {
        // The handler runs before the state flip, but whatever it does
        // (including panicking) the fallback view is what renders next.
        if let Some(handler) = &mut self.on_fault {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(&fault, info))).is_err() {
                log::warn!("fault handler panicked; fault: {fault}");
            }
        }
        self.state = BoundaryState::Fallback;
        self.fallback.clone()
    }
}

/// Emit one terminal span describing a captured rendering fault.
///
/// The span is named `error`, carries the fault's message, class, stack
/// and component stack, and is ended immediately — it has zero semantic
/// duration and does not wrap any prior operation.
pub fn emit_error_span(provider: &TracerProvider, fault: &RenderFault, info: &RenderInfo) {
    let mut span = provider.tracer("default").start("error");
    span.set_attribute(KeyValue::new("error", true));
    span.set_attribute(KeyValue::new("error.message", fault.message.clone()));
    span.set_attribute(KeyValue::new("error.stack", fault.stack.clone()));
    span.set_attribute(KeyValue::new("error.name", fault.name.clone()));
    span.set_attribute(KeyValue::new(
        "error.componentStack",
        info.component_stack.clone(),
    ));
    span.end();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Value;
    use crate::trace::{InMemorySpanExporter, SimpleSpanProcessor, SpanData};

    const FALLBACK: &str = "Something went wrong";

    fn test_provider() -> (TracerProvider, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_span_processor(SimpleSpanProcessor::new(Box::new(exporter.clone())))
            .build();
        (provider, exporter)
    }

    fn attr(span: &SpanData, key: &str) -> Option<Value> {
        span.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.clone())
    }

    #[test]
    fn fault_emits_error_span_and_falls_back() {
        let (provider, exporter) = test_provider();
        let mut boundary = FaultBoundary::with_tracing(FALLBACK.to_string(), provider);
        let info = RenderInfo::new("    at Widget\n    at App");

        let view = boundary.render(&info, || {
            Err(RenderFault::new("Error", "boom"))
        });
        assert_eq!(view, FALLBACK);
        assert!(boundary.is_degraded());

        let finished = exporter.get_finished_spans().unwrap();
        assert_eq!(finished.len(), 1);
        let span = &finished[0];
        assert_eq!(span.name, "error");
        assert_eq!(attr(span, "error"), Some(Value::Bool(true)));
        assert_eq!(
            attr(span, "error.message"),
            Some(Value::from("boom".to_string()))
        );
        assert_eq!(
            attr(span, "error.name"),
            Some(Value::from("Error".to_string()))
        );
        match attr(span, "error.stack") {
            Some(Value::String(stack)) => assert!(!stack.is_empty()),
            other => panic!("missing error.stack: {other:?}"),
        }
        match attr(span, "error.componentStack") {
            Some(Value::String(stack)) => assert!(stack.contains("Widget")),
            other => panic!("missing error.componentStack: {other:?}"),
        }
        // Terminal span: ended immediately, no wrapped operation.
        assert!(span.end_time >= span.start_time);
    }

    #[test]
    fn successful_render_passes_through() {
        let (provider, _exporter) = test_provider();
        let mut boundary = FaultBoundary::with_tracing(FALLBACK.to_string(), provider);

        let view = boundary.render(&RenderInfo::default(), || Ok("content".to_string()));
        assert_eq!(view, "content");
        assert!(!boundary.is_degraded());
    }

    #[test]
    fn fallback_state_is_terminal() {
        let (provider, exporter) = test_provider();
        let mut boundary = FaultBoundary::with_tracing(FALLBACK.to_string(), provider);
        let info = RenderInfo::default();

        boundary.render(&info, || Err(RenderFault::new("Error", "first")));
        let view = boundary.render(&info, || Ok("recovered".to_string()));

        // No automatic recovery without a remount.
        assert_eq!(view, FALLBACK);
        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
    }

    #[test]
    fn panic_during_render_is_captured() {
        let (provider, exporter) = test_provider();
        let mut boundary = FaultBoundary::with_tracing(FALLBACK.to_string(), provider);

        let view = boundary.render(&RenderInfo::new("    at Widget"), || {
            panic!("render exploded")
        });
        assert_eq!(view, FALLBACK);

        let finished = exporter.get_finished_spans().unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(
            attr(&finished[0], "error.message"),
            Some(Value::from("render exploded".to_string()))
        );
        assert_eq!(
            attr(&finished[0], "error.name"),
            Some(Value::from("panic".to_string()))
        );
    }

    #[test]
    fn handler_failure_still_falls_back() {
        let mut boundary = FaultBoundary::new(FALLBACK.to_string())
            .on_fault(|_fault, _info| panic!("handler exploded"));

        let view = boundary.render(&RenderInfo::default(), || {
            Err(RenderFault::new("Error", "boom"))
        });

        assert_eq!(view, FALLBACK);
        assert!(boundary.is_degraded());
    }
}
