//! Execution-scoped propagation of the active span.
//!
//! A [`Context`] is an immutable value carrying the currently active span
//! (and any other execution-scoped values) along a call path. The current
//! context is tracked per thread; [`Context::attach`] makes a context
//! current and returns a guard that restores the previous one when
//! dropped, giving stack-like scoping where the most recently entered
//! context wins.
//!
//! For asynchronous continuations the context must be captured when the
//! continuation is *scheduled* and restored when it *runs*, not inherited
//! from whatever happens to be current at execution time. The
//! [`FutureExt::with_context`] wrapper does exactly that: it snapshots a
//! context and re-attaches it around every poll of the wrapped future.
//!
//! # Examples
//!
//! ```
//! use webtrace::Context;
//!
//! #[derive(Debug, PartialEq)]
//! struct ValueA(&'static str);
//!
//! let _guard = Context::current_with_value(ValueA("a")).attach();
//!
//! let current = Context::current();
//! assert_eq!(current.get::<ValueA>(), Some(&ValueA("a")));
//! ```

use crate::trace::SpanContext;
use futures_core::Stream;
use pin_project_lite::pin_project;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasherDefault, Hasher};
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

thread_local! {
    static CURRENT_CONTEXT: RefCell<Context> = RefCell::new(Context::default());
}

/// An execution-scoped collection of values, including the active span.
///
/// Contexts are immutable; write operations return a new context holding
/// the original values plus the addition.
#[derive(Clone, Default)]
pub struct Context {
    span: Option<Arc<SpanContext>>,
    entries: HashMap<TypeId, Arc<dyn Any + Sync + Send>, BuildHasherDefault<IdHasher>>,
}

impl Context {
    /// Creates an empty `Context`.
    pub fn new() -> Self {
        Context::default()
    }

    /// Returns an immutable snapshot of the current thread's context.
    pub fn current() -> Self {
        Context::map_current(|cx| cx.clone())
    }

    /// Applies a function to the current context, returning its value.
    ///
    /// Avoids cloning the current context when only a read is needed.
    pub fn map_current<T>(f: impl FnOnce(&Context) -> T) -> T {
        CURRENT_CONTEXT.with(|cx| f(&cx.borrow()))
    }

    /// Returns a clone of the current context with the given value added.
    pub fn current_with_value<T: 'static + Send + Sync>(value: T) -> Self {
        Context::current().with_value(value)
    }

    /// Returns a clone of the current context with the given span active.
    pub fn current_with_span(span: SpanContext) -> Self {
        Context::current().with_span(span)
    }

    /// Returns a copy of this context with the given value included.
    ///
    /// Values are keyed by type; inserting a value of an already-present
    /// type replaces it.
    pub fn with_value<T: 'static + Send + Sync>(&self, value: T) -> Self {
        let mut new_context = self.clone();
        new_context
            .entries
            .insert(TypeId::of::<T>(), Arc::new(value));
        new_context
    }

    /// Returns a copy of this context with the given span active.
    pub fn with_span(&self, span: SpanContext) -> Self {
        Context {
            span: Some(Arc::new(span)),
            entries: self.entries.clone(),
        }
    }

    /// Returns a reference to the entry for the corresponding value type.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|rc| rc.downcast_ref())
    }

    /// The active span of this context, if any.
    pub fn span(&self) -> Option<&SpanContext> {
        self.span.as_deref()
    }

    /// Returns `true` if a span is active in this context.
    pub fn has_active_span(&self) -> bool {
        self.span.is_some()
    }

    /// Makes this context the current one, returning a guard that restores
    /// the previous context on drop.
    pub fn attach(self) -> ContextGuard {
        let previous_cx = CURRENT_CONTEXT
            .try_with(|current| current.replace(self))
            .ok();

        ContextGuard {
            previous_cx,
            _marker: PhantomData,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("span", &self.span)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// A guard that resets the current context to the prior context when dropped.
#[allow(missing_debug_implementations)]
pub struct ContextGuard {
    previous_cx: Option<Context>,
    // ensure this type is !Send as it relies on thread locals
    _marker: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(previous_cx) = self.previous_cx.take() {
            let _ = CURRENT_CONTEXT.try_with(|current| current.replace(previous_cx));
        }
    }
}

pin_project! {
    /// A future with an associated context that is current while it polls.
    #[derive(Clone, Debug)]
    pub struct WithContext<T> {
        #[pin]
        inner: T,
        cx: Context,
    }
}

impl<T: std::future::Future> std::future::Future for WithContext<T> {
    type Output = T::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.cx.clone().attach();

        this.inner.poll(task_cx)
    }
}

impl<T: Stream> Stream for WithContext<T> {
    type Item = T::Item;

    fn poll_next(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let _guard = this.cx.clone().attach();
        T::poll_next(this.inner, task_cx)
    }
}

impl<T: Sized> FutureExt for T {}

/// Extension trait allowing futures and streams to carry a captured
/// context.
pub trait FutureExt: Sized {
    /// Attaches the provided [`Context`] to this future or stream,
    /// returning a `WithContext` wrapper.
    ///
    /// The attached context is set as current every time the wrapped
    /// value is polled, regardless of what is current at that moment.
    fn with_context(self, cx: Context) -> WithContext<Self> {
        WithContext { inner: self, cx }
    }

    /// Attaches the current [`Context`] to this future or stream.
    ///
    /// This is the schedule-time capture: the context observed here is the
    /// one restored at execution time.
    fn with_current_context(self) -> WithContext<Self> {
        let cx = Context::current();
        self.with_context(cx)
    }
}

/// With TypeIds as keys, there's no need to hash them. They are already
/// hashes themselves, coming from the compiler. The IdHasher just holds
/// the u64 of the TypeId.
#[derive(Clone, Default, Debug)]
struct IdHasher(u64);

impl Hasher for IdHasher {
    fn write(&mut self, _: &[u8]) {
        unreachable!("TypeId calls write_u64");
    }

    #[inline]
    fn write_u64(&mut self, id: u64) {
        self.0 = id;
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{SpanId, TraceId};

    fn span_context(n: u64) -> SpanContext {
        SpanContext::new(TraceId::from(n as u128), SpanId::from(n))
    }

    #[test]
    fn nested_contexts() {
        #[derive(Debug, PartialEq)]
        struct ValueA(&'static str);
        #[derive(Debug, PartialEq)]
        struct ValueB(u64);

        let _outer_guard = Context::new().with_value(ValueA("a")).attach();

        let current = Context::current();
        assert_eq!(current.get(), Some(&ValueA("a")));
        assert_eq!(current.get::<ValueB>(), None);

        {
            let _inner_guard = Context::current_with_value(ValueB(42)).attach();
            let current = Context::current();
            assert_eq!(current.get(), Some(&ValueA("a")));
            assert_eq!(current.get(), Some(&ValueB(42)));
        }

        // Resets to only value `a` when inner guard is dropped
        let current = Context::current();
        assert_eq!(current.get(), Some(&ValueA("a")));
        assert_eq!(current.get::<ValueB>(), None);
    }

    #[test]
    fn active_span_scoping() {
        assert!(!Context::current().has_active_span());

        let outer = span_context(1);
        let _outer_guard = Context::current_with_span(outer.clone()).attach();
        assert_eq!(Context::current().span(), Some(&outer));

        {
            let inner = span_context(2);
            let _inner_guard = Context::current_with_span(inner.clone()).attach();
            assert_eq!(Context::current().span(), Some(&inner));
        }

        assert_eq!(Context::current().span(), Some(&outer));
    }

    #[test]
    fn future_observes_scheduling_context() {
        let scheduled_under = span_context(7);

        // Capture happens here, while `scheduled_under` is active.
        let continuation = {
            let _guard = Context::current_with_span(scheduled_under.clone()).attach();
            async {
                Context::map_current(|cx| cx.span().cloned())
            }
            .with_current_context()
        };

        // A different span becomes active on the main path before the
        // continuation runs.
        let _other_guard = Context::current_with_span(span_context(8)).attach();

        let observed = futures_executor::block_on(continuation);
        assert_eq!(observed, Some(scheduled_under));
    }
}
