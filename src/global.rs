//! Process-wide default tracer provider.
//!
//! The default provider is installed exactly once, at startup, and lives
//! for the process lifetime. There is no teardown or swap; anything that
//! needs tracing after startup reaches it through [`tracer_provider`] or
//! [`tracer`].

use crate::error::{TraceError, TraceResult};
use crate::trace::{Tracer, TracerProvider};
use std::sync::OnceLock;

static GLOBAL_TRACER_PROVIDER: OnceLock<TracerProvider> = OnceLock::new();

/// Install the given provider as the process-wide default.
///
/// Fails with [`TraceError::AlreadyRegistered`] if a provider was already
/// installed; the existing provider is left in place.
pub fn set_tracer_provider(provider: TracerProvider) -> TraceResult<()> {
    GLOBAL_TRACER_PROVIDER
        .set(provider)
        .map_err(|_| TraceError::AlreadyRegistered)
}

/// The installed default provider, if any.
pub fn tracer_provider() -> Option<TracerProvider> {
    GLOBAL_TRACER_PROVIDER.get().cloned()
}

/// A tracer from the default provider, if one is installed.
pub fn tracer(name: &'static str) -> Option<Tracer> {
    tracer_provider().map(|provider| provider.tracer(name))
}
