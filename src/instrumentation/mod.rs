//! Auto-instrumentation registry.
//!
//! Instrumentations install hooks around recognized operation categories
//! (network fetches, document load, resource load) that automatically
//! start a span when the operation begins and end it when it completes or
//! fails. This module defines the contract instrumentations are
//! configured with and the registry that activates them against a
//! [`TracerProvider`]; the fetch category ships in [`fetch`].
//!
//! Per-category options are grouped in [`InstrumentationOptions`]. The
//! one documented option is the fetch category's URL exclusion list:
//! operations whose target URL matches any pattern produce no span at
//! all. This keeps the pipeline from instrumenting its own collector
//! traffic (which would loop forever) and silences local development
//! noise.

pub mod fetch;

use crate::trace::TracerProvider;
use regex::Regex;
use std::fmt::Debug;

/// A hook installer for one category of automatically traced operations.
pub trait Instrumentation: Debug {
    /// The category name, e.g. `"fetch"`.
    fn name(&self) -> &'static str;

    /// Activate this instrumentation against the given provider. Called
    /// once, at registration time.
    fn install(&mut self, provider: &TracerProvider);
}

/// Options for the network-fetch category.
#[derive(Clone, Debug, Default)]
pub struct FetchOptions {
    /// URL patterns that are never wrapped in a span. An operation whose
    /// target URL matches any pattern produces no span at all, not even a
    /// short-lived one.
    pub ignore_urls: Vec<Regex>,
}

/// Per-category instrumentation options.
///
/// Categories added later carry their options here, keyed by field.
#[derive(Clone, Debug, Default)]
pub struct InstrumentationOptions {
    /// Options for the network-fetch category.
    pub fetch: FetchOptions,
}

/// Activate each instrumentation against the provider, in order.
pub fn register_instrumentations(
    instrumentations: &mut [&mut dyn Instrumentation],
    provider: &TracerProvider,
) {
    for instrumentation in instrumentations {
        instrumentation.install(provider);
        log::debug!("installed {} instrumentation", instrumentation.name());
    }
}
