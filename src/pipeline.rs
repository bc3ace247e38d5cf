//! Startup wiring for the full tracing pipeline.
//!
//! [`init_pipeline`] performs the one-time bootstrap: build the resource,
//! compose the console and collector export paths, install the provider
//! as the process-wide default, and activate the fetch instrumentation.
//! Both processors receive every finished span — the console path
//! immediately, the collector path batched.

use crate::boundary::FaultBoundary;
use crate::error::TraceResult;
use crate::export::http::HttpClient;
use crate::export::otlp::{CollectorExporter, DEFAULT_COLLECTOR_ENDPOINT};
use crate::export::stdout::ConsoleSpanExporter;
use crate::instrumentation::fetch::{FetchInstrumentation, TracedClient};
use crate::instrumentation::{register_instrumentations, FetchOptions, Instrumentation};
use crate::resource::Resource;
use crate::trace::TracerProvider;
use regex::Regex;
use std::collections::HashMap;

/// Configuration consumed once at startup.
#[derive(Debug)]
pub struct PipelineConfig {
    /// Service name recorded on the resource.
    pub service_name: String,
    /// Collector endpoint URL for the network export path.
    pub collector_endpoint: String,
    /// Custom headers sent with every collector request, for
    /// authentication or routing. Empty by default.
    pub collector_headers: HashMap<String, String>,
    /// URL patterns excluded from fetch instrumentation. Defaults to
    /// `localhost`, which covers the collector itself during local
    /// development and prevents self-instrumentation loops.
    pub fetch_ignore_urls: Vec<Regex>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            service_name: "webtrace".to_string(),
            collector_endpoint: DEFAULT_COLLECTOR_ENDPOINT.to_string(),
            collector_headers: HashMap::new(),
            fetch_ignore_urls: vec![Regex::new("localhost").expect("static pattern")],
        }
    }
}

/// The initialized tracing pipeline.
#[derive(Debug)]
pub struct Pipeline {
    provider: TracerProvider,
    fetch: FetchInstrumentation,
}

impl Pipeline {
    /// The provider owning this pipeline.
    pub fn provider(&self) -> &TracerProvider {
        &self.provider
    }

    /// Wrap an HTTP client with the pipeline's fetch instrumentation.
    pub fn traced_client<C: HttpClient>(&self, inner: C) -> TracedClient<C> {
        self.fetch
            .wrap(inner)
            .expect("fetch instrumentation installed at init")
    }

    /// A fault boundary whose captured faults are reported through this
    /// pipeline's provider.
    pub fn fault_boundary<V: Clone>(&self, fallback: V) -> FaultBoundary<V> {
        FaultBoundary::with_tracing(fallback, self.provider.clone())
    }
}

/// Initialize the tracing pipeline and register its provider as the
/// process-wide default.
///
/// Fails if a provider is already registered or no HTTP client is
/// available for the collector exporter.
pub fn init_pipeline(config: PipelineConfig) -> TraceResult<Pipeline> {
    let resource = Resource::builder()
        .with_service_name(config.service_name)
        .build();

    let collector = CollectorExporter::builder()
        .with_endpoint(config.collector_endpoint)
        .with_headers(config.collector_headers)
        .build()?;

    let provider = TracerProvider::builder()
        .with_resource(resource)
        .with_simple_exporter(ConsoleSpanExporter::default())
        .with_batch_exporter(collector)
        .build();

    provider.register()?;

    let mut fetch = FetchInstrumentation::new(FetchOptions {
        ignore_urls: config.fetch_ignore_urls,
    });
    let mut instrumentations: Vec<&mut dyn Instrumentation> = vec![&mut fetch];
    register_instrumentations(&mut instrumentations, &provider);

    Ok(Pipeline { provider, fetch })
}
