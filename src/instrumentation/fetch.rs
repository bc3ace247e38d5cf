//! Network-fetch instrumentation.
//!
//! Wraps an [`HttpClient`] so that every outgoing request is bracketed by
//! exactly one span, unless its URL matches an exclusion pattern — in
//! which case the request passes through untouched and no span is
//! created at all. While the request is in flight its span is the
//! ambient current context, so any work it triggers parents correctly.

use crate::context::{Context, FutureExt};
use crate::export::http::{Bytes, HttpClient, HttpError, Request, Response};
use crate::instrumentation::{FetchOptions, Instrumentation};
use crate::trace::{Status, Tracer, TracerProvider};
use crate::KeyValue;
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;

/// Instrumentation scope name used for fetch spans.
const FETCH_SCOPE: &str = "webtrace-fetch";

/// Installer for the network-fetch category.
///
/// After [`install`] the instrumentation can [`wrap`] any number of HTTP
/// clients; all of them share the tracer issued by the provider the
/// registry activated this instrumentation against.
///
/// [`install`]: Instrumentation::install
/// [`wrap`]: FetchInstrumentation::wrap
#[derive(Debug, Default)]
pub struct FetchInstrumentation {
    options: FetchOptions,
    tracer: Option<Tracer>,
}

impl FetchInstrumentation {
    /// Create a fetch instrumentation with the given options.
    pub fn new(options: FetchOptions) -> Self {
        FetchInstrumentation {
            options,
            tracer: None,
        }
    }

    /// Wrap an HTTP client so its requests are traced.
    ///
    /// Returns `None` if the instrumentation has not been installed yet.
    pub fn wrap<C: HttpClient>(&self, inner: C) -> Option<TracedClient<C>> {
        let tracer = self.tracer.clone()?;
        Some(TracedClient {
            inner,
            tracer,
            ignore_urls: Arc::new(self.options.ignore_urls.clone()),
        })
    }
}

impl Instrumentation for FetchInstrumentation {
    fn name(&self) -> &'static str {
        "fetch"
    }

    fn install(&mut self, provider: &TracerProvider) {
        self.tracer = Some(provider.tracer(FETCH_SCOPE));
    }
}

/// An [`HttpClient`] wrapper that traces every non-excluded request.
#[derive(Debug)]
pub struct TracedClient<C> {
    inner: C,
    tracer: Tracer,
    ignore_urls: Arc<Vec<Regex>>,
}

impl<C> TracedClient<C> {
    fn is_ignored(&self, url: &str) -> bool {
        self.ignore_urls.iter().any(|pattern| pattern.is_match(url))
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for TracedClient<C> {
    async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
        let url = request.uri().to_string();
        if self.is_ignored(&url) {
            return self.inner.send_bytes(request).await;
        }

        let mut span = self.tracer.start(format!("HTTP {}", request.method()));
        span.set_attribute(KeyValue::new("http.url", url));
        span.set_attribute(KeyValue::new(
            "http.method",
            request.method().as_str().to_string(),
        ));

        let cx = Context::current_with_span(span.span_context().clone());
        let result = self.inner.send_bytes(request).with_context(cx).await;

        match &result {
            Ok(response) => {
                span.set_attribute(KeyValue::new(
                    "http.status_code",
                    response.status().as_u16() as i64,
                ));
                if !response.status().is_success() {
                    span.set_status(Status::error(format!(
                        "request failed with status {}",
                        response.status()
                    )));
                }
            }
            Err(err) => span.set_status(Status::error(err.to_string())),
        }
        span.end();

        result
    }
}
