//! Network exporter speaking the collector's trace-ingestion protocol.
//!
//! Finished spans are serialized to a JSON envelope (the producing
//! resource plus the batch of spans) and POSTed to a configured collector
//! endpoint. A static map of custom headers is attached to every request
//! for collector-side authentication or routing; the map is fixed for the
//! exporter's lifetime. Delivery is fire-and-forget: failures are reported
//! to the processor, which logs and moves on.

use crate::common::KeyValue;
use crate::error::{TraceError, TraceResult};
use crate::export::http::{Bytes, HttpClient, ResponseExt};
use crate::export::{ExportResult, SpanExporter};
use crate::resource::Resource;
use crate::trace::{SpanData, SpanId, Status, TraceId};
use http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default collector endpoint for trace ingestion.
pub const DEFAULT_COLLECTOR_ENDPOINT: &str = "http://localhost:4318/v1/traces";

/// Exporter that delivers span batches to a remote collector over HTTP.
pub struct CollectorExporter {
    client: Mutex<Option<Arc<dyn HttpClient>>>,
    endpoint: String,
    headers: HashMap<HeaderName, HeaderValue>,
}

impl fmt::Debug for CollectorExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorExporter")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl CollectorExporter {
    /// Create a [CollectorExporterBuilder] with default configuration.
    pub fn builder() -> CollectorExporterBuilder {
        CollectorExporterBuilder::default()
    }

    /// The configured collector endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_body(batch: &[SpanData]) -> TraceResult<Vec<u8>> {
        // All spans from one provider share the same resource; the
        // envelope carries it once.
        let resource = batch
            .first()
            .map(|span| span.resource.clone())
            .unwrap_or_default();

        let payload = ExportPayload {
            resource: &resource,
            spans: batch.iter().map(WireSpan::from).collect(),
        };

        serde_json::to_vec(&payload).map_err(|err| TraceError::ExportFailed(err.to_string()))
    }
}

impl SpanExporter for CollectorExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> futures_util::future::BoxFuture<'static, ExportResult> {
        let client = match self
            .client
            .lock()
            .map_err(|err| TraceError::Other(err.to_string()))
            .and_then(|guard| match &*guard {
                Some(client) => Ok(Arc::clone(client)),
                None => Err(TraceError::AlreadyShutdown),
            }) {
            Ok(client) => client,
            Err(err) => return Box::pin(std::future::ready(Err(err))),
        };

        let body = match Self::build_body(&batch) {
            Ok(body) => body,
            Err(err) => return Box::pin(std::future::ready(Err(err))),
        };

        let mut request = match http::Request::builder()
            .method(Method::POST)
            .uri(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(Bytes::from(body))
        {
            Ok(request) => request,
            Err(err) => {
                return Box::pin(std::future::ready(Err(TraceError::ExportFailed(
                    err.to_string(),
                ))))
            }
        };

        for (k, v) in &self.headers {
            request.headers_mut().insert(k.clone(), v.clone());
        }

        Box::pin(async move {
            let response = client
                .send_bytes(request)
                .await
                .map_err(|err| TraceError::ExportFailed(err.to_string()))?;

            response
                .error_for_status()
                .map_err(|err| TraceError::ExportFailed(err.to_string()))?;

            Ok(())
        })
    }

    fn shutdown(&mut self) {
        if let Ok(mut client) = self.client.lock() {
            client.take();
        }
    }
}

/// Builder for [CollectorExporter].
pub struct CollectorExporterBuilder {
    endpoint: String,
    headers: HashMap<String, String>,
    client: Option<Arc<dyn HttpClient>>,
}

impl fmt::Debug for CollectorExporterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorExporterBuilder")
            .field("endpoint", &self.endpoint)
            .field("headers", &self.headers)
            .finish()
    }
}

impl Default for CollectorExporterBuilder {
    fn default() -> Self {
        CollectorExporterBuilder {
            endpoint: DEFAULT_COLLECTOR_ENDPOINT.to_string(),
            headers: HashMap::new(),
            #[cfg(feature = "reqwest-client")]
            client: Some(Arc::new(reqwest::Client::new())),
            #[cfg(not(feature = "reqwest-client"))]
            client: None,
        }
    }
}

impl CollectorExporterBuilder {
    /// Set the collector endpoint URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Add custom headers sent with every export request.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Assign a client implementation.
    pub fn with_http_client<T: HttpClient + 'static>(mut self, client: T) -> Self {
        self.client = Some(Arc::new(client));
        self
    }

    /// Build the exporter.
    ///
    /// Fails if no HTTP client is available (the `reqwest-client` feature
    /// provides a default one).
    pub fn build(self) -> TraceResult<CollectorExporter> {
        let client = self
            .client
            .ok_or_else(|| TraceError::Other("no http client configured".to_string()))?;

        let headers = self
            .headers
            .into_iter()
            .filter_map(|(k, v)| {
                Some((
                    HeaderName::from_str(&k).ok()?,
                    HeaderValue::from_str(&v).ok()?,
                ))
            })
            .collect();

        Ok(CollectorExporter {
            client: Mutex::new(Some(client)),
            endpoint: self.endpoint,
            headers,
        })
    }
}

#[derive(Serialize)]
struct ExportPayload<'a> {
    resource: &'a Resource,
    spans: Vec<WireSpan<'a>>,
}

#[derive(Serialize)]
struct WireSpan<'a> {
    trace_id: TraceId,
    span_id: SpanId,
    parent_span_id: SpanId,
    name: &'a str,
    start_time_unix_nano: u128,
    end_time_unix_nano: u128,
    attributes: &'a [KeyValue],
    status: &'a Status,
}

impl<'a> From<&'a SpanData> for WireSpan<'a> {
    fn from(span: &'a SpanData) -> Self {
        WireSpan {
            trace_id: span.span_context.trace_id(),
            span_id: span.span_context.span_id(),
            parent_span_id: span.parent_span_id,
            name: &span.name,
            start_time_unix_nano: unix_nanos(span.start_time),
            end_time_unix_nano: unix_nanos(span.end_time),
            attributes: &span.attributes,
            status: &span.status,
        }
    }
}

fn unix_nanos(time: SystemTime) -> u128 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::http::{Bytes, HttpError, Request, Response};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct RecordingClient {
        requests: Arc<StdMutex<Vec<Request<Bytes>>>>,
    }

    #[async_trait]
    impl HttpClient for RecordingClient {
        async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
            self.requests.lock().unwrap().push(request);
            Ok(Response::builder().status(200).body(Bytes::new())?)
        }
    }

    fn test_span(name: &'static str) -> SpanData {
        let start = SystemTime::now();
        SpanData {
            span_context: crate::trace::SpanContext::new(
                TraceId::from(0xabc_u128),
                SpanId::from(0x1_u64),
            ),
            parent_span_id: SpanId::INVALID,
            name: name.into(),
            start_time: start,
            end_time: start + Duration::from_millis(5),
            attributes: vec![KeyValue::new("http.method", "GET")],
            status: Status::Unset,
            resource: Resource::builder().with_service_name("otelpoc").build(),
        }
    }

    #[test]
    fn posts_json_with_custom_headers() {
        let requests = Arc::new(StdMutex::new(Vec::new()));
        let client = RecordingClient {
            requests: requests.clone(),
        };

        let mut exporter = CollectorExporter::builder()
            .with_endpoint("http://collector:4318/v1/traces")
            .with_headers(HashMap::from([(
                "x-collector-key".to_string(),
                "secret".to_string(),
            )]))
            .with_http_client(client)
            .build()
            .unwrap();

        futures_executor::block_on(exporter.export(vec![test_span("operation")])).unwrap();

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.uri(), "http://collector:4318/v1/traces");
        assert_eq!(
            request.headers().get("x-collector-key").unwrap(),
            "secret"
        );

        let payload: serde_json::Value = serde_json::from_slice(request.body()).unwrap();
        assert_eq!(payload["resource"]["service.name"], "otelpoc");
        assert_eq!(payload["spans"][0]["name"], "operation");
        assert_eq!(
            payload["spans"][0]["trace_id"],
            "00000000000000000000000000000abc"
        );
    }

    #[test]
    fn export_after_shutdown_fails() {
        let mut exporter = CollectorExporter::builder()
            .with_http_client(RecordingClient::default())
            .build()
            .unwrap();
        SpanExporter::shutdown(&mut exporter);

        let result = futures_executor::block_on(exporter.export(vec![test_span("late")]));
        assert!(matches!(result, Err(TraceError::AlreadyShutdown)));
    }
}
