//! Client-side distributed tracing for web applications.
//!
//! `webtrace` is a pure producer of trace data: it creates spans,
//! fans them out to composed span processors (an immediate console path
//! for local debugging and a batched network path to a collector), and
//! propagates the active span across asynchronous continuations. A
//! [`FaultBoundary`] additionally converts otherwise-unhandled rendering
//! faults into terminal diagnostic spans while the user sees a fixed
//! fallback view.
//!
//! # Getting started
//!
//! ```no_run
//! use webtrace::pipeline::{init_pipeline, PipelineConfig};
//!
//! fn main() -> webtrace::TraceResult<()> {
//!     let pipeline = init_pipeline(PipelineConfig {
//!         service_name: "otelpoc".to_string(),
//!         ..PipelineConfig::default()
//!     })?;
//!
//!     let tracer = pipeline.provider().tracer("app");
//!     tracer.in_span("startup", |_span| {
//!         // traced work
//!     });
//!
//!     let mut boundary = pipeline.fault_boundary("Something went wrong".to_string());
//!     # let _ = &mut boundary;
//!     Ok(())
//! }
//! ```
//!
//! # Pipeline shape
//!
//! ```ascii
//!                         +----------------------+   +---------------------+
//!                         |                      |   |                     |
//!   Tracer::start()       | SimpleSpanProcessor  +---> ConsoleSpanExporter |
//!   Span::end()     +-----> BatchSpanProcessor   +---> CollectorExporter   |
//!                         |                      |   |                     |
//!                         +----------------------+   +---------------------+
//! ```
//!
//! Both processors observe every finished span; they differ only in
//! delivery timing. Delivery to the collector is at-most-once — batches
//! are cleared whether or not export succeeds, and failures never reach
//! the application.
//!
//! [`FaultBoundary`]: boundary::FaultBoundary

#![warn(missing_docs)]

pub mod boundary;
mod common;
pub mod context;
mod error;
pub mod export;
pub mod global;
pub mod instrumentation;
pub mod pipeline;
mod resource;
pub mod trace;

pub use common::{Key, KeyValue, Value};
pub use context::{Context, ContextGuard, FutureExt};
pub use error::{TraceError, TraceResult};
pub use resource::{Resource, ResourceBuilder, SERVICE_NAME};
