//! A local debug exporter that writes spans to stdout.

use crate::export::{ExportResult, SpanExporter};
use crate::trace::SpanData;
use chrono::{DateTime, Utc};
use core::fmt;
use futures_util::future::BoxFuture;
use std::sync::atomic;

/// An exporter that writes finished spans to stdout, for local diagnostic
/// visibility. Delivery is synchronous and infallible short of a closed
/// stdout.
pub struct ConsoleSpanExporter {
    is_shutdown: atomic::AtomicBool,
    resource_emitted: atomic::AtomicBool,
}

impl fmt::Debug for ConsoleSpanExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConsoleSpanExporter")
    }
}

impl Default for ConsoleSpanExporter {
    fn default() -> Self {
        ConsoleSpanExporter {
            is_shutdown: atomic::AtomicBool::new(false),
            resource_emitted: atomic::AtomicBool::new(false),
        }
    }
}

impl SpanExporter for ConsoleSpanExporter {
    /// Write spans to stdout.
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        if self.is_shutdown.load(atomic::Ordering::SeqCst) {
            return Box::pin(futures_util::future::ready(Err(
                "exporter is shut down".into()
            )));
        }

        // The resource is identical for every span from one provider, so
        // the header is printed once per process.
        if !self.resource_emitted.swap(true, atomic::Ordering::SeqCst) {
            if let Some(span) = batch.first() {
                println!("Resource");
                span.resource.iter().for_each(|(k, v)| {
                    println!("\t {k}={v:?}");
                });
            }
        }

        print_spans(batch);

        Box::pin(futures_util::future::ready(Ok(())))
    }

    fn shutdown(&mut self) {
        self.is_shutdown.store(true, atomic::Ordering::SeqCst);
    }
}

fn print_spans(batch: Vec<SpanData>) {
    for (i, span) in batch.into_iter().enumerate() {
        println!("Span #{i}");
        println!("\t Name: {:?}", &span.name);
        println!("\t TraceId: {}", span.span_context.trace_id());
        println!("\t SpanId: {}", span.span_context.span_id());
        println!("\t ParentSpanId: {}", span.parent_span_id);

        let datetime: DateTime<Utc> = span.start_time.into();
        println!(
            "\t Start time: {}",
            datetime.format("%Y-%m-%d %H:%M:%S%.6f")
        );
        let datetime: DateTime<Utc> = span.end_time.into();
        println!("\t End time: {}", datetime.format("%Y-%m-%d %H:%M:%S%.6f"));
        println!("\t Status: {:?}", &span.status);

        let mut print_header = true;
        for kv in span.attributes.iter() {
            if print_header {
                println!("\t Attributes:");
                print_header = false;
            }
            println!("\t\t {}: {:?}", kv.key, kv.value);
        }
    }
}
