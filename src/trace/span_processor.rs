//! Span processors.
//!
//! A span processor is a pipeline stage between the tracer and an
//! exporter. On span end it receives the finished [`SpanData`] and drives
//! it to its exporter according to its own timing policy. Processors are
//! registered on a [`TracerProvider`] and invoked in registration order;
//! multiple processors fan out — every registered processor observes
//! every finished span.
//!
//! Two policies are provided:
//!
//! - [`SimpleSpanProcessor`] forwards each span synchronously, one by
//!   one, for local diagnostic sinks.
//! - [`BatchSpanProcessor`] accumulates spans in a buffer owned by a
//!   dedicated worker thread and flushes when a size threshold is
//!   reached or a delay elapses, whichever first. The buffer is cleared
//!   after every flush attempt regardless of delivery outcome; spans are
//!   never redelivered.
//!
//! [`TracerProvider`]: crate::trace::TracerProvider

use crate::error::{TraceError, TraceResult};
use crate::export::SpanExporter;
use crate::trace::SpanData;
use futures_executor::block_on;
use std::cmp::min;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use std::{env, str::FromStr};

/// Maximum queue size for the batch span processor.
pub(crate) const WEBTRACE_BSP_MAX_QUEUE_SIZE: &str = "WEBTRACE_BSP_MAX_QUEUE_SIZE";
/// Default maximum queue size.
pub(crate) const WEBTRACE_BSP_MAX_QUEUE_SIZE_DEFAULT: usize = 2_048;
/// Delay interval between two consecutive exports, in milliseconds.
pub(crate) const WEBTRACE_BSP_SCHEDULE_DELAY: &str = "WEBTRACE_BSP_SCHEDULE_DELAY";
/// Default delay interval between two consecutive exports.
pub(crate) const WEBTRACE_BSP_SCHEDULE_DELAY_DEFAULT: u64 = 5_000;
/// Maximum batch size, must be less than or equal to the max queue size.
pub(crate) const WEBTRACE_BSP_MAX_EXPORT_BATCH_SIZE: &str = "WEBTRACE_BSP_MAX_EXPORT_BATCH_SIZE";
/// Default maximum batch size.
pub(crate) const WEBTRACE_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT: usize = 512;

/// A pipeline stage that receives finished spans and forwards them to an
/// exporter under its own timing policy.
///
/// `on_end` is called synchronously within `Span::end`, so it must not
/// block the caller materially or panic.
pub trait SpanProcessor: Send + Sync + Debug {
    /// Called once for every finished span, in end order.
    fn on_end(&self, span: SpanData);

    /// Export any buffered spans immediately.
    fn force_flush(&self) -> TraceResult<()>;

    /// Shut down the processor, flushing buffered spans first.
    ///
    /// Implementations must tolerate repeated calls.
    fn shutdown(&self) -> TraceResult<()>;
}

/// A [SpanProcessor] that forwards each finished span to its exporter as
/// soon as it ends, without batching. Intended for local debug sinks;
/// export failures are swallowed and logged.
#[derive(Debug)]
pub struct SimpleSpanProcessor {
    exporter: Mutex<Box<dyn SpanExporter>>,
}

impl SimpleSpanProcessor {
    /// Create a new [SimpleSpanProcessor] using the provided exporter.
    pub fn new(exporter: Box<dyn SpanExporter>) -> Self {
        Self {
            exporter: Mutex::new(exporter),
        }
    }
}

impl SpanProcessor for SimpleSpanProcessor {
    fn on_end(&self, span: SpanData) {
        let result = self
            .exporter
            .lock()
            .map_err(|_| TraceError::Other("SimpleSpanProcessor mutex poison".into()))
            .and_then(|mut exporter| block_on(exporter.export(vec![span])));

        if let Err(err) = result {
            log::debug!("simple processor export failed: {err}");
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        // Nothing is buffered.
        Ok(())
    }

    fn shutdown(&self) -> TraceResult<()> {
        if let Ok(mut exporter) = self.exporter.lock() {
            exporter.shutdown();
            Ok(())
        } else {
            Err(TraceError::Other(
                "SimpleSpanProcessor mutex poison at shutdown".into(),
            ))
        }
    }
}

/// Messages exchanged between the caller and the worker thread.
#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
enum BatchMessage {
    ExportSpan(SpanData),
    ForceFlush(SyncSender<TraceResult<()>>),
    Shutdown(SyncSender<TraceResult<()>>),
}

/// A batching [SpanProcessor] with a dedicated worker thread.
///
/// The worker exclusively owns the span buffer, so no locking is needed
/// around it; callers hand spans over through a bounded channel. A flush
/// happens when the batch size threshold is reached or the scheduled
/// delay elapses, whichever comes first. The buffer is emptied after
/// every flush attempt — delivery is at-most-once and failed batches are
/// not retried, which decouples span production from collector latency.
#[derive(Debug)]
pub struct BatchSpanProcessor {
    message_sender: SyncSender<BatchMessage>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    forceflush_timeout: Duration,
    shutdown_timeout: Duration,
    is_shutdown: AtomicBool,
    dropped_span_count: Arc<AtomicUsize>,
}

impl BatchSpanProcessor {
    /// Creates a new `BatchSpanProcessor` with the given exporter and
    /// configuration, spawning its worker thread.
    pub fn new<E>(mut exporter: E, config: BatchConfig) -> Self
    where
        E: SpanExporter + 'static,
    {
        let (message_sender, message_receiver) = sync_channel(config.max_queue_size);

        let handle = thread::Builder::new()
            .name("WebtraceBatchSpanProcessor".to_string())
            .spawn(move || {
                let mut spans: Vec<SpanData> = Vec::with_capacity(config.max_export_batch_size);
                let mut last_export_time = Instant::now();

                let flush =
                    |exporter: &mut E, spans: &mut Vec<SpanData>, last_export: &mut Instant| {
                        // Cleared regardless of outcome: at-most-once delivery.
                        let batch = spans.split_off(0);
                        *last_export = Instant::now();
                        if batch.is_empty() {
                            return Ok(());
                        }
                        let result = block_on(exporter.export(batch));
                        if let Err(err) = &result {
                            log::debug!("batch export failed: {err}");
                        }
                        result
                    };

                loop {
                    let timeout = config
                        .scheduled_delay
                        .saturating_sub(last_export_time.elapsed());
                    match message_receiver.recv_timeout(timeout) {
                        Ok(BatchMessage::ExportSpan(span)) => {
                            spans.push(span);
                            if spans.len() >= config.max_export_batch_size
                                || last_export_time.elapsed() >= config.scheduled_delay
                            {
                                let _ = flush(&mut exporter, &mut spans, &mut last_export_time);
                            }
                        }
                        Ok(BatchMessage::ForceFlush(sender)) => {
                            let result = flush(&mut exporter, &mut spans, &mut last_export_time);
                            let _ = sender.send(result);
                        }
                        Ok(BatchMessage::Shutdown(sender)) => {
                            let result = flush(&mut exporter, &mut spans, &mut last_export_time);
                            exporter.shutdown();
                            let _ = sender.send(result);
                            break;
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if last_export_time.elapsed() >= config.scheduled_delay {
                                let _ = flush(&mut exporter, &mut spans, &mut last_export_time);
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            log::debug!("batch channel disconnected, worker exiting");
                            break;
                        }
                    }
                }
            })
            .expect("failed to spawn batch processor thread");

        Self {
            message_sender,
            handle: Mutex::new(Some(handle)),
            forceflush_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
            is_shutdown: AtomicBool::new(false),
            dropped_span_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a [BatchSpanProcessorBuilder] for the given exporter.
    pub fn builder<E>(exporter: E) -> BatchSpanProcessorBuilder<E>
    where
        E: SpanExporter + 'static,
    {
        BatchSpanProcessorBuilder {
            exporter,
            config: BatchConfig::default(),
        }
    }
}

impl SpanProcessor for BatchSpanProcessor {
    fn on_end(&self, span: SpanData) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            log::debug!("batch processor is shut down, dropping span");
            return;
        }
        let result = self.message_sender.try_send(BatchMessage::ExportSpan(span));

        if result.is_err() {
            // Warn on the first drop only; later drops are counted
            // silently to avoid flooding.
            if self.dropped_span_count.fetch_add(1, Ordering::Relaxed) == 0 {
                log::warn!("batch processor queue full, dropping spans");
            }
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }
        let (sender, receiver) = sync_channel(1);
        self.message_sender
            .try_send(BatchMessage::ForceFlush(sender))
            .map_err(|_| TraceError::Other("failed to send ForceFlush message".into()))?;

        receiver
            .recv_timeout(self.forceflush_timeout)
            .map_err(|_| TraceError::ExportTimedOut(self.forceflush_timeout))?
    }

    fn shutdown(&self) -> TraceResult<()> {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }
        let dropped = self.dropped_span_count.load(Ordering::Relaxed);
        if dropped > 0 {
            log::warn!("batch processor dropped {dropped} spans in total");
        }
        let (sender, receiver) = sync_channel(1);
        self.message_sender
            .try_send(BatchMessage::Shutdown(sender))
            .map_err(|_| TraceError::Other("failed to send Shutdown message".into()))?;

        let result = receiver
            .recv_timeout(self.shutdown_timeout)
            .map_err(|_| TraceError::ExportTimedOut(self.shutdown_timeout))?;
        if let Some(handle) = self.handle.lock().expect("lock poisoned").take() {
            handle
                .join()
                .map_err(|_| TraceError::Other("batch worker thread panicked".into()))?;
        }
        result
    }
}

/// Builder for [BatchSpanProcessor].
#[derive(Debug)]
pub struct BatchSpanProcessorBuilder<E>
where
    E: SpanExporter + 'static,
{
    exporter: E,
    config: BatchConfig,
}

impl<E> BatchSpanProcessorBuilder<E>
where
    E: SpanExporter + 'static,
{
    /// Set the [BatchConfig] for this builder.
    pub fn with_batch_config(self, config: BatchConfig) -> Self {
        BatchSpanProcessorBuilder { config, ..self }
    }

    /// Build a new [BatchSpanProcessor].
    pub fn build(self) -> BatchSpanProcessor {
        BatchSpanProcessor::new(self.exporter, self.config)
    }
}

/// Batch span processor configuration.
///
/// Use [`BatchConfigBuilder`] to construct an instance.
#[derive(Debug)]
pub struct BatchConfig {
    /// Maximum number of spans queued for delayed processing before new
    /// spans are dropped.
    pub(crate) max_queue_size: usize,

    /// Delay interval between two consecutive flushes.
    pub(crate) scheduled_delay: Duration,

    /// Number of buffered spans that triggers an immediate flush.
    pub(crate) max_export_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfigBuilder::default().build()
    }
}

/// A builder for creating [`BatchConfig`] instances.
#[derive(Debug)]
pub struct BatchConfigBuilder {
    max_queue_size: usize,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
}

impl Default for BatchConfigBuilder {
    /// Defaults, overridden by the `WEBTRACE_BSP_MAX_QUEUE_SIZE`,
    /// `WEBTRACE_BSP_SCHEDULE_DELAY` and
    /// `WEBTRACE_BSP_MAX_EXPORT_BATCH_SIZE` environment variables when
    /// set.
    fn default() -> Self {
        BatchConfigBuilder {
            max_queue_size: WEBTRACE_BSP_MAX_QUEUE_SIZE_DEFAULT,
            scheduled_delay: Duration::from_millis(WEBTRACE_BSP_SCHEDULE_DELAY_DEFAULT),
            max_export_batch_size: WEBTRACE_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT,
        }
        .init_from_env_vars()
    }
}

impl BatchConfigBuilder {
    /// Set the maximum queue size. Spans arriving at a full queue are
    /// dropped. The default is 2048.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Set the flush size threshold. The default is 512.
    pub fn with_max_export_batch_size(mut self, max_export_batch_size: usize) -> Self {
        self.max_export_batch_size = max_export_batch_size;
        self
    }

    /// Set the flush delay threshold. The default is 5 seconds.
    pub fn with_scheduled_delay(mut self, scheduled_delay: Duration) -> Self {
        self.scheduled_delay = scheduled_delay;
        self
    }

    /// Build a `BatchConfig`, capping `max_export_batch_size` at
    /// `max_queue_size`.
    pub fn build(self) -> BatchConfig {
        let max_export_batch_size = min(self.max_export_batch_size, self.max_queue_size);

        BatchConfig {
            max_queue_size: self.max_queue_size,
            scheduled_delay: self.scheduled_delay,
            max_export_batch_size,
        }
    }

    fn init_from_env_vars(mut self) -> Self {
        if let Some(max_queue_size) = env::var(WEBTRACE_BSP_MAX_QUEUE_SIZE)
            .ok()
            .and_then(|queue_size| usize::from_str(&queue_size).ok())
        {
            self.max_queue_size = max_queue_size;
        }

        if let Some(scheduled_delay) = env::var(WEBTRACE_BSP_SCHEDULE_DELAY)
            .ok()
            .and_then(|delay| u64::from_str(&delay).ok())
        {
            self.scheduled_delay = Duration::from_millis(scheduled_delay);
        }

        if let Some(max_export_batch_size) = env::var(WEBTRACE_BSP_MAX_EXPORT_BATCH_SIZE)
            .ok()
            .and_then(|batch_size| usize::from_str(&batch_size).ok())
        {
            self.max_export_batch_size = max_export_batch_size;
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::in_memory_exporter::InMemorySpanExporter;
    use crate::trace::test_util::new_test_span_data;

    #[test]
    fn simple_processor_on_end_calls_export() {
        let exporter = InMemorySpanExporter::default();
        let processor = SimpleSpanProcessor::new(Box::new(exporter.clone()));
        let span_data = new_test_span_data("simple");
        processor.on_end(span_data.clone());
        assert_eq!(exporter.get_finished_spans().unwrap()[0], span_data);
        let _result = processor.shutdown();
    }

    #[test]
    fn simple_processor_swallows_export_failure() {
        let exporter = InMemorySpanExporter::default();
        exporter.set_failing(true);
        let processor = SimpleSpanProcessor::new(Box::new(exporter.clone()));
        processor.on_end(new_test_span_data("failing"));
        assert!(exporter.get_finished_spans().unwrap().is_empty());
    }

    #[test]
    fn default_batch_config() {
        let env_vars = vec![
            WEBTRACE_BSP_MAX_QUEUE_SIZE,
            WEBTRACE_BSP_SCHEDULE_DELAY,
            WEBTRACE_BSP_MAX_EXPORT_BATCH_SIZE,
        ];

        let config = temp_env::with_vars_unset(env_vars, BatchConfig::default);

        assert_eq!(config.max_queue_size, WEBTRACE_BSP_MAX_QUEUE_SIZE_DEFAULT);
        assert_eq!(
            config.scheduled_delay,
            Duration::from_millis(WEBTRACE_BSP_SCHEDULE_DELAY_DEFAULT)
        );
        assert_eq!(
            config.max_export_batch_size,
            WEBTRACE_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT
        );
    }

    #[test]
    fn batch_config_from_env_vars() {
        let env_vars = vec![
            (WEBTRACE_BSP_MAX_QUEUE_SIZE, Some("4096")),
            (WEBTRACE_BSP_SCHEDULE_DELAY, Some("2000")),
            (WEBTRACE_BSP_MAX_EXPORT_BATCH_SIZE, Some("1024")),
        ];

        let config = temp_env::with_vars(env_vars, BatchConfig::default);

        assert_eq!(config.max_queue_size, 4096);
        assert_eq!(config.scheduled_delay, Duration::from_millis(2000));
        assert_eq!(config.max_export_batch_size, 1024);
    }

    #[test]
    fn batch_size_capped_at_queue_size() {
        let config = BatchConfigBuilder::default()
            .with_max_queue_size(256)
            .with_max_export_batch_size(1024)
            .build();

        assert_eq!(config.max_queue_size, 256);
        assert_eq!(config.max_export_batch_size, 256);
    }

    #[test]
    fn batch_flushes_on_size_threshold() {
        let exporter = InMemorySpanExporter::default();
        let config = BatchConfigBuilder::default()
            .with_max_queue_size(10)
            .with_max_export_batch_size(3)
            .with_scheduled_delay(Duration::from_secs(60))
            .build();
        let processor = BatchSpanProcessor::new(exporter.clone(), config);

        for _ in 0..3 {
            processor.on_end(new_test_span_data("batched"));
        }

        // Size threshold reached; the worker flushes without waiting for
        // the delay.
        let deadline = Instant::now() + Duration::from_secs(5);
        while exporter.get_finished_spans().unwrap().len() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(exporter.get_finished_spans().unwrap().len(), 3);

        let _ = processor.shutdown();
    }

    #[test]
    fn batch_flushes_on_delay() {
        let exporter = InMemorySpanExporter::default();
        let config = BatchConfigBuilder::default()
            .with_max_queue_size(10)
            .with_max_export_batch_size(10)
            .with_scheduled_delay(Duration::from_millis(50))
            .build();
        let processor = BatchSpanProcessor::new(exporter.clone(), config);

        processor.on_end(new_test_span_data("delayed"));

        let deadline = Instant::now() + Duration::from_secs(5);
        while exporter.get_finished_spans().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);

        let _ = processor.shutdown();
    }

    #[test]
    fn batch_force_flush() {
        let exporter = InMemorySpanExporter::default();
        let config = BatchConfigBuilder::default()
            .with_max_queue_size(10)
            .with_max_export_batch_size(10)
            .with_scheduled_delay(Duration::from_secs(60))
            .build();
        let processor = BatchSpanProcessor::new(exporter.clone(), config);

        processor.on_end(new_test_span_data("flushed"));
        processor.force_flush().unwrap();

        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);

        let _ = processor.shutdown();
    }

    #[test]
    fn failed_flush_clears_buffer_and_recovers() {
        let exporter = InMemorySpanExporter::default();
        exporter.set_failing(true);
        let config = BatchConfigBuilder::default()
            .with_max_queue_size(10)
            .with_max_export_batch_size(10)
            .with_scheduled_delay(Duration::from_secs(60))
            .build();
        let processor = BatchSpanProcessor::new(exporter.clone(), config);

        processor.on_end(new_test_span_data("lost"));
        assert!(processor.force_flush().is_err());
        assert!(exporter.get_finished_spans().unwrap().is_empty());

        // Next cycle proceeds normally with a fresh buffer; the failed
        // batch is not redelivered.
        exporter.set_failing(false);
        processor.on_end(new_test_span_data("delivered"));
        processor.force_flush().unwrap();

        let finished = exporter.get_finished_spans().unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].name, "delivered");

        let _ = processor.shutdown();
    }

    #[test]
    fn shutdown_flushes_and_is_terminal() {
        let exporter = InMemorySpanExporter::default();
        let config = BatchConfigBuilder::default()
            .with_max_queue_size(10)
            .with_max_export_batch_size(10)
            .with_scheduled_delay(Duration::from_secs(60))
            .build();
        let processor = BatchSpanProcessor::new(exporter.clone(), config);

        processor.on_end(new_test_span_data("shutdown"));
        processor.shutdown().unwrap();

        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
        assert!(processor.shutdown().is_err());
    }
}
