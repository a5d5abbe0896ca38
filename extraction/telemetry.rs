use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use credo_telemetry::{EventPublisher, EventRecord, JsonLogger, LogLevel, LogRecord, LogSink};
use serde_json::Value;
use tokio::runtime::{Handle, Runtime};

/// Builder configuring telemetry for the extraction pipeline.
pub struct ExtractionTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    log_sink: Option<Arc<dyn LogSink>>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl ExtractionTelemetryBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            log_sink: None,
            event_publisher: None,
        }
    }

    /// Sets the JSONL log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Supplies an explicit log sink; takes precedence over `log_path`.
    #[must_use]
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Assigns the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Finalizes the builder.
    pub fn build(self) -> Result<ExtractionTelemetry> {
        ExtractionTelemetry::new(
            self.module,
            self.log_path,
            self.log_sink,
            self.event_publisher,
        )
    }
}

/// Telemetry handle for extraction workflows.
#[derive(Clone)]
pub struct ExtractionTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for ExtractionTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionTelemetry")
            .field("module", &self.inner.module)
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    sink: Option<Arc<dyn LogSink>>,
    event: Option<EventHandle>,
}

struct EventHandle {
    runtime: Runtime,
    publisher: Arc<dyn EventPublisher>,
}

impl EventHandle {
    fn new(publisher: Arc<dyn EventPublisher>) -> Result<Self> {
        Ok(Self {
            runtime: Runtime::new()?,
            publisher,
        })
    }

    fn publish(&self, record: EventRecord) -> Result<()> {
        if let Ok(handle) = Handle::try_current() {
            let publisher = Arc::clone(&self.publisher);
            handle.spawn(async move {
                if let Err(err) = publisher.publish(record).await {
                    eprintln!("telemetry event publish failed: {err:?}");
                }
            });
            Ok(())
        } else {
            self.runtime.block_on(self.publisher.publish(record))
        }
    }
}

impl ExtractionTelemetry {
    fn new(
        module: impl Into<String>,
        log_path: Option<PathBuf>,
        log_sink: Option<Arc<dyn LogSink>>,
        event_publisher: Option<Arc<dyn EventPublisher>>,
    ) -> Result<Self> {
        let sink = match (log_sink, log_path) {
            (Some(sink), _) => Some(sink),
            (None, Some(path)) => Some(Arc::new(JsonLogger::new(path)?) as Arc<dyn LogSink>),
            (None, None) => None,
        };
        let event = if let Some(publisher) = event_publisher {
            Some(EventHandle::new(publisher)?)
        } else {
            None
        };
        Ok(Self {
            inner: Arc::new(TelemetryInner {
                module: module.into(),
                sink,
                event,
            }),
        })
    }

    /// Returns a builder for this telemetry helper.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> ExtractionTelemetryBuilder {
        ExtractionTelemetryBuilder::new(module)
    }

    /// Logs a structured record.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if let Some(sink) = &self.inner.sink {
            let mut record = LogRecord::new(&self.inner.module, level, message);
            if let Some(obj) = metadata.as_object() {
                record.metadata = obj.clone();
            }
            sink.append(&record)?;
        }
        Ok(())
    }

    /// Emits an event via the configured bus.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        if let Some(handle) = &self.inner.event {
            let record = EventRecord::new(self.inner.module.clone(), event_type, payload);
            handle.publish(record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credo_telemetry::{MemoryEventBus, MemoryLogSink};
    use serde_json::json;

    #[test]
    fn telemetry_logs_and_emits() {
        let sink = Arc::new(MemoryLogSink::new(8));
        let bus = Arc::new(MemoryEventBus::new(8));
        let telemetry = ExtractionTelemetry::builder("extraction")
            .log_sink(sink.clone())
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        telemetry
            .log(
                LogLevel::Info,
                "extraction.ingest.start",
                json!({ "chars": 120 }),
            )
            .unwrap();
        telemetry
            .event("extraction.claim.registered", json!({ "occurrences": 1 }))
            .unwrap();
        let records = sink.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "extraction.ingest.start");
        assert_eq!(bus.snapshot().len(), 1);
    }

    #[test]
    fn log_path_wires_a_jsonl_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extraction.log");
        let telemetry = ExtractionTelemetry::builder("extraction")
            .log_path(&path)
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Warn, "extraction.sentence.skipped", json!({}))
            .unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("extraction.sentence.skipped"));
    }
}
