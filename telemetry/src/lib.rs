#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Structured JSON logging and event bus plumbing shared across the Credo
//! fact-check stack.

/// Append-only JSONL logging with pluggable sinks.
pub mod logger;

/// Event bus abstractions for module-to-module notifications.
pub mod bus;

pub use bus::{EventPublisher, EventRecord, EventSubscriber, FileEventPublisher, MemoryEventBus};
pub use logger::{JsonLogger, LogLevel, LogRecord, LogSink, MemoryLogSink};
