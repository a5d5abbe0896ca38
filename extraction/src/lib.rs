#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Credo claim extraction stack: sentence segmentation, classification seam,
//! claim canonicalization, and the deduplicating claim store.

/// Sentence data model and paragraph-aware segmentation.
#[path = "../segmenter.rs"]
pub mod segmenter;

/// Sentence labeling seam.
#[path = "../classifier.rs"]
pub mod classifier;

/// Field normalization and canonical claim keys.
#[path = "../normalizer.rs"]
pub mod normalizer;

/// Deduplicating claim registry.
#[path = "../store.rs"]
pub mod store;

/// Telemetry helpers.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Ingest pipeline runtime.
#[path = "../main.rs"]
pub mod pipeline;

pub use classifier::{ClassifierError, HeuristicClassifier, SentenceClassifier};
pub use normalizer::{
    norm, CanonicalClaim, ClaimFields, ClaimFormatError, ClaimInput, ClaimNormalizer,
    ExtractedFields, ExtractionError, FieldExtractor, LoopbackFieldExtractor, NormalizerError,
};
pub use pipeline::{ExtractionRuntime, IngestReport};
pub use segmenter::{SentenceLabel, SentenceRecord, SentenceSegmenter};
pub use store::{
    report_status, ClaimRecord, ClaimStore, Occurrence, ReportStatus, StoreError,
    VerificationBlock, VerificationSummary, Verdict,
};
pub use telemetry::{ExtractionTelemetry, ExtractionTelemetryBuilder};
