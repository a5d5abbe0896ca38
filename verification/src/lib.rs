#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Credo claim verification stack: query derivation, evidence search seam,
//! verdict synthesis seam, and the batch verification engine.

/// Search query derivation from canonical claims.
#[path = "../query.rs"]
pub mod query;

/// Evidence search seam.
#[path = "../search.rs"]
pub mod search;

/// Verdict synthesis seam.
#[path = "../synthesis.rs"]
pub mod synthesis;

/// Telemetry helpers.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Batch verification engine.
#[path = "../main.rs"]
pub mod engine;

pub use engine::{BatchReport, FailureClass, ResolvedClaim, VerificationEngine, VerifyOptions};
pub use query::{build_queries, MAX_QUERIES};
pub use search::{
    format_evidence, FailingSearchClient, LoopbackSearchClient, SearchError, SearchHit,
    SearchProvider,
};
pub use synthesis::{LoopbackSynthesizer, SynthesisError, VerdictOutcome, VerdictSynthesizer};
pub use telemetry::{VerificationTelemetry, VerificationTelemetryBuilder};
