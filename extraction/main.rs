//! High-level orchestration for the claim extraction pipeline.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{sync::Semaphore, task::JoinSet};
use uuid::Uuid;

use crate::{
    classifier::{HeuristicClassifier, SentenceClassifier},
    normalizer::{ClaimInput, ClaimNormalizer, FieldExtractor, LoopbackFieldExtractor},
    segmenter::{SentenceRecord, SentenceSegmenter},
    store::ClaimStore,
    telemetry::ExtractionTelemetry,
};
use credo_telemetry::LogLevel;

/// Outcome of one ingest invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    /// Correlation id for this ingest run.
    pub run_id: Uuid,
    /// Labeled sentence records in document order.
    pub sentences: Vec<SentenceRecord>,
    /// Sentences labeled as fact claims.
    pub fact_claims: usize,
    /// Occurrences registered in the store (one per normalized fact claim).
    pub claims_added: usize,
    /// Sentences skipped because classification failed.
    pub classification_failures: usize,
    /// Fact claims skipped because field extraction failed.
    pub extraction_failures: usize,
}

enum SentenceOutcome {
    Claim(Box<ClaimInput>),
    NotAClaim,
    ClassificationFailed,
    ExtractionFailed(String),
}

/// Runtime wiring segmentation, classification, normalization, and the store.
#[derive(Clone)]
pub struct ExtractionRuntime {
    segmenter: Arc<SentenceSegmenter>,
    classifier: Arc<dyn SentenceClassifier>,
    normalizer: ClaimNormalizer,
    store: ClaimStore,
    telemetry: Option<ExtractionTelemetry>,
    max_concurrency: usize,
}

impl std::fmt::Debug for ExtractionRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionRuntime")
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

impl ExtractionRuntime {
    /// Bootstraps the runtime with the loopback collaborators and a fresh
    /// store.
    #[must_use]
    pub fn bootstrap() -> Self {
        Self {
            segmenter: Arc::new(SentenceSegmenter::new()),
            classifier: Arc::new(HeuristicClassifier::new()),
            normalizer: ClaimNormalizer::new(Arc::new(LoopbackFieldExtractor)),
            store: ClaimStore::default(),
            telemetry: None,
            max_concurrency: 4,
        }
    }

    /// Swaps in a classification backend.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn SentenceClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Swaps in a field-extraction backend.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn FieldExtractor>) -> Self {
        self.normalizer = ClaimNormalizer::new(extractor);
        self
    }

    /// Shares an existing store (e.g., with a verification engine).
    #[must_use]
    pub fn with_store(mut self, store: ClaimStore) -> Self {
        self.store = store;
        self
    }

    /// Attaches telemetry sinks.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: ExtractionTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Caps the sentence worker pool.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Returns the underlying store (cheap shared clone).
    #[must_use]
    pub fn store(&self) -> ClaimStore {
        self.store.clone()
    }

    /// Runs the full extraction pipeline over one document.
    ///
    /// Sentences are classified and normalized concurrently under the worker
    /// cap; store registration happens afterwards in document order so
    /// insertion order stays deterministic. Per-sentence collaborator
    /// failures are counted and skipped, never fatal for the batch.
    pub async fn ingest(&self, text: &str) -> Result<IngestReport> {
        let run_id = Uuid::new_v4();
        self.log(
            LogLevel::Info,
            "extraction.ingest.start",
            json!({ "run_id": run_id, "chars": text.chars().count() }),
        );

        let sentences = self.segmenter.segment(text);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut set = JoinSet::new();
        for (index, sentence) in sentences.into_iter().enumerate() {
            let classifier = Arc::clone(&self.classifier);
            let normalizer = self.normalizer.clone();
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let mut sentence = sentence;
                match classifier.classify(&sentence).await {
                    Ok(label) => sentence.label = Some(label),
                    Err(_) => return (index, sentence, SentenceOutcome::ClassificationFailed),
                }
                let outcome = match normalizer.normalize(&sentence).await {
                    Ok(Some(claim)) => SentenceOutcome::Claim(Box::new(claim)),
                    Ok(None) => SentenceOutcome::NotAClaim,
                    Err(err) => SentenceOutcome::ExtractionFailed(err.to_string()),
                };
                (index, sentence, outcome)
            });
        }

        let mut processed = Vec::new();
        while let Some(joined) = set.join_next().await {
            processed.push(joined?);
        }
        processed.sort_by_key(|(index, _, _)| *index);

        let mut report = IngestReport {
            run_id,
            sentences: Vec::with_capacity(processed.len()),
            fact_claims: 0,
            claims_added: 0,
            classification_failures: 0,
            extraction_failures: 0,
        };
        for (_, sentence, outcome) in processed {
            match outcome {
                SentenceOutcome::Claim(claim) => {
                    report.fact_claims += 1;
                    report.claims_added += 1;
                    let record = self.store.add_claim(*claim);
                    let _ = self.event(
                        "extraction.claim.registered",
                        json!({
                            "run_id": run_id,
                            "canonical_claim": record.canonical_claim,
                            "occurrences": record.occurrences.len(),
                        }),
                    );
                }
                SentenceOutcome::NotAClaim => {}
                SentenceOutcome::ClassificationFailed => report.classification_failures += 1,
                SentenceOutcome::ExtractionFailed(reason) => {
                    report.extraction_failures += 1;
                    self.log(
                        LogLevel::Warn,
                        "extraction.sentence.skipped",
                        json!({
                            "run_id": run_id,
                            "sentence_id": sentence.id,
                            "reason": reason,
                        }),
                    );
                }
            }
            report.sentences.push(sentence);
        }

        self.log(
            LogLevel::Info,
            "extraction.ingest.complete",
            json!({
                "run_id": run_id,
                "sentences": report.sentences.len(),
                "claims_added": report.claims_added,
                "extraction_failures": report.extraction_failures,
            }),
        );
        Ok(report)
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }

    fn event(&self, event_type: &str, payload: serde_json::Value) -> Result<()> {
        if let Some(tel) = &self.telemetry {
            tel.event(event_type, payload)?;
        }
        Ok(())
    }
}

impl Default for ExtractionRuntime {
    fn default() -> Self {
        Self::bootstrap()
    }
}
