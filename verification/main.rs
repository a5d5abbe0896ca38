//! Batch verification engine.
//!
//! Drives every pending claim through query derivation, evidence search, and
//! verdict synthesis. The reliability contract: a claim that a pass started
//! is always resolved, even when every collaborator fails; nothing is ever
//! left pending because of a transient error.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{
    sync::Semaphore,
    task::JoinSet,
    time::{timeout, Duration, Instant},
};
use uuid::Uuid;

use credo_extraction::{CanonicalClaim, ClaimStore, StoreError, Verdict};
use credo_telemetry::LogLevel;

use crate::{
    query::build_queries,
    search::{format_evidence, SearchHit, SearchProvider},
    synthesis::{VerdictOutcome, VerdictSynthesizer},
    telemetry::VerificationTelemetry,
};

/// Tunables for a verification pass.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Concurrent claims in flight.
    pub max_concurrency: usize,
    /// Budget for one claim's search + synthesis sequence.
    pub claim_timeout: Duration,
    /// Stop issuing further queries once this many hits are collected.
    pub evidence_target: usize,
    /// Abandon dispatching new claims once the batch has run this long;
    /// undispatched claims stay pending and are safely retryable.
    pub batch_deadline: Option<Duration>,
    /// Topic hint prefixed onto every derived query.
    pub query_context: String,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            claim_timeout: Duration::from_secs(20),
            evidence_target: 5,
            batch_deadline: None,
            query_context: String::new(),
        }
    }
}

/// Failure class attached to a forced UNVERIFIABLE verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// The claim produced no searchable queries.
    QueryBuild,
    /// Every search query failed at the provider.
    Search,
    /// Synthesis errored or returned a malformed verdict.
    Synthesis,
    /// The per-claim budget elapsed.
    Timeout,
}

/// One claim's outcome from a verification pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedClaim {
    /// Canonical key of the claim.
    pub canonical_claim: CanonicalClaim,
    /// Verdict written to the store.
    pub verdict: Verdict,
    /// Confidence written to the store.
    pub confidence: f32,
    /// Set when the verdict was forced by a failure rather than judged.
    pub failure: Option<FailureClass>,
}

/// Outcome of one batch pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Correlation id for this pass.
    pub run_id: Uuid,
    /// Claims dispatched (each one is guaranteed resolved).
    pub attempted: usize,
    /// Claims abandoned at the batch deadline; still pending.
    pub skipped: usize,
    /// Per-claim outcomes in dispatch order.
    pub resolved: Vec<ResolvedClaim>,
}

impl BatchReport {
    /// Number of resolved claims carrying the given verdict.
    #[must_use]
    pub fn verdict_count(&self, verdict: Verdict) -> usize {
        self.resolved
            .iter()
            .filter(|claim| claim.verdict == verdict)
            .count()
    }
}

/// Orchestrates query generation, evidence search, verdict synthesis, and
/// store updates with per-claim failure isolation.
#[derive(Clone)]
pub struct VerificationEngine {
    store: ClaimStore,
    search: Arc<dyn SearchProvider>,
    synthesizer: Arc<dyn VerdictSynthesizer>,
    options: VerifyOptions,
    telemetry: Option<VerificationTelemetry>,
}

impl std::fmt::Debug for VerificationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationEngine")
            .field("options", &self.options)
            .finish()
    }
}

impl VerificationEngine {
    /// Creates an engine over the shared store and collaborator seams.
    #[must_use]
    pub fn new(
        store: ClaimStore,
        search: Arc<dyn SearchProvider>,
        synthesizer: Arc<dyn VerdictSynthesizer>,
    ) -> Self {
        Self {
            store,
            search,
            synthesizer,
            options: VerifyOptions::default(),
            telemetry: None,
        }
    }

    /// Replaces the option set.
    #[must_use]
    pub fn with_options(mut self, options: VerifyOptions) -> Self {
        self.options = options;
        self
    }

    /// Attaches telemetry sinks.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: VerificationTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Returns the underlying store (cheap shared clone).
    #[must_use]
    pub fn store(&self) -> ClaimStore {
        self.store.clone()
    }

    /// Verifies a single claim and writes the result through the store.
    ///
    /// The only error is [`StoreError::ClaimNotFound`] for a key that was
    /// never added — API misuse, not a runtime condition. Every runtime
    /// failure inside the pass resolves the claim UNVERIFIABLE instead.
    pub async fn verify_claim(&self, claim: &CanonicalClaim) -> Result<ResolvedClaim, StoreError> {
        if self.store.get_claim(claim).is_none() {
            return Err(StoreError::ClaimNotFound(claim.to_string()));
        }
        let (outcome, failure) = match timeout(self.options.claim_timeout, self.resolve(claim)).await
        {
            Ok(resolution) => resolution,
            Err(_) => (
                forced_unverifiable("verification timed out before completion"),
                Some(FailureClass::Timeout),
            ),
        };
        let confidence = outcome.confidence.clamp(0.0, 1.0);
        self.store.update_verification(
            claim,
            outcome.verdict,
            confidence,
            outcome.reasoning,
            outcome.evidence_sources,
        )?;
        let resolved = ResolvedClaim {
            canonical_claim: claim.clone(),
            verdict: outcome.verdict,
            confidence,
            failure,
        };
        let _ = self.event(
            "verification.claim.resolved",
            json!({
                "canonical_claim": resolved.canonical_claim,
                "verdict": resolved.verdict,
                "failure": resolved.failure,
            }),
        );
        Ok(resolved)
    }

    /// Runs one pass over every currently-pending claim.
    ///
    /// Claims are dispatched in store insertion order under the concurrency
    /// cap. No retries happen within a pass, and UNVERIFIABLE claims are not
    /// retried by later passes unless the caller resets them explicitly via
    /// [`ClaimStore::reset_unverifiable`].
    pub async fn verify_pending(&self) -> Result<BatchReport> {
        let run_id = Uuid::new_v4();
        let pending = self.store.unverified_claims();
        self.log(
            LogLevel::Info,
            "verification.batch.start",
            json!({ "run_id": run_id, "pending": pending.len() }),
        );

        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency.max(1)));
        let mut set = JoinSet::new();
        let mut attempted = 0usize;
        let mut skipped = 0usize;
        for (index, record) in pending.into_iter().enumerate() {
            if let Some(deadline) = self.options.batch_deadline {
                if started.elapsed() >= deadline {
                    skipped += 1;
                    continue;
                }
            }
            let engine = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let claim = record.canonical_claim.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                (index, engine.verify_claim(&claim).await)
            });
            attempted += 1;
        }

        let mut indexed = Vec::new();
        while let Some(joined) = set.join_next().await {
            let (index, result) = joined?;
            match result {
                Ok(resolved) => indexed.push((index, resolved)),
                Err(err) => self.log(
                    LogLevel::Error,
                    "verification.claim.error",
                    json!({ "run_id": run_id, "error": err.to_string() }),
                ),
            }
        }
        indexed.sort_by_key(|(index, _)| *index);
        let resolved: Vec<ResolvedClaim> =
            indexed.into_iter().map(|(_, claim)| claim).collect();

        self.log(
            LogLevel::Info,
            "verification.batch.complete",
            json!({
                "run_id": run_id,
                "attempted": attempted,
                "skipped": skipped,
                "resolved": resolved.len(),
            }),
        );
        Ok(BatchReport {
            run_id,
            attempted,
            skipped,
            resolved,
        })
    }

    /// Gathers evidence and synthesizes a verdict. Infallible: every failure
    /// mode maps to a forced UNVERIFIABLE outcome with a diagnostic.
    async fn resolve(&self, claim: &CanonicalClaim) -> (VerdictOutcome, Option<FailureClass>) {
        let queries = build_queries(claim, &self.options.query_context);
        if queries.is_empty() {
            return (
                forced_unverifiable("claim has no searchable fields"),
                Some(FailureClass::QueryBuild),
            );
        }

        let mut hits = Vec::new();
        let mut failed_queries = 0usize;
        for query in &queries {
            if hits.len() >= self.options.evidence_target {
                break;
            }
            match self.search.search(query).await {
                // Overlapping queries often return the same page; keep the
                // first occurrence so evidence order tracks query priority.
                Ok(batch) => {
                    for hit in batch {
                        if hits.iter().all(|existing: &SearchHit| existing.url != hit.url) {
                            hits.push(hit);
                        }
                    }
                }
                Err(err) => {
                    failed_queries += 1;
                    self.log(
                        LogLevel::Warn,
                        "verification.search.failed",
                        json!({ "query": query, "error": err.to_string() }),
                    );
                }
            }
        }

        if hits.is_empty() {
            // Zero evidence short-circuits without spending a synthesis call.
            return if failed_queries == queries.len() {
                (
                    forced_unverifiable("every search query failed"),
                    Some(FailureClass::Search),
                )
            } else {
                (
                    forced_unverifiable("no evidence retrieved for any query"),
                    None,
                )
            };
        }

        let evidence = format_evidence(&hits);
        match self.synthesizer.synthesize(claim, &evidence).await {
            Ok(outcome) => match outcome.validate() {
                Ok(()) => (outcome, None),
                Err(err) => (
                    forced_unverifiable(format!("malformed synthesis output: {err}")),
                    Some(FailureClass::Synthesis),
                ),
            },
            Err(err) => (
                forced_unverifiable(format!("verdict synthesis failed: {err}")),
                Some(FailureClass::Synthesis),
            ),
        }
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

fn forced_unverifiable(reasoning: impl Into<String>) -> VerdictOutcome {
    VerdictOutcome {
        verdict: Verdict::Unverifiable,
        confidence: 0.0,
        reasoning: reasoning.into(),
        evidence_sources: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{FailingSearchClient, LoopbackSearchClient, SearchError, SearchHit};
    use crate::synthesis::{LoopbackSynthesizer, SynthesisError};
    use async_trait::async_trait;
    use credo_extraction::ClaimInput;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    const KEY: &str = "finance_minister|state|economy_grew_by_7.2%|last_year|null|null";

    fn store_with(keys: &[&str]) -> ClaimStore {
        let store = ClaimStore::default();
        for (idx, key) in keys.iter().enumerate() {
            store.add_claim(ClaimInput {
                canonical_claim: CanonicalClaim::parse(key).unwrap(),
                sentence_id: idx as u64,
                paragraph_index: 0,
                original_sentence: format!("sentence {idx}"),
            });
        }
        store
    }

    fn supporting_search() -> Arc<LoopbackSearchClient> {
        Arc::new(LoopbackSearchClient::new().with_document(
            "Economy Growth Report",
            "https://example.com/economy-report",
            "The finance minister stated the economy grew by 7.2% last year.",
        ))
    }

    struct CountingSearchClient {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SearchProvider for CountingSearchClient {
        async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    struct CountingSynthesizer {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl VerdictSynthesizer for CountingSynthesizer {
        async fn synthesize(
            &self,
            _claim: &CanonicalClaim,
            _evidence: &str,
        ) -> Result<VerdictOutcome, SynthesisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(SynthesisError::Backend("should not be called".into()))
        }
    }

    struct SlowSynthesizer;

    #[async_trait]
    impl VerdictSynthesizer for SlowSynthesizer {
        async fn synthesize(
            &self,
            _claim: &CanonicalClaim,
            _evidence: &str,
        ) -> Result<VerdictOutcome, SynthesisError> {
            sleep(Duration::from_secs(2)).await;
            Err(SynthesisError::Backend("unreachable".into()))
        }
    }

    struct FailingSynthesizer;

    #[async_trait]
    impl VerdictSynthesizer for FailingSynthesizer {
        async fn synthesize(
            &self,
            _claim: &CanonicalClaim,
            _evidence: &str,
        ) -> Result<VerdictOutcome, SynthesisError> {
            Err(SynthesisError::Backend("model endpoint down".into()))
        }
    }

    #[tokio::test]
    async fn failing_search_never_leaves_a_claim_pending() {
        let store = store_with(&[KEY, "press_office|confirm|new_rail_line|null|null|null"]);
        let engine = VerificationEngine::new(
            store.clone(),
            Arc::new(FailingSearchClient),
            Arc::new(LoopbackSynthesizer),
        );
        let report = engine.verify_pending().await.unwrap();
        assert_eq!(report.attempted, 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.verdict_count(Verdict::Unverifiable), 2);
        assert!(store.unverified_claims().is_empty());
        for resolved in &report.resolved {
            assert_eq!(resolved.confidence, 0.0);
            assert_eq!(resolved.failure, Some(FailureClass::Search));
        }
        let summary = store.verification_summary();
        assert_eq!(summary.total(), store.len());
        assert_eq!(summary.unverifiable, 2);
    }

    #[tokio::test]
    async fn degenerate_claim_skips_search_and_synthesis() {
        let store = store_with(&["null|null|null|null|null|null"]);
        let search_calls = Arc::new(AtomicUsize::new(0));
        let synthesis_calls = Arc::new(AtomicUsize::new(0));
        let engine = VerificationEngine::new(
            store.clone(),
            Arc::new(CountingSearchClient {
                calls: search_calls.clone(),
            }),
            Arc::new(CountingSynthesizer {
                calls: synthesis_calls.clone(),
            }),
        );
        let claim = CanonicalClaim::parse("null|null|null|null|null|null").unwrap();
        let resolved = engine.verify_claim(&claim).await.unwrap();
        assert_eq!(resolved.verdict, Verdict::Unverifiable);
        assert_eq!(resolved.failure, Some(FailureClass::QueryBuild));
        assert_eq!(search_calls.load(Ordering::SeqCst), 0);
        assert_eq!(synthesis_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_results_short_circuit_without_synthesis() {
        let store = store_with(&[KEY]);
        let synthesis_calls = Arc::new(AtomicUsize::new(0));
        let engine = VerificationEngine::new(
            store.clone(),
            Arc::new(LoopbackSearchClient::new()),
            Arc::new(CountingSynthesizer {
                calls: synthesis_calls.clone(),
            }),
        );
        let claim = CanonicalClaim::parse(KEY).unwrap();
        let resolved = engine.verify_claim(&claim).await.unwrap();
        assert_eq!(resolved.verdict, Verdict::Unverifiable);
        assert_eq!(resolved.confidence, 0.0);
        assert_eq!(resolved.failure, None);
        assert_eq!(synthesis_calls.load(Ordering::SeqCst), 0);
        let record = store.get_claim(&claim).unwrap();
        assert!(record.verification.evidence_sources.is_empty());
        assert!(record.verification.verified_at.is_some());
    }

    #[tokio::test]
    async fn supported_claim_is_verified_end_to_end() {
        let store = store_with(&[KEY]);
        let engine = VerificationEngine::new(
            store.clone(),
            supporting_search(),
            Arc::new(LoopbackSynthesizer),
        );
        let report = engine.verify_pending().await.unwrap();
        assert_eq!(report.resolved.len(), 1);
        assert_eq!(report.resolved[0].verdict, Verdict::Verified);
        assert!(report.resolved[0].failure.is_none());
        let record = store.get_claim(&CanonicalClaim::parse(KEY).unwrap()).unwrap();
        assert_eq!(
            record.verification.evidence_sources,
            vec!["https://example.com/economy-report".to_string()]
        );
    }

    #[tokio::test]
    async fn unknown_key_is_api_misuse() {
        let store = store_with(&[]);
        let engine = VerificationEngine::new(
            store,
            Arc::new(LoopbackSearchClient::new()),
            Arc::new(LoopbackSynthesizer),
        );
        let claim = CanonicalClaim::parse(KEY).unwrap();
        let err = engine.verify_claim(&claim).await.unwrap_err();
        assert!(matches!(err, StoreError::ClaimNotFound(_)));
    }

    #[tokio::test]
    async fn synthesis_failure_forces_unverifiable() {
        let store = store_with(&[KEY]);
        let engine = VerificationEngine::new(
            store.clone(),
            supporting_search(),
            Arc::new(FailingSynthesizer),
        );
        let claim = CanonicalClaim::parse(KEY).unwrap();
        let resolved = engine.verify_claim(&claim).await.unwrap();
        assert_eq!(resolved.verdict, Verdict::Unverifiable);
        assert_eq!(resolved.failure, Some(FailureClass::Synthesis));
        let record = store.get_claim(&claim).unwrap();
        assert!(record
            .verification
            .reasoning
            .as_deref()
            .unwrap()
            .contains("synthesis failed"));
    }

    #[tokio::test]
    async fn slow_synthesis_hits_the_claim_timeout() {
        let store = store_with(&[KEY]);
        let engine = VerificationEngine::new(
            store.clone(),
            supporting_search(),
            Arc::new(SlowSynthesizer),
        )
        .with_options(VerifyOptions {
            claim_timeout: Duration::from_millis(50),
            ..VerifyOptions::default()
        });
        let claim = CanonicalClaim::parse(KEY).unwrap();
        let resolved = engine.verify_claim(&claim).await.unwrap();
        assert_eq!(resolved.verdict, Verdict::Unverifiable);
        assert_eq!(resolved.failure, Some(FailureClass::Timeout));
        assert!(store.unverified_claims().is_empty());
    }

    #[tokio::test]
    async fn expired_deadline_leaves_claims_pending_and_retryable() {
        let store = store_with(&[KEY, "press_office|confirm|new_rail_line|null|null|null"]);
        let engine = VerificationEngine::new(
            store.clone(),
            supporting_search(),
            Arc::new(LoopbackSynthesizer),
        )
        .with_options(VerifyOptions {
            batch_deadline: Some(Duration::ZERO),
            ..VerifyOptions::default()
        });
        let report = engine.verify_pending().await.unwrap();
        assert_eq!(report.attempted, 0);
        assert_eq!(report.skipped, 2);
        assert_eq!(store.unverified_claims().len(), 2);
    }

    #[tokio::test]
    async fn reset_then_reverify_advances_the_record() {
        let store = store_with(&[KEY]);
        let claim = CanonicalClaim::parse(KEY).unwrap();
        let broken = VerificationEngine::new(
            store.clone(),
            Arc::new(FailingSearchClient),
            Arc::new(LoopbackSynthesizer),
        );
        broken.verify_pending().await.unwrap();
        let first = store.get_claim(&claim).unwrap();
        assert_eq!(first.verification.verdict, Some(Verdict::Unverifiable));

        // A later pass only sees the claim after an explicit reset.
        let healthy = VerificationEngine::new(
            store.clone(),
            supporting_search(),
            Arc::new(LoopbackSynthesizer),
        );
        let untouched = healthy.verify_pending().await.unwrap();
        assert_eq!(untouched.attempted, 0);

        assert_eq!(store.reset_unverifiable(), 1);
        let report = healthy.verify_pending().await.unwrap();
        assert_eq!(report.resolved[0].verdict, Verdict::Verified);
        let second = store.get_claim(&claim).unwrap();
        assert!(second.verification.verified_at > first.verification.verified_at);
    }
}
