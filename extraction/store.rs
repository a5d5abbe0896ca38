use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::normalizer::{CanonicalClaim, ClaimInput};

/// Terminal classification of a claim's truth status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Evidence clearly supports the claim.
    Verified,
    /// Evidence contradicts the claim.
    False,
    /// Evidence supports part of the claim.
    PartiallyVerified,
    /// Insufficient or unusable evidence.
    Unverifiable,
}

/// Status vocabulary used by downstream reporting and persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    /// Awaiting verification (or awaiting a reset-and-retry).
    Pending,
    /// Published as accurate.
    Verified,
    /// Published as false.
    False,
    /// Published as misleading.
    Misleading,
}

/// Total mapping from the verdict taxonomy onto the persisted report status.
///
/// Partial truths surface to readers as misleading; claims the system could
/// not verify stay in the pending bucket rather than being published under a
/// definitive-sounding status.
#[must_use]
pub const fn report_status(verdict: Option<Verdict>) -> ReportStatus {
    match verdict {
        None | Some(Verdict::Unverifiable) => ReportStatus::Pending,
        Some(Verdict::Verified) => ReportStatus::Verified,
        Some(Verdict::False) => ReportStatus::False,
        Some(Verdict::PartiallyVerified) => ReportStatus::Misleading,
    }
}

/// One observed sentence instance of a claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Occurrence {
    /// Id of the sentence the claim was observed in.
    pub sentence_id: u64,
    /// Paragraph the sentence belongs to.
    pub paragraph_index: usize,
    /// Verbatim sentence text.
    pub original_sentence: String,
}

/// Verification state attached to a claim record.
///
/// `verdict == None` is the sole definition of "pending".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationBlock {
    /// Terminal verdict, unset while pending.
    pub verdict: Option<Verdict>,
    /// Confidence in [0, 1], unset while pending.
    pub confidence: Option<f32>,
    /// Short explanation of the decision.
    pub reasoning: Option<String>,
    /// Supporting source URLs, ordered by relevance.
    pub evidence_sources: Vec<String>,
    /// Stamp of the most recent verification pass; advances monotonically.
    pub verified_at: Option<DateTime<Utc>>,
}

impl VerificationBlock {
    /// The pending state every record starts in.
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            verdict: None,
            confidence: None,
            reasoning: None,
            evidence_sources: Vec::new(),
            verified_at: None,
        }
    }
}

/// A unique claim with every observation merged into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRecord {
    /// Canonical deduplication key.
    pub canonical_claim: CanonicalClaim,
    /// Append-only list of observed sentence instances; never empty.
    pub occurrences: Vec<Occurrence>,
    /// Current verification state.
    pub verification: VerificationBlock,
}

impl ClaimRecord {
    fn new(canonical_claim: CanonicalClaim) -> Self {
        Self {
            canonical_claim,
            occurrences: Vec::new(),
            verification: VerificationBlock::pending(),
        }
    }
}

/// Counts partitioned over the five lifecycle states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSummary {
    /// Claims with no verdict yet.
    pub pending: usize,
    /// Claims resolved VERIFIED.
    pub verified: usize,
    /// Claims resolved FALSE.
    #[serde(rename = "false")]
    pub false_claims: usize,
    /// Claims resolved PARTIALLY_VERIFIED.
    pub partially_verified: usize,
    /// Claims resolved UNVERIFIABLE.
    pub unverifiable: usize,
}

impl VerificationSummary {
    /// Sum over all five buckets; always equals the store size.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.pending
            + self.verified
            + self.false_claims
            + self.partially_verified
            + self.unverifiable
    }
}

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Update attempted on a canonical key that was never added.
    #[error("unknown canonical claim: {0}")]
    ClaimNotFound(String),
}

/// Deduplicating, insertion-ordered claim registry.
///
/// Pure in-memory structure, safe under concurrent writers; records are never
/// deleted by the core (archival is a collaborator concern). Cloning is cheap
/// and shares the underlying map.
#[derive(Debug, Default, Clone)]
pub struct ClaimStore {
    claims: Arc<RwLock<IndexMap<CanonicalClaim, ClaimRecord>>>,
}

impl ClaimStore {
    /// Registers one observation of a claim.
    ///
    /// Creates the record in the pending state on first sight of the key and
    /// appends the occurrence either way. Returns a snapshot of the record
    /// after the append.
    pub fn add_claim(&self, input: ClaimInput) -> ClaimRecord {
        let mut claims = self.claims.write();
        let record = claims
            .entry(input.canonical_claim.clone())
            .or_insert_with(|| ClaimRecord::new(input.canonical_claim));
        record.occurrences.push(Occurrence {
            sentence_id: input.sentence_id,
            paragraph_index: input.paragraph_index,
            original_sentence: input.original_sentence,
        });
        record.clone()
    }

    /// Replaces the verification block of an existing claim.
    ///
    /// Full overwrite, not a merge: callers supply the complete verdict tuple.
    /// `verified_at` is stamped now and forced strictly past any prior stamp
    /// so re-verification always advances it.
    pub fn update_verification(
        &self,
        canonical_claim: &CanonicalClaim,
        verdict: Verdict,
        confidence: f32,
        reasoning: impl Into<String>,
        evidence_sources: Vec<String>,
    ) -> Result<ClaimRecord, StoreError> {
        let mut claims = self.claims.write();
        let record = claims
            .get_mut(canonical_claim)
            .ok_or_else(|| StoreError::ClaimNotFound(canonical_claim.to_string()))?;
        let now = Utc::now();
        let stamp = match record.verification.verified_at {
            Some(prev) if prev >= now => prev + Duration::milliseconds(1),
            _ => now,
        };
        record.verification = VerificationBlock {
            verdict: Some(verdict),
            confidence: Some(confidence),
            reasoning: Some(reasoning.into()),
            evidence_sources,
            verified_at: Some(stamp),
        };
        Ok(record.clone())
    }

    /// Point lookup by canonical key.
    #[must_use]
    pub fn get_claim(&self, canonical_claim: &CanonicalClaim) -> Option<ClaimRecord> {
        self.claims.read().get(canonical_claim).cloned()
    }

    /// All pending records, in insertion order.
    #[must_use]
    pub fn unverified_claims(&self) -> Vec<ClaimRecord> {
        self.claims
            .read()
            .values()
            .filter(|record| record.verification.verdict.is_none())
            .cloned()
            .collect()
    }

    /// Records resolved VERIFIED, and only those; partial verification does
    /// not qualify.
    #[must_use]
    pub fn verified_claims(&self) -> Vec<ClaimRecord> {
        self.claims
            .read()
            .values()
            .filter(|record| record.verification.verdict == Some(Verdict::Verified))
            .cloned()
            .collect()
    }

    /// Snapshot of every record, in insertion order.
    #[must_use]
    pub fn all(&self) -> Vec<ClaimRecord> {
        self.claims.read().values().cloned().collect()
    }

    /// Number of unique claims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.claims.read().len()
    }

    /// True when no claim has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.read().is_empty()
    }

    /// Counts per lifecycle state.
    #[must_use]
    pub fn verification_summary(&self) -> VerificationSummary {
        let claims = self.claims.read();
        let mut summary = VerificationSummary::default();
        for record in claims.values() {
            match record.verification.verdict {
                None => summary.pending += 1,
                Some(Verdict::Verified) => summary.verified += 1,
                Some(Verdict::False) => summary.false_claims += 1,
                Some(Verdict::PartiallyVerified) => summary.partially_verified += 1,
                Some(Verdict::Unverifiable) => summary.unverifiable += 1,
            }
        }
        summary
    }

    /// Returns UNVERIFIABLE records to the pending state.
    ///
    /// Batch verification never retries UNVERIFIABLE claims on its own; this
    /// is the explicit lever for callers that want another pass. Returns how
    /// many records were reset.
    pub fn reset_unverifiable(&self) -> usize {
        let mut claims = self.claims.write();
        let mut reset = 0;
        for record in claims.values_mut() {
            if record.verification.verdict == Some(Verdict::Unverifiable) {
                record.verification = VerificationBlock::pending();
                reset += 1;
            }
        }
        reset
    }
}
