use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use credo_extraction::{CanonicalClaim, Verdict};

/// Structured verdict returned by a synthesis backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictOutcome {
    /// Terminal verdict.
    pub verdict: Verdict,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// Short explanation of the decision.
    pub reasoning: String,
    /// Supporting source URLs, ordered by relevance.
    pub evidence_sources: Vec<String>,
}

impl VerdictOutcome {
    /// Checks structural validity; backends must return a well-formed tuple
    /// or an error, never a half-parsed one.
    pub fn validate(&self) -> Result<(), SynthesisError> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(SynthesisError::Malformed(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// Errors emitted by synthesis backends.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// Backend failure (model endpoint, transport).
    #[error("synthesis backend error: {0}")]
    Backend(String),
    /// The backend replied with something that does not parse into a verdict.
    #[error("malformed synthesis output: {0}")]
    Malformed(String),
}

/// Verdict synthesis seam.
///
/// Implementations judge the claim against the supplied evidence only, never
/// outside knowledge; the engine guarantees this is not called with empty
/// evidence.
#[async_trait]
pub trait VerdictSynthesizer: Send + Sync {
    /// Produces a verdict for the claim from the evidence block.
    async fn synthesize(
        &self,
        claim: &CanonicalClaim,
        evidence: &str,
    ) -> Result<VerdictOutcome, SynthesisError>;
}

const CONTRADICTION_CUES: [&str; 5] = ["refuted", "denied", "false", "incorrect", "no evidence"];

/// Deterministic token-overlap synthesizer for tests and offline runs.
///
/// Coverage of the claim's field tokens by the evidence text drives the
/// verdict; contradiction cues flip well-covered claims to FALSE. Sources are
/// read back from the `URL:` lines of the evidence block.
#[derive(Debug, Default)]
pub struct LoopbackSynthesizer;

#[async_trait]
impl VerdictSynthesizer for LoopbackSynthesizer {
    async fn synthesize(
        &self,
        claim: &CanonicalClaim,
        evidence: &str,
    ) -> Result<VerdictOutcome, SynthesisError> {
        let tokens = claim_tokens(claim);
        if tokens.is_empty() {
            return Err(SynthesisError::Malformed(
                "claim has no content fields to judge".into(),
            ));
        }
        let evidence_lower = evidence.to_lowercase();
        let matched = tokens
            .iter()
            .filter(|token| evidence_lower.contains(token.as_str()))
            .count();
        #[allow(clippy::cast_precision_loss)]
        let coverage = matched as f32 / tokens.len() as f32;
        let contradicted = CONTRADICTION_CUES
            .iter()
            .any(|cue| evidence_lower.contains(cue));

        let outcome = if contradicted && coverage >= 0.4 {
            VerdictOutcome {
                verdict: Verdict::False,
                confidence: 0.7,
                reasoning: format!(
                    "evidence covers {matched}/{} claim tokens but carries contradiction cues",
                    tokens.len()
                ),
                evidence_sources: sources_from_evidence(evidence),
            }
        } else if coverage >= 0.8 {
            VerdictOutcome {
                verdict: Verdict::Verified,
                confidence: coverage.min(0.95),
                reasoning: format!("evidence covers {matched}/{} claim tokens", tokens.len()),
                evidence_sources: sources_from_evidence(evidence),
            }
        } else if coverage >= 0.4 {
            VerdictOutcome {
                verdict: Verdict::PartiallyVerified,
                confidence: 0.6,
                reasoning: format!(
                    "evidence covers only {matched}/{} claim tokens",
                    tokens.len()
                ),
                evidence_sources: sources_from_evidence(evidence),
            }
        } else {
            VerdictOutcome {
                verdict: Verdict::Unverifiable,
                confidence: 0.2,
                reasoning: "evidence does not cover the claim".into(),
                evidence_sources: Vec::new(),
            }
        };
        outcome.validate()?;
        Ok(outcome)
    }
}

fn claim_tokens(claim: &CanonicalClaim) -> Vec<String> {
    let fields = claim.fields();
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();
    for field in [
        fields.subject,
        fields.predicate,
        fields.object,
        fields.time,
        fields.location,
        fields.source,
    ]
    .into_iter()
    .flatten()
    {
        for token in field.replace('_', " ").split_whitespace() {
            let token = token.to_lowercase();
            if token.chars().count() > 2 && seen.insert(token.clone()) {
                tokens.push(token);
            }
        }
    }
    tokens
}

fn sources_from_evidence(evidence: &str) -> Vec<String> {
    evidence
        .lines()
        .filter_map(|line| line.trim().strip_prefix("URL: "))
        .map(str::to_string)
        .collect()
}
