use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

use crate::segmenter::{SentenceLabel, SentenceRecord, NEWSROOM_MARKERS};

/// Errors emitted by classification backends.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Backend failure (model endpoint, transport, malformed reply).
    #[error("classifier backend error: {0}")]
    Backend(String),
}

/// Labels sentences ahead of claim extraction.
///
/// Production deployments back this with a hosted model; only sentences
/// labeled [`SentenceLabel::FactClaim`] proceed to normalization.
#[async_trait]
pub trait SentenceClassifier: Send + Sync {
    /// Labels a single sentence.
    async fn classify(&self, sentence: &SentenceRecord)
        -> Result<SentenceLabel, ClassifierError>;
}

/// Deterministic rule-based classifier for offline inference and tests.
#[derive(Debug)]
pub struct HeuristicClassifier {
    attribution_re: Regex,
    opinion_cues: Vec<&'static str>,
    emotional_cues: Vec<&'static str>,
}

impl HeuristicClassifier {
    /// Creates a classifier with the default cue lists.
    #[must_use]
    pub fn new() -> Self {
        Self {
            attribution_re: Regex::new(
                r"(?i)\b(said|says|announced|reported|confirmed|stated|claimed|disputed|denied|according to)\b",
            )
            .unwrap(),
            opinion_cues: vec![
                "believe", "think", "should", "must", "opinion", "feel", "likely", "probably",
            ],
            emotional_cues: vec![
                "shocking", "outrage", "disaster", "terrifying", "unbelievable", "horrif",
            ],
        }
    }

    fn label_for(&self, text: &str) -> SentenceLabel {
        let trimmed = text.trim();
        if NEWSROOM_MARKERS
            .iter()
            .any(|marker| trimmed.starts_with(marker))
        {
            return SentenceLabel::Structural;
        }
        let lower = trimmed.to_lowercase();
        if self.opinion_cues.iter().any(|cue| lower.contains(cue)) {
            return SentenceLabel::Opinion;
        }
        if trimmed.contains('!') || self.emotional_cues.iter().any(|cue| lower.contains(cue)) {
            return SentenceLabel::Emotional;
        }
        if trimmed.chars().any(|c| c.is_ascii_digit())
            || trimmed.contains('%')
            || self.attribution_re.is_match(trimmed)
        {
            return SentenceLabel::FactClaim;
        }
        SentenceLabel::Context
    }
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SentenceClassifier for HeuristicClassifier {
    async fn classify(
        &self,
        sentence: &SentenceRecord,
    ) -> Result<SentenceLabel, ClassifierError> {
        Ok(self.label_for(&sentence.text))
    }
}
