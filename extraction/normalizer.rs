use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::segmenter::{SentenceLabel, SentenceRecord};

/// Literal token standing in for an absent field.
pub const NULL_FIELD: &str = "null";

/// Number of fields in a canonical claim key.
pub const FIELD_COUNT: usize = 6;

/// Structured fields extracted from one factual sentence.
///
/// The extractor owns casing and snake_casing per field semantics; numbers are
/// preserved verbatim. Absent slots stay `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedFields {
    /// Main entity performing the action.
    pub subject: Option<String>,
    /// Lemmatized verb describing the action.
    pub predicate: Option<String>,
    /// Value or entity affected by the action.
    pub object: Option<String>,
    /// Time reference if present.
    pub time: Option<String>,
    /// Geographical location if present.
    pub location: Option<String>,
    /// Who made the claim (person or organization).
    pub source: Option<String>,
}

/// Normalizes one field slot for canonical key construction.
///
/// `None` and all-whitespace values collapse to the literal `"null"`. Embedded
/// pipe characters are escaped to spaces so a field can never smuggle the key
/// separator; anything else passes through verbatim.
#[must_use]
pub fn norm(value: Option<&str>) -> String {
    let Some(raw) = value else {
        return NULL_FIELD.to_string();
    };
    if raw.trim().is_empty() {
        return NULL_FIELD.to_string();
    }
    if raw.contains('|') {
        let escaped = raw.replace('|', " ");
        if escaped.trim().is_empty() {
            return NULL_FIELD.to_string();
        }
        return escaped;
    }
    raw.to_string()
}

/// Errors raised when parsing an externally supplied canonical key.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimFormatError {
    /// The key does not split into exactly six fields.
    #[error("expected {FIELD_COUNT} pipe-separated fields, found {found}")]
    WrongFieldCount {
        /// Number of fields found in the input.
        found: usize,
    },
    /// A field is empty; absent fields must carry the `null` token.
    #[error("field {index} is empty")]
    EmptyField {
        /// Zero-based index of the offending field.
        index: usize,
    },
}

/// The deduplication key: `subject|predicate|object|time|location|source`.
///
/// Two sentences that normalize to the same six-tuple are the same real-world
/// claim regardless of surface wording.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalClaim(String);

/// Borrowed view of a canonical key with `null` decoded to `None`.
#[derive(Debug, Clone, Copy)]
pub struct ClaimFields<'a> {
    /// Subject field.
    pub subject: Option<&'a str>,
    /// Predicate field.
    pub predicate: Option<&'a str>,
    /// Object field.
    pub object: Option<&'a str>,
    /// Time field.
    pub time: Option<&'a str>,
    /// Location field.
    pub location: Option<&'a str>,
    /// Source field.
    pub source: Option<&'a str>,
}

impl CanonicalClaim {
    /// Builds the key from extracted fields. Infallible: every slot is passed
    /// through [`norm`] first.
    #[must_use]
    pub fn from_fields(fields: &ExtractedFields) -> Self {
        let joined = [
            norm(fields.subject.as_deref()),
            norm(fields.predicate.as_deref()),
            norm(fields.object.as_deref()),
            norm(fields.time.as_deref()),
            norm(fields.location.as_deref()),
            norm(fields.source.as_deref()),
        ]
        .join("|");
        Self(joined)
    }

    /// Validates an externally supplied key. A malformed key is a contract
    /// violation on the caller's side, not a runtime condition.
    pub fn parse(raw: &str) -> Result<Self, ClaimFormatError> {
        let parts: Vec<&str> = raw.split('|').collect();
        if parts.len() != FIELD_COUNT {
            return Err(ClaimFormatError::WrongFieldCount { found: parts.len() });
        }
        for (index, part) in parts.iter().enumerate() {
            if part.is_empty() {
                return Err(ClaimFormatError::EmptyField { index });
            }
        }
        Ok(Self(raw.to_string()))
    }

    /// Raw key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes the six fields, mapping the `null` token to `None`.
    #[must_use]
    pub fn fields(&self) -> ClaimFields<'_> {
        let mut parts = self.0.split('|').map(|part| {
            if part == NULL_FIELD {
                None
            } else {
                Some(part)
            }
        });
        ClaimFields {
            subject: parts.next().flatten(),
            predicate: parts.next().flatten(),
            object: parts.next().flatten(),
            time: parts.next().flatten(),
            location: parts.next().flatten(),
            source: parts.next().flatten(),
        }
    }

    /// True when every field is absent (degenerate extraction).
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.0.split('|').all(|part| part == NULL_FIELD)
    }
}

impl fmt::Display for CanonicalClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors emitted by extraction backends.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Backend failure (model endpoint, transport).
    #[error("extraction backend error: {0}")]
    Backend(String),
    /// The backend replied with something that does not parse into fields.
    #[error("malformed extraction output: {0}")]
    Malformed(String),
}

/// Extracts structured fields from a factual sentence. Collaborator seam;
/// production deployments back this with a hosted model.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    /// Extracts the six field slots from one sentence.
    async fn extract(&self, sentence: &str) -> Result<ExtractedFields, ExtractionError>;
}

/// Deterministic token-slicing extractor for offline inference and tests.
///
/// Subject and predicate come from the first two tokens, the remainder joins
/// into the object, and a bare year token is promoted into the time slot.
#[derive(Debug, Default)]
pub struct LoopbackFieldExtractor;

#[async_trait]
impl FieldExtractor for LoopbackFieldExtractor {
    async fn extract(&self, sentence: &str) -> Result<ExtractedFields, ExtractionError> {
        let tokens: Vec<String> = sentence
            .split_whitespace()
            .map(|word| {
                word.trim_matches(|c: char| !(c.is_alphanumeric() || c == '%' || c == '.'))
                    .trim_matches('.')
                    .to_lowercase()
            })
            .filter(|token| !token.is_empty())
            .collect();
        if tokens.len() < 2 {
            return Err(ExtractionError::Malformed(format!(
                "sentence too short to extract fields: {sentence:?}"
            )));
        }
        let time = tokens.iter().find(|token| is_year(token)).cloned();
        let object = if tokens.len() > 2 {
            Some(tokens[2..].join("_"))
        } else {
            None
        };
        Ok(ExtractedFields {
            subject: Some(tokens[0].clone()),
            predicate: Some(tokens[1].clone()),
            object,
            time,
            location: None,
            source: None,
        })
    }
}

fn is_year(token: &str) -> bool {
    token.len() == 4
        && (token.starts_with("19") || token.starts_with("20"))
        && token.chars().all(|c| c.is_ascii_digit())
}

/// Errors surfaced by the normalizer itself.
///
/// A sentence that simply is not a fact claim is reported as `Ok(None)`, never
/// as an error, so callers can tell filtering apart from failure.
#[derive(Debug, Error)]
pub enum NormalizerError {
    /// The extraction collaborator failed for this sentence.
    #[error("field extraction failed: {0}")]
    ExtractionFailed(#[from] ExtractionError),
}

/// Unit handed to the claim store for one observed fact claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimInput {
    /// Canonical deduplication key.
    pub canonical_claim: CanonicalClaim,
    /// Sentence the claim was observed in.
    pub sentence_id: u64,
    /// Paragraph the sentence belongs to.
    pub paragraph_index: usize,
    /// Verbatim sentence text.
    pub original_sentence: String,
}

/// Turns labeled sentences into canonical claim inputs.
#[derive(Clone)]
pub struct ClaimNormalizer {
    extractor: Arc<dyn FieldExtractor>,
}

impl fmt::Debug for ClaimNormalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimNormalizer").finish()
    }
}

impl ClaimNormalizer {
    /// Creates a normalizer over the given extraction backend.
    #[must_use]
    pub fn new(extractor: Arc<dyn FieldExtractor>) -> Self {
        Self { extractor }
    }

    /// Normalizes one sentence.
    ///
    /// Returns `Ok(None)` when the sentence is not a labeled fact claim, and
    /// `Err(NormalizerError::ExtractionFailed)` when the extraction
    /// collaborator errored; the pipeline skips the sentence in both cases but
    /// only counts the latter as a failure.
    pub async fn normalize(
        &self,
        sentence: &SentenceRecord,
    ) -> Result<Option<ClaimInput>, NormalizerError> {
        if sentence.label != Some(SentenceLabel::FactClaim) {
            return Ok(None);
        }
        let fields = self.extractor.extract(&sentence.text).await?;
        Ok(Some(ClaimInput {
            canonical_claim: CanonicalClaim::from_fields(&fields),
            sentence_id: sentence.id,
            paragraph_index: sentence.paragraph_index,
            original_sentence: sentence.text.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingExtractor;

    #[async_trait]
    impl FieldExtractor for FailingExtractor {
        async fn extract(&self, _sentence: &str) -> Result<ExtractedFields, ExtractionError> {
            Err(ExtractionError::Backend("model endpoint down".into()))
        }
    }

    fn fact_sentence(text: &str) -> SentenceRecord {
        SentenceRecord {
            id: 7,
            text: text.into(),
            paragraph_index: 1,
            char_start: 0,
            char_end: text.chars().count(),
            contains_quote: false,
            label: Some(SentenceLabel::FactClaim),
        }
    }

    #[test]
    fn norm_collapses_absent_and_whitespace_to_null() {
        assert_eq!(norm(None), "null");
        assert_eq!(norm(Some("")), "null");
        assert_eq!(norm(Some("   ")), "null");
        assert_eq!(norm(Some("economy_grew_by_7.2%")), "economy_grew_by_7.2%");
    }

    #[test]
    fn norm_escapes_embedded_pipes() {
        assert_eq!(norm(Some("a|b")), "a b");
        assert_eq!(norm(Some("|")), "null");
    }

    #[test]
    fn canonical_key_matches_field_order() {
        let fields = ExtractedFields {
            subject: Some("finance_minister".into()),
            predicate: Some("state".into()),
            object: Some("economy_grew_by_7.2%".into()),
            time: Some("last_year".into()),
            location: None,
            source: None,
        };
        let claim = CanonicalClaim::from_fields(&fields);
        assert_eq!(
            claim.as_str(),
            "finance_minister|state|economy_grew_by_7.2%|last_year|null|null"
        );
        // Field-wise equal tuples always produce identical keys.
        assert_eq!(claim, CanonicalClaim::from_fields(&fields.clone()));
    }

    #[test]
    fn parse_rejects_malformed_keys() {
        assert_eq!(
            CanonicalClaim::parse("a|b"),
            Err(ClaimFormatError::WrongFieldCount { found: 2 })
        );
        assert_eq!(
            CanonicalClaim::parse("a||c|d|e|f"),
            Err(ClaimFormatError::EmptyField { index: 1 })
        );
        let parsed = CanonicalClaim::parse("a|b|c|null|null|null").unwrap();
        assert_eq!(parsed.fields().time, None);
        assert_eq!(parsed.fields().subject, Some("a"));
    }

    #[test]
    fn degenerate_key_is_detected() {
        let claim = CanonicalClaim::from_fields(&ExtractedFields::default());
        assert!(claim.is_degenerate());
        assert_eq!(claim.as_str(), "null|null|null|null|null|null");
    }

    #[tokio::test]
    async fn non_fact_sentences_are_filtered_not_failed() {
        let normalizer = ClaimNormalizer::new(Arc::new(LoopbackFieldExtractor));
        let mut sentence = fact_sentence("The finance minister said the economy grew.");
        sentence.label = Some(SentenceLabel::Opinion);
        assert!(normalizer.normalize(&sentence).await.unwrap().is_none());
        sentence.label = None;
        assert!(normalizer.normalize(&sentence).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn extraction_failure_is_distinguishable() {
        let normalizer = ClaimNormalizer::new(Arc::new(FailingExtractor));
        let sentence = fact_sentence("The finance minister said the economy grew.");
        let err = normalizer.normalize(&sentence).await.unwrap_err();
        assert!(matches!(err, NormalizerError::ExtractionFailed(_)));
    }

    #[tokio::test]
    async fn loopback_extractor_produces_stable_fields() {
        let normalizer = ClaimNormalizer::new(Arc::new(LoopbackFieldExtractor));
        let sentence = fact_sentence("Parliament approved the budget in 2024.");
        let claim = normalizer.normalize(&sentence).await.unwrap().unwrap();
        assert_eq!(claim.sentence_id, 7);
        assert_eq!(claim.paragraph_index, 1);
        let fields = claim.canonical_claim.fields();
        assert_eq!(fields.subject, Some("parliament"));
        assert_eq!(fields.time, Some("2024"));
    }
}
