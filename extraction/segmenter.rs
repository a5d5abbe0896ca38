use std::sync::atomic::{AtomicU64, Ordering};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Newsroom lead-in markers that always start a fresh paragraph.
pub const NEWSROOM_MARKERS: [&str; 5] = ["BREAKING:", "UPDATE:", "EXCLUSIVE:", "WATCH:", "JUST IN:"];

/// Sentences shorter than this are journalistic fragments ("However.", "But.")
/// and get folded into the preceding sentence.
const FRAGMENT_MIN_CHARS: usize = 12;

/// Label assigned to a sentence by classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SentenceLabel {
    /// Verifiable factual statement.
    FactClaim,
    /// Judgment, belief, or recommendation.
    Opinion,
    /// Sensational or emotionally loaded wording.
    Emotional,
    /// Background or descriptive information.
    Context,
    /// Headline marker or other non-prose scaffolding.
    Structural,
}

/// One segmented sentence with position metadata.
///
/// `char_start`/`char_end` are character offsets into the normalized document
/// (trimmed paragraphs joined by blank lines). The label is assigned exactly
/// once by classification and never changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceRecord {
    /// Monotonic id, scoped to the segmenter instance.
    pub id: u64,
    /// Sentence text, trimmed.
    pub text: String,
    /// Zero-based paragraph the sentence belongs to.
    pub paragraph_index: usize,
    /// Start offset into the normalized document.
    pub char_start: usize,
    /// End offset into the normalized document.
    pub char_end: usize,
    /// True when the sentence carries straight or curly quote characters.
    pub contains_quote: bool,
    /// Classification label, unset until the classifier runs.
    pub label: Option<SentenceLabel>,
}

/// Paragraph-aware sentence segmenter.
///
/// Ids increase monotonically per instance; callers that need a fresh id
/// space construct a fresh segmenter rather than relying on ambient state.
#[derive(Debug)]
pub struct SentenceSegmenter {
    next_id: AtomicU64,
    boundary_re: Regex,
}

impl SentenceSegmenter {
    /// Creates a segmenter with its id counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            boundary_re: Regex::new(r"[^.!?]+[.!?]+").unwrap(),
        }
    }

    /// Segments raw text into ordered sentence records.
    pub fn segment(&self, text: &str) -> Vec<SentenceRecord> {
        let normalized = normalize_newsroom_markers(text);
        let paragraphs = split_paragraphs(&normalized);

        let mut records = Vec::new();
        let mut char_offset = 0usize;
        for (paragraph_index, paragraph) in paragraphs.iter().enumerate() {
            for (start, end, sentence) in self.split_sentences(paragraph) {
                let contains_quote =
                    sentence.contains('"') || sentence.contains('\u{201c}') || sentence.contains('\u{201d}');
                records.push(SentenceRecord {
                    id: 0,
                    text: sentence,
                    paragraph_index,
                    char_start: char_offset + start,
                    char_end: char_offset + end,
                    contains_quote,
                    label: None,
                });
            }
            // +2 accounts for the blank-line separator in the normalized doc.
            char_offset += paragraph.chars().count() + 2;
        }

        let mut merged = merge_fragments(records);
        for record in &mut merged {
            record.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        }
        merged
    }

    /// Splits one paragraph into (char_start, char_end, text) spans.
    fn split_sentences(&self, paragraph: &str) -> Vec<(usize, usize, String)> {
        let mut spans = Vec::new();
        let mut last_end = 0usize;
        for found in self.boundary_re.find_iter(paragraph) {
            push_span(paragraph, found.start(), found.end(), &mut spans);
            last_end = found.end();
        }
        // Keep a trailing unterminated fragment.
        if !paragraph[last_end..].trim().is_empty() {
            push_span(paragraph, last_end, paragraph.len(), &mut spans);
        }
        spans
    }
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

fn push_span(
    paragraph: &str,
    byte_start: usize,
    byte_end: usize,
    out: &mut Vec<(usize, usize, String)>,
) {
    let slice = &paragraph[byte_start..byte_end];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return;
    }
    let lead = slice.len() - slice.trim_start().len();
    let trimmed_start = byte_start + lead;
    let char_start = paragraph[..trimmed_start].chars().count();
    let char_end = char_start + trimmed.chars().count();
    out.push((char_start, char_end, trimmed.to_string()));
}

/// Forces a paragraph break before every newsroom marker.
fn normalize_newsroom_markers(text: &str) -> String {
    let mut result = text.to_string();
    for marker in NEWSROOM_MARKERS {
        let pattern = format!(r"(\n\s*)?{}", regex::escape(marker));
        let re = Regex::new(&pattern).unwrap();
        result = re.replace_all(&result, format!("\n\n{marker}")).into_owned();
    }
    result
}

fn split_paragraphs(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Folds sentences shorter than the fragment threshold into their predecessor.
fn merge_fragments(records: Vec<SentenceRecord>) -> Vec<SentenceRecord> {
    let mut iter = records.into_iter();
    let Some(mut buffer) = iter.next() else {
        return Vec::new();
    };
    let mut merged = Vec::new();
    for current in iter {
        if current.text.chars().count() < FRAGMENT_MIN_CHARS {
            buffer.text.push(' ');
            buffer.text.push_str(&current.text);
            buffer.char_end = current.char_end;
            buffer.contains_quote = buffer.contains_quote || current.contains_quote;
        } else {
            merged.push(buffer);
            buffer = current;
        }
    }
    merged.push(buffer);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_paragraphs_with_ordered_spans() {
        let segmenter = SentenceSegmenter::new();
        let records = segmenter.segment(
            "The finance minister said the economy grew by 7.2% last year. Experts have disputed the figures.\n\nMarkets reacted calmly to the announcement.",
        );
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].paragraph_index, 0);
        assert_eq!(records[2].paragraph_index, 1);
        for pair in records.windows(2) {
            assert!(pair[0].id < pair[1].id);
            assert!(pair[0].char_end <= pair[1].char_start);
        }
        for record in &records {
            assert!(record.char_start < record.char_end);
            assert!(record.label.is_none());
        }
    }

    #[test]
    fn marker_forces_paragraph_break() {
        let segmenter = SentenceSegmenter::new();
        let records =
            segmenter.segment("Officials briefed the press earlier today. BREAKING: Fire breaks out in Mumbai.");
        let breaking = records
            .iter()
            .find(|r| r.text.starts_with("BREAKING:"))
            .unwrap();
        assert_eq!(breaking.paragraph_index, 1);
    }

    #[test]
    fn merges_short_fragments_into_predecessor() {
        let segmenter = SentenceSegmenter::new();
        let records = segmenter
            .segment("The economy grew strongly last year. However. Experts disputed the figures.");
        assert_eq!(records.len(), 2);
        assert!(records[0].text.ends_with("However."));
        // The merged span covers "The economy grew strongly last year. However."
        assert_eq!(records[0].char_start, 0);
        assert_eq!(records[0].char_end, 45);
    }

    #[test]
    fn detects_curly_and_straight_quotes() {
        let segmenter = SentenceSegmenter::new();
        let records = segmenter.segment(
            "\u{201c}We are confident of sustained growth,\u{201d} the minister added. Plain sentence follows here.",
        );
        assert!(records[0].contains_quote);
        assert!(!records[1].contains_quote);
    }

    #[test]
    fn ids_stay_monotonic_across_calls() {
        let segmenter = SentenceSegmenter::new();
        let first = segmenter.segment("One complete sentence here.");
        let second = segmenter.segment("Another complete sentence here.");
        assert!(first[0].id < second[0].id);
    }

    #[test]
    fn empty_input_yields_no_records() {
        let segmenter = SentenceSegmenter::new();
        assert!(segmenter.segment("   \n\n  ").is_empty());
    }
}
