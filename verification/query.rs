use std::collections::HashSet;

use regex::Regex;

use credo_extraction::CanonicalClaim;

/// Hard cap on queries derived per claim.
pub const MAX_QUERIES: usize = 3;

const MIN_QUERY_WORDS: usize = 2;
const MAX_QUERY_WORDS: usize = 6;

/// Derives bounded, relevance-ranked search queries from a canonical claim.
///
/// Numeric anchors and subject+location pairs disambiguate better than
/// generic keyword joins, so they are tried first to give the first search
/// call the best chance of resolving the claim on its own. The optional
/// `context` (topic hint) is prefixed onto every query. Degenerate all-null
/// claims yield an empty list.
#[must_use]
pub fn build_queries(claim: &CanonicalClaim, context: &str) -> Vec<String> {
    if claim.is_degenerate() {
        return Vec::new();
    }
    let fields = claim.fields();
    let subject = fields.subject.map(despace);
    let predicate = fields.predicate.map(despace);
    let object = fields.object.map(despace);
    let time = fields.time.map(despace);
    let location = fields.location.map(despace);
    let source = fields.source.map(despace);

    let mut candidates = Vec::new();
    if let Some(subject) = subject.as_deref() {
        if let Some(object) = object.as_deref() {
            // A numeric fact is the highest-value search anchor.
            if let Some(anchor) = numeric_anchor(object) {
                candidates.push(format!("{subject} {anchor}"));
            } else {
                candidates.push(format!("{subject} {}", first_words(object, 3)));
            }
        }
        if let Some(location) = location.as_deref() {
            if !subject.to_lowercase().contains(&location.to_lowercase()) {
                candidates.push(format!("{subject} {location}"));
            }
        }
        if let Some(predicate) = predicate.as_deref() {
            let stripped = strip_copulas(predicate);
            if stripped.chars().count() > 2 {
                candidates.push(format!("{subject} {stripped}"));
            }
        }
    } else {
        let present: Vec<String> = [&predicate, &object, &time, &location, &source]
            .iter()
            .filter_map(|field| field.as_ref().cloned())
            .collect();
        if present.is_empty() {
            candidates.push(claim.as_str().replace(['|', '_'], " "));
        } else {
            candidates.push(present.join(" "));
        }
    }

    post_filter(candidates, context)
}

/// Drops empty, duplicate (case-insensitive), and out-of-bounds queries, then
/// truncates to the first [`MAX_QUERIES`] survivors in priority order.
fn post_filter(candidates: Vec<String>, context: &str) -> Vec<String> {
    let context = context.trim();
    let mut seen = HashSet::new();
    let mut queries = Vec::new();
    for candidate in candidates {
        let candidate = if context.is_empty() {
            candidate
        } else {
            format!("{context} {candidate}")
        };
        let candidate = candidate.split_whitespace().collect::<Vec<_>>().join(" ");
        if candidate.is_empty() {
            continue;
        }
        let words = candidate.split(' ').count();
        if !(MIN_QUERY_WORDS..=MAX_QUERY_WORDS).contains(&words) {
            continue;
        }
        if !seen.insert(candidate.to_lowercase()) {
            continue;
        }
        queries.push(candidate);
        if queries.len() == MAX_QUERIES {
            break;
        }
    }
    queries
}

fn despace(field: &str) -> String {
    field.replace('_', " ")
}

/// Extracts a salient quantity fragment: digits with optional thousands
/// separators, decimal part, or percent sign, plus the following unit word
/// for bare numbers.
fn numeric_anchor(object: &str) -> Option<String> {
    let re = Regex::new(r"(\d[\d,]*(?:\.\d+)?%?)(?:\s+([A-Za-z]+))?").unwrap();
    let caps = re.captures(object)?;
    let number = caps.get(1)?.as_str();
    if number.ends_with('%') {
        return Some(number.to_string());
    }
    match caps.get(2) {
        Some(unit) => Some(format!("{number} {}", unit.as_str())),
        None => Some(number.to_string()),
    }
}

fn first_words(text: &str, count: usize) -> String {
    text.split_whitespace()
        .take(count)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strips leading copulas so queries carry the content verb.
fn strip_copulas(predicate: &str) -> String {
    let mut stripped = predicate.trim();
    loop {
        if let Some(rest) = stripped.strip_prefix("be ") {
            stripped = rest.trim_start();
        } else if let Some(rest) = stripped.strip_prefix("is ") {
            stripped = rest.trim_start();
        } else {
            break;
        }
    }
    stripped.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(key: &str) -> CanonicalClaim {
        CanonicalClaim::parse(key).unwrap()
    }

    #[test]
    fn numeric_anchor_is_preferred_over_object_prefix() {
        let queries = build_queries(
            &claim("finance_minister|state|economy_grew_by_7.2%|last_year|null|null"),
            "",
        );
        assert_eq!(queries[0], "finance minister 7.2%");
        assert!(queries.contains(&"finance minister state".to_string()));
    }

    #[test]
    fn object_prefix_used_without_a_number() {
        let queries = build_queries(
            &claim("delhi_government|announce|new_transport_policy_details|null|null|null"),
            "",
        );
        assert_eq!(queries[0], "delhi government new transport policy");
    }

    #[test]
    fn location_is_skipped_when_redundant_with_subject() {
        let queries = build_queries(&claim("mumbai_police|arrest|suspects|null|mumbai|null"), "");
        assert!(queries.iter().all(|q| q != "mumbai police mumbai"));
    }

    #[test]
    fn location_query_added_when_distinct() {
        let queries = build_queries(&claim("health_ministry|report|outbreak|null|kerala|null"), "");
        assert!(queries.contains(&"health ministry kerala".to_string()));
    }

    #[test]
    fn bare_copula_predicate_is_dropped() {
        let queries = build_queries(&claim("minister|be|null|null|null|null"), "");
        assert!(queries.is_empty());
    }

    #[test]
    fn degenerate_claim_yields_no_queries() {
        assert!(build_queries(&claim("null|null|null|null|null|null"), "").is_empty());
    }

    #[test]
    fn missing_subject_falls_back_to_present_fields() {
        let queries = build_queries(&claim("null|announce|budget_cuts|2024|null|null"), "");
        assert_eq!(queries, vec!["announce budget cuts 2024".to_string()]);
    }

    #[test]
    fn context_prefixes_every_query() {
        let queries = build_queries(
            &claim("finance_minister|state|economy_grew_by_7.2%|last_year|null|null"),
            "india economy",
        );
        assert!(!queries.is_empty());
        for query in &queries {
            assert!(query.starts_with("india economy "));
        }
    }

    #[test]
    fn bounds_hold_for_every_query() {
        let keys = [
            "finance_minister|state|economy_grew_by_7.2%|last_year|null|null",
            "the_intergovernmental_climate_panel_committee_group|warn|rising_sea_levels|null|null|null",
            "nasa|launch|artemis_mission_with_1,200 sensors|2024|florida|null",
        ];
        for key in keys {
            let queries = build_queries(&claim(key), "");
            assert!(queries.len() <= MAX_QUERIES);
            let mut seen = HashSet::new();
            for query in &queries {
                let words = query.split(' ').count();
                assert!((2..=6).contains(&words), "bad word count in {query:?}");
                assert!(seen.insert(query.to_lowercase()), "duplicate {query:?}");
            }
        }
    }

    #[test]
    fn thousands_separated_number_keeps_its_unit_word() {
        assert_eq!(
            numeric_anchor("created 1,200 jobs nationwide"),
            Some("1,200 jobs".to_string())
        );
        assert_eq!(numeric_anchor("grew by 7.2% overall"), Some("7.2%".to_string()));
        assert_eq!(numeric_anchor("no figures at all"), None);
    }
}
