use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{sleep, Duration};

/// One ranked evidence snippet returned by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Title of the hit.
    pub title: String,
    /// URL referencing the source.
    pub url: String,
    /// Summary text.
    pub snippet: String,
}

/// Errors emitted by search providers.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Provider failure (network, quota, backend).
    #[error("search provider error: {0}")]
    Provider(String),
}

/// Evidence search seam.
///
/// Empty result lists are a valid outcome, not an error; language/region
/// filtering and retry policy live behind this trait, not in the engine.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Runs one query, returning ranked hits.
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError>;
}

/// In-process provider over a seeded corpus, for tests and offline runs.
#[derive(Debug, Clone)]
pub struct LoopbackSearchClient {
    corpus: Vec<SearchHit>,
    max_results: usize,
}

impl LoopbackSearchClient {
    /// Creates an empty provider with the default result cap.
    #[must_use]
    pub fn new() -> Self {
        Self {
            corpus: Vec::new(),
            max_results: 5,
        }
    }

    /// Seeds one document into the corpus.
    #[must_use]
    pub fn with_document(
        mut self,
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        self.corpus.push(SearchHit {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        });
        self
    }

    /// Caps results per query.
    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }
}

impl Default for LoopbackSearchClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchProvider for LoopbackSearchClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        sleep(Duration::from_millis(5)).await;
        let tokens: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .filter(|token| token.chars().count() > 2)
            .collect();
        let hits = self
            .corpus
            .iter()
            .filter(|hit| {
                let haystack = format!("{} {}", hit.title, hit.snippet).to_lowercase();
                tokens.iter().any(|token| haystack.contains(token))
            })
            .take(self.max_results)
            .cloned()
            .collect();
        Ok(hits)
    }
}

/// Provider double that always errors; exercises the failure policy.
#[derive(Debug, Default)]
pub struct FailingSearchClient;

#[async_trait]
impl SearchProvider for FailingSearchClient {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, SearchError> {
        Err(SearchError::Provider("search backend offline".into()))
    }
}

/// Formats hits into the numbered evidence block handed to synthesis.
#[must_use]
pub fn format_evidence(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(idx, hit)| {
            format!(
                "{}. {}\n   {}\n   URL: {}",
                idx + 1,
                hit.title,
                hit.snippet,
                hit.url
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
