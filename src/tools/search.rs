//! Web search backend used by the analysis tasks.
//!
//! The default implementation goes through the daedra crate, which uses
//! DuckDuckGo and needs no API key.

use crate::types::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One search hit, as consumed by the task pipelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub content: String,
}

/// A search provider. Implementations must be shareable across concurrently
/// running tasks.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;

    /// Provider name for logs
    fn name(&self) -> &str;
}

/// DuckDuckGo search powered by daedra
pub struct DuckDuckGoSearch;

impl DuckDuckGoSearch {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DuckDuckGoSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebSearch for DuckDuckGoSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidInput("Empty search query".to_string()));
        }

        let args = daedra::SearchArgs {
            query: query.to_string(),
            options: Some(daedra::SearchOptions {
                num_results: max_results,
                ..Default::default()
            }),
        };

        let response = daedra::tools::search::perform_search(&args)
            .await
            .map_err(|e| AppError::Search(format!("'{}': {}", query, e)))?;

        Ok(response
            .data
            .into_iter()
            .take(max_results)
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                content: r.description,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_name() {
        assert_eq!(DuckDuckGoSearch::new().name(), "duckduckgo");
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected_before_network() {
        let search = DuckDuckGoSearch::default();
        let result = search.search("   ", 3).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }
}
