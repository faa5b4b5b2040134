//! Market analysis: sales volume, market share, price trends and growth per
//! region.

use super::research::{MAX_BUILT_QUERIES, Research, extract_section, format_hits, sources_from};
use super::Task;
use crate::types::{Payload, QueryParams, Result, TaskKind, TaskResult};
use async_trait::async_trait;
use serde_json::json;

const BASE_REGIONS: [&str; 4] = ["Global", "North America", "Europe", "Asia"];

const TOPICS: [&str; 4] = [
    "electric vehicle market sales volume",
    "EV market share by manufacturer",
    "electric vehicle price trends",
    "EV market growth rate",
];

/// Headings the model is asked to produce, paired with their payload keys.
const SECTIONS: [(&str, &str); 4] = [
    ("executive_summary", "## Executive Summary"),
    ("global_analysis", "## Global Market Analysis"),
    ("regional_analysis", "## Regional Market Analysis"),
    ("investment_insights", "## Comparative Analysis and Investment Insights"),
];

const SYSTEM_PROMPT: &str = "You are a senior electric-vehicle market analyst. \
Write a markdown report grounded only in the supplied search results. \
Use exactly these second-level headings: \
## Executive Summary, ## Global Market Analysis, ## Regional Market Analysis, \
## Comparative Analysis and Investment Insights. \
Quote figures with their source number.";

pub struct MarketTask {
    research: Research,
}

impl MarketTask {
    pub fn new(research: Research) -> Self {
        Self { research }
    }
}

/// Region × topic queries followed by per-company sales queries for the
/// first two companies, capped at [`MAX_BUILT_QUERIES`].
pub fn build_queries(params: &QueryParams) -> Vec<String> {
    let period = params.period_or_current_year();

    let mut regions: Vec<String> = BASE_REGIONS.iter().map(|r| r.to_string()).collect();
    for region in &params.region {
        let region = region.trim();
        if !region.is_empty() && !regions.iter().any(|r| r.eq_ignore_ascii_case(region)) {
            regions.push(region.to_string());
        }
    }

    let mut queries = Vec::new();
    for region in &regions {
        for topic in TOPICS {
            queries.push(format!("{} {} {}", topic, region, period));
        }
        for company in params.companies.iter().take(2) {
            queries.push(format!(
                "{} electric vehicle sales {} {}",
                company, region, period
            ));
        }
    }

    queries.truncate(MAX_BUILT_QUERIES);
    queries
}

#[async_trait]
impl Task for MarketTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Market
    }

    async fn run(&self, params: &QueryParams) -> Result<TaskResult> {
        let queries = build_queries(params);
        let hits = self.research.gather(&queries).await;
        tracing::info!(
            task = %self.kind(),
            queries = queries.len(),
            hits = hits.len(),
            "market search complete"
        );

        let prompt = format!(
            "Request:\n{}\n\nSearch results ({} sources):\n{}",
            params.describe(),
            hits.len(),
            format_hits(&hits)
        );
        let report = self
            .research
            .llm
            .generate_with_system(SYSTEM_PROMPT, &prompt)
            .await?;

        let mut payload = Payload::new();
        for (key, heading) in SECTIONS {
            let section = extract_section(&report, heading)
                .unwrap_or_else(|| format!("{}\nSection not found", heading));
            payload.insert(key.to_string(), json!(section));
        }
        payload.insert("sources_count".to_string(), json!(hits.len()));
        payload.insert("search_queries_count".to_string(), json!(queries.len()));
        payload.insert("full_report".to_string(), json!(report));

        TaskResult::success(TaskKind::Market, payload, report, sources_from(&hits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queries_cover_base_regions() {
        let queries = build_queries(&QueryParams::new().with_period("2024"));
        assert_eq!(queries.len(), 16);
        assert!(queries[0].contains("Global 2024"));
        assert!(queries.iter().any(|q| q.contains("Asia")));
    }

    #[test]
    fn test_requested_region_is_appended_once() {
        let params = QueryParams::new()
            .with_period("2024")
            .with_region("Korea")
            .with_region("europe");
        let queries = build_queries(&params);
        assert_eq!(queries.len(), 20);
        assert!(queries.iter().any(|q| q.contains("Korea")));
        assert!(!queries.iter().any(|q| q.contains("europe")));
    }

    #[test]
    fn test_company_queries_are_capped() {
        let params = QueryParams::new()
            .with_period("2024")
            .with_region("Korea")
            .with_companies(["Tesla", "BYD", "Hyundai"]);
        let queries = build_queries(&params);
        assert_eq!(queries.len(), MAX_BUILT_QUERIES);
        assert!(queries.iter().any(|q| q.starts_with("BYD")));
        assert!(!queries.iter().any(|q| q.starts_with("Hyundai")));
    }
}
