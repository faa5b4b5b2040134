//! Policy analysis: government programmes, subsidies, regulation and charging
//! infrastructure per region.

use super::research::{MAX_BUILT_QUERIES, Research, format_hits, sources_from};
use super::Task;
use crate::types::{Payload, QueryParams, Result, TaskKind, TaskResult};
use async_trait::async_trait;
use serde_json::json;

const DEFAULT_REGION: &str = "Korea";

const POLICY_AREAS: [(&str, &str); 4] = [
    ("policies", "electric vehicle government policy"),
    ("subsidies", "electric vehicle subsidies"),
    ("regulations", "electric vehicle emission regulation"),
    ("infrastructure", "electric vehicle charging infrastructure policy"),
];

const SYSTEM_PROMPT: &str = "You are a policy analyst covering electric vehicles. \
From the supplied search results, summarise government policy, purchase subsidies, \
emission regulation and charging-infrastructure programmes for each requested region, \
then assess their likely market impact. Answer in markdown and cite source numbers.";

pub struct PolicyTask {
    research: Research,
}

impl PolicyTask {
    pub fn new(research: Research) -> Self {
        Self { research }
    }
}

pub fn build_queries(params: &QueryParams) -> Vec<String> {
    let period = params.period_or_current_year();
    let period = period.as_str();
    let mut queries: Vec<String> = params
        .regions_or(DEFAULT_REGION)
        .iter()
        .flat_map(|region| {
            POLICY_AREAS
                .iter()
                .map(move |(_, topic)| format!("{} {} {}", region, topic, period))
        })
        .collect();
    queries.truncate(MAX_BUILT_QUERIES);
    queries
}

#[async_trait]
impl Task for PolicyTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Policy
    }

    async fn run(&self, params: &QueryParams) -> Result<TaskResult> {
        let queries = build_queries(params);
        let hits = self.research.gather(&queries).await;
        tracing::info!(
            task = %self.kind(),
            queries = queries.len(),
            hits = hits.len(),
            "policy search complete"
        );

        let prompt = format!(
            "Request:\n{}\n\nSearch results:\n{}",
            params.describe(),
            format_hits(&hits)
        );
        let analysis = self
            .research
            .llm
            .generate_with_system(SYSTEM_PROMPT, &prompt)
            .await?;

        let mut payload = Payload::new();
        payload.insert(
            "analyzed_regions".to_string(),
            json!(params.regions_or(DEFAULT_REGION)),
        );
        payload.insert(
            "policy_areas".to_string(),
            json!(POLICY_AREAS.iter().map(|(area, _)| *area).collect::<Vec<_>>()),
        );
        payload.insert("sources_count".to_string(), json!(hits.len()));
        payload.insert("search_queries".to_string(), json!(queries));

        TaskResult::success(TaskKind::Policy, payload, analysis, sources_from(&hits))
    }
}
