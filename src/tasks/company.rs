//! Company analysis: one LLM report per company of interest.

use super::research::{Research, format_hits, sources_from, truncate_chars};
use super::Task;
use crate::types::{Payload, QueryParams, Result, TaskKind, TaskResult};
use async_trait::async_trait;
use serde_json::json;

const DEFAULT_COMPANY: &str = "Tesla";

/// Hits per company that reach the prompt and the source list.
const HITS_PER_COMPANY: usize = 10;

const SUMMARY_CHARS: usize = 500;

const SYSTEM_PROMPT: &str = "You are an equity analyst covering the electric-vehicle \
supply chain. Using only the supplied search results, describe the company's recent \
financial performance, market position, strategy and production outlook. \
Answer in markdown and cite source numbers.";

pub struct CompanyTask {
    research: Research,
}

impl CompanyTask {
    pub fn new(research: Research) -> Self {
        Self { research }
    }
}

/// Requested companies, or the default one when none were given.
pub fn target_companies(params: &QueryParams) -> Vec<String> {
    let companies: Vec<String> = params
        .companies
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();

    if companies.is_empty() {
        vec![DEFAULT_COMPANY.to_string()]
    } else {
        companies
    }
}

pub fn build_queries(company: &str, period: &str) -> Vec<String> {
    vec![
        format!("{} {} earnings revenue operating profit", company, period),
        format!("{} electric vehicle battery market share {}", company, period),
        format!("{} latest news strategy {}", company, period),
        format!("{} stock price valuation {}", company, period),
        format!("{} electric vehicle production volume {}", company, period),
    ]
}

#[async_trait]
impl Task for CompanyTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Company
    }

    async fn run(&self, params: &QueryParams) -> Result<TaskResult> {
        let period = params.period_or_current_year();
        let companies = target_companies(params);

        let mut reports = Vec::with_capacity(companies.len());
        let mut sources = Vec::new();

        for company in &companies {
            let mut hits = self
                .research
                .gather(&build_queries(company, &period))
                .await;
            hits.truncate(HITS_PER_COMPANY);
            tracing::info!(task = %self.kind(), %company, hits = hits.len(), "company search complete");

            let prompt = format!(
                "Company: {}\nPeriod: {}\n\nSearch results:\n{}",
                company,
                period,
                format_hits(&hits)
            );
            let analysis = self
                .research
                .llm
                .generate_with_system(SYSTEM_PROMPT, &prompt)
                .await?;

            reports.push(format!("## {}\n\n{}", company, analysis));
            sources.extend(sources_from(&hits));
        }

        let full_report = reports.join("\n\n---\n\n");

        let mut payload = Payload::new();
        payload.insert("companies".to_string(), json!(companies));
        payload.insert("reports_count".to_string(), json!(reports.len()));
        payload.insert("full_report".to_string(), json!(full_report));

        let summary = truncate_chars(&full_report, SUMMARY_CHARS);
        TaskResult::success(TaskKind::Company, payload, summary, sources)
    }
}
