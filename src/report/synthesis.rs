//! Report written by the model from the collected task results.
//!
//! The model gets every planned analysis plus the numbered web sources and
//! writes the narrative. The renderer then wraps that narrative with the
//! executive summary table, the per-area key figures and the references, so
//! the numbers in those parts always come from the run itself.

use super::{
    document_header, finish, output_name, planned_kinds, references_section, run_summary,
    section_body, totals_line, web_references, write_document, RenderOutcome, ReportRenderer,
    DEFAULT_TITLE,
};
use crate::llm::LLMClient;
use crate::state::{KindOutcome, RunState, RunSummary};
use crate::tasks::research::truncate_chars;
use crate::types::{AppError, Result, TaskKind, TaskResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You are a senior industry analyst writing a market trend report. \
Combine the analysis results you are given into one coherent markdown report. \
Use a `## ` heading for each major topic and cite web sources by their number, \
for example [3]. Only cite sources from the numbered list. \
Do not add a references section; it is appended separately.";

const MAX_SECTION_CHARS: usize = 6000;
const MAX_KEY_POINT_CHARS: usize = 160;

/// Asks the model for one combined report and writes it as markdown.
pub struct LlmReportRenderer {
    llm: Arc<dyn LLMClient>,
    output_dir: PathBuf,
    title: String,
}

impl LlmReportRenderer {
    pub fn new(llm: Arc<dyn LLMClient>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            llm,
            output_dir: output_dir.into(),
            title: DEFAULT_TITLE.to_string(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Build the full document. Fails when the model call fails or the
    /// model returns nothing.
    pub async fn compose(&self, state: &RunState, generated_at: DateTime<Utc>) -> Result<String> {
        let planned = planned_kinds(state);
        let summary = run_summary(state, &planned);
        let references = web_references(state, &planned);

        let prompt = build_prompt(state, &planned, &references);
        let reply = self
            .llm
            .generate_with_system(SYSTEM_PROMPT, &prompt)
            .await?;
        let body = strip_first_title(&reply);
        if body.is_empty() {
            return Err(AppError::LLM("model returned an empty report".to_string()));
        }

        let executive = executive_summary(state, &planned, &summary);
        let mut doc = document_header(state, &self.title, generated_at);
        doc.push_str(&insert_before_first_section(&body, &executive));
        doc.push_str("\n\n");

        let figures = key_figures(state, &planned);
        if !figures.is_empty() {
            doc.push_str(&figures);
            doc.push('\n');
        }
        doc.push_str(&references_section(&references));
        Ok(doc)
    }
}

#[async_trait]
impl ReportRenderer for LlmReportRenderer {
    async fn render(&self, state: &RunState, name_hint: Option<&str>) -> RenderOutcome {
        let now = Utc::now();
        let document = match self.compose(state, now).await {
            Ok(document) => document,
            Err(e) => {
                tracing::error!(error = %e, model = self.llm.model_name(), "report synthesis failed");
                return RenderOutcome::failed(e.to_string());
            }
        };
        finish(write_document(&self.output_dir, output_name(name_hint, now), &document).await)
    }
}

fn build_prompt(state: &RunState, planned: &[TaskKind], references: &[(String, String)]) -> String {
    let mut prompt = format!("Request:\n{}\n\nAnalysis results:\n\n", state.query_params().describe());

    for &kind in planned {
        prompt.push_str(&format!("### {}\n", kind.display_name()));
        match state.result(kind) {
            Some(result) if result.is_success() => {
                prompt.push_str(&truncate_chars(section_body(result).trim(), MAX_SECTION_CHARS));
            }
            Some(result) => prompt.push_str(&format!(
                "No result (error: {})",
                result.error().unwrap_or("unknown error")
            )),
            None => prompt.push_str("No result"),
        }
        prompt.push_str("\n\n");
    }

    prompt.push_str("Web sources:\n");
    if references.is_empty() {
        prompt.push_str("No web sources were collected.\n");
    }
    for (i, (title, url)) in references.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n    URL: {}\n", i + 1, title, url));
    }
    prompt
}

/// Drop the first `# ` title line; the document carries its own.
fn strip_first_title(text: &str) -> String {
    let mut removed = false;
    text.lines()
        .filter(|line| {
            if !removed && line.starts_with("# ") {
                removed = true;
                false
            } else {
                true
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Put `block` right before the first `## ` heading of `body`, or in front
/// of everything when there is none.
fn insert_before_first_section(body: &str, block: &str) -> String {
    let at = if body.starts_with("## ") {
        Some(0)
    } else {
        body.find("\n## ").map(|i| i + 1)
    };

    match at {
        Some(i) => format!("{}{}\n{}", &body[..i], block, &body[i..]),
        None => format!("{}\n{}", block, body),
    }
}

fn executive_summary(state: &RunState, planned: &[TaskKind], summary: &RunSummary) -> String {
    let mut block = String::from("## Executive Summary\n\n");
    block.push_str("| Analysis | Outcome | Key points |\n");
    block.push_str("|----------|---------|------------|\n");
    for &kind in planned {
        let outcome = summary.outcome(kind).unwrap_or(KindOutcome::Missing);
        block.push_str(&format!(
            "| {} | {} | {} |\n",
            kind.display_name(),
            outcome,
            key_points(state.result(kind))
        ));
    }
    block.push('\n');
    block.push_str(&totals_line(state, summary));
    block
}

/// First line of prose in the result, or why there is none.
fn key_points(result: Option<&TaskResult>) -> String {
    let text = match result {
        Some(r) if r.is_success() => r
            .summary()
            .lines()
            .map(|line| line.trim().trim_start_matches(['-', '*']).trim())
            .find(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| truncate_chars(line, MAX_KEY_POINT_CHARS))
            .unwrap_or_else(|| "Completed without a written summary".to_string()),
        Some(r) => format!("Not available: {}", r.error().unwrap_or("unknown error")),
        None => "Not available: no result was produced".to_string(),
    };
    table_cell(&text)
}

fn table_cell(text: &str) -> String {
    text.replace('|', "/").replace('\n', " ")
}

fn key_figures(state: &RunState, planned: &[TaskKind]) -> String {
    let tables: Vec<String> = planned
        .iter()
        .filter_map(|&kind| state.result(kind))
        .filter(|r| r.is_success())
        .filter_map(figures_for)
        .collect();

    if tables.is_empty() {
        return String::new();
    }
    format!("## Key Figures\n\n{}", tables.join("\n"))
}

fn figures_for(result: &TaskResult) -> Option<String> {
    let payload = result.payload();
    let text = |key: &str| payload.get(key).map(value_text);

    match result.task_kind() {
        TaskKind::Survey => {
            let positive = text("positive_ratio")?;
            Some(format!(
                "### Public Sentiment\n\n| Overall | Positive | Neutral | Negative |\n\
                 |---------|----------|---------|----------|\n| {} | {}% | {}% | {}% |\n",
                text("overall_sentiment").unwrap_or_else(|| "-".to_string()),
                positive,
                text("neutral_ratio").unwrap_or_else(|| "-".to_string()),
                text("negative_ratio").unwrap_or_else(|| "-".to_string()),
            ))
        }
        TaskKind::Market => {
            let queries = text("search_queries_count")?;
            Some(format!(
                "### Market Coverage\n\n| Search queries | Sources |\n|----------------|---------|\n| {} | {} |\n",
                queries,
                text("sources_count").unwrap_or_else(|| "0".to_string()),
            ))
        }
        TaskKind::Policy => {
            let regions = payload.get("analyzed_regions")?.as_array()?;
            let areas = text("policy_areas").unwrap_or_else(|| "-".to_string());
            let mut table = String::from(
                "### Policy Coverage\n\n| Region | Policy areas |\n|--------|--------------|\n",
            );
            for region in regions {
                table.push_str(&format!("| {} | {} |\n", table_cell(&value_text(region)), areas));
            }
            Some(table)
        }
        TaskKind::Company => {
            let companies = payload.get("companies")?.as_array()?;
            let mut table = String::from("### Companies\n\n| Company |\n|---------|\n");
            for company in companies {
                table.push_str(&format!("| {} |\n", table_cell(&value_text(company))));
            }
            Some(table)
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}
