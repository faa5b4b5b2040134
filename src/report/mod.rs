//! Report rendering for finished runs.
//!
//! Rendering never feeds back into orchestration: a failed render is
//! reported through [`RenderOutcome`] and the run state is left as is.

mod synthesis;

pub use synthesis::LlmReportRenderer;

use crate::state::{KindOutcome, RunState, RunSummary};
use crate::supervisor::merger::summarize;
use crate::types::{Result, TaskKind, TaskResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const DEFAULT_TITLE: &str = "EV Market Trend Report";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderOutcome {
    pub status: RenderStatus,
    pub output_locations: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RenderOutcome {
    pub fn success(locations: Vec<PathBuf>) -> Self {
        Self {
            status: RenderStatus::Success,
            output_locations: locations,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: RenderStatus::Failed,
            output_locations: Vec::new(),
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait ReportRenderer: Send + Sync {
    /// Render `state`, optionally under a caller-chosen output name.
    async fn render(&self, state: &RunState, name_hint: Option<&str>) -> RenderOutcome;
}

/// Writes a markdown document into `output_dir`.
pub struct MarkdownReportRenderer {
    output_dir: PathBuf,
    title: String,
}

impl MarkdownReportRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            title: DEFAULT_TITLE.to_string(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

#[async_trait]
impl ReportRenderer for MarkdownReportRenderer {
    async fn render(&self, state: &RunState, name_hint: Option<&str>) -> RenderOutcome {
        let now = Utc::now();
        let document = render_markdown(state, &self.title, now);
        finish(write_document(&self.output_dir, output_name(name_hint, now), &document).await)
    }
}

/// File name for a report. Directory components of the hint are dropped,
/// a `.pdf` suffix becomes `.md`, and a missing hint yields
/// `trend_report_<YYYYmmdd_HHMMSS>.md`.
pub fn output_name(hint: Option<&str>, now: DateTime<Utc>) -> String {
    let file_name = hint
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .and_then(|h| Path::new(h).file_name())
        .and_then(|f| f.to_str())
        .map(str::to_string);

    let Some(name) = file_name else {
        return format!("trend_report_{}.md", now.format("%Y%m%d_%H%M%S"));
    };

    if let Some(stem) = name.strip_suffix(".pdf") {
        format!("{}.md", stem)
    } else if name.ends_with(".md") {
        name
    } else {
        format!("{}.md", name)
    }
}

async fn write_document(dir: &Path, file_name: String, document: &str) -> Result<PathBuf> {
    let path = dir.join(file_name);
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(&path, document).await?;
    Ok(path)
}

fn finish(written: Result<PathBuf>) -> RenderOutcome {
    match written {
        Ok(path) => {
            tracing::info!(path = %path.display(), "report written");
            RenderOutcome::success(vec![path])
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to write report");
            RenderOutcome::failed(e.to_string())
        }
    }
}

/// Planned kinds in canonical order.
fn planned_kinds(state: &RunState) -> Vec<TaskKind> {
    TaskKind::ALL
        .into_iter()
        .filter(|k| state.planned_task_kinds().contains(k))
        .collect()
}

fn run_summary(state: &RunState, planned: &[TaskKind]) -> RunSummary {
    match state.summary() {
        Some(summary) => summary.clone(),
        None => summarize(planned, state.results()),
    }
}

fn document_header(state: &RunState, title: &str, generated_at: DateTime<Utc>) -> String {
    format!(
        "# {}\n\n_Generated {} · run {}_\n\n",
        title,
        generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        state.run_id()
    )
}

fn totals_line(state: &RunState, summary: &RunSummary) -> String {
    format!(
        "{}/{} analyses succeeded. Retries performed: {}.\n",
        summary.success_count,
        summary.total,
        state.retry_count()
    )
}

/// Body text for one kind's section.
fn section_body(result: &TaskResult) -> &str {
    result
        .payload()
        .get("full_report")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| result.summary())
}

/// Push model-written headings one level down so they nest under the
/// section heading.
fn demote_headings(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.starts_with('#') {
                format!("#{}", line)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Web sources of successful results, first occurrence of each url wins.
fn web_references(state: &RunState, planned: &[TaskKind]) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    planned
        .iter()
        .filter_map(|&kind| state.result(kind))
        .filter(|r| r.is_success())
        .flat_map(|r| r.sources())
        .filter(|s| s.is_web_link())
        .filter_map(|s| {
            let url = s.url.clone()?;
            seen.insert(url.clone()).then(|| (s.title.clone(), url))
        })
        .collect()
}

fn references_section(references: &[(String, String)]) -> String {
    if references.is_empty() {
        return String::new();
    }

    let mut section = String::from("## References\n\n");
    for (i, (title, url)) in references.iter().enumerate() {
        section.push_str(&format!("{}. [{}]({})\n", i + 1, title, url));
    }
    section
}

pub fn render_markdown(state: &RunState, title: &str, generated_at: DateTime<Utc>) -> String {
    let planned = planned_kinds(state);
    let summary = run_summary(state, &planned);

    let mut doc = document_header(state, title, generated_at);

    doc.push_str("## Request\n\n");
    doc.push_str(&state.query_params().describe());
    doc.push_str("\n\n");

    doc.push_str("## Run Summary\n\n");
    doc.push_str("| Analysis | Outcome | Summary length | Sources | Completed |\n");
    doc.push_str("|----------|---------|----------------|---------|-----------|\n");
    for &kind in &planned {
        let outcome = summary.outcome(kind).unwrap_or(KindOutcome::Missing);
        let (length, sources, completed) = match state.result(kind) {
            Some(r) => (
                r.summary_len(),
                r.sources().len(),
                r.created_at().format("%H:%M:%S UTC").to_string(),
            ),
            None => (0, 0, "-".to_string()),
        };
        doc.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            kind.display_name(),
            outcome,
            length,
            sources,
            completed
        ));
    }
    doc.push('\n');
    doc.push_str(&totals_line(state, &summary));
    doc.push('\n');

    for &kind in &planned {
        doc.push_str(&format!("## {}\n\n", kind.display_name()));
        match state.result(kind) {
            Some(result) if result.is_success() => {
                doc.push_str(&demote_headings(section_body(result).trim()));
                doc.push_str("\n\n");
            }
            Some(result) => {
                doc.push_str(&format!(
                    "> Analysis unavailable: {}\n\n",
                    result.error().unwrap_or("unknown error")
                ));
            }
            None => doc.push_str("> Analysis unavailable: no result was produced.\n\n"),
        }
    }

    doc.push_str(&references_section(&web_references(state, &planned)));
    doc
}
