//! Orchestration state threaded through one supervisor run.
//!
//! [`RunState`] is a value: each stage takes it by value and hands back an
//! updated copy through one of the `with_*` constructors, so every change a
//! stage makes is visible at the call site and nothing is aliased across
//! stages.

use crate::types::{QueryParams, TaskKind, TaskResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;

/// Pipeline stage that wrote a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Selection,
    FanOut,
    QualityCheck,
    FanIn,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Selection => "selection",
            Stage::FanOut => "fan-out",
            Stage::QualityCheck => "quality-check",
            Stage::FanIn => "fan-in",
        };
        f.write_str(name)
    }
}

/// One human-readable trace line.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub stage: Stage,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.at.to_rfc3339(), self.stage, self.message)
    }
}

/// Final per-kind outcome reported by the fan-in stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KindOutcome {
    Success,
    /// A result exists but its status is failed
    PartialSuccess,
    Missing,
}

impl fmt::Display for KindOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KindOutcome::Success => "success",
            KindOutcome::PartialSuccess => "partial success",
            KindOutcome::Missing => "missing",
        };
        f.write_str(name)
    }
}

/// Consolidated view of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub outcomes: Vec<(TaskKind, KindOutcome)>,
    pub success_count: usize,
    pub total: usize,
}

impl RunSummary {
    pub fn outcome(&self, kind: TaskKind) -> Option<KindOutcome> {
        self.outcomes
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, outcome)| *outcome)
    }

    /// True when every planned kind succeeded.
    pub fn is_complete(&self) -> bool {
        self.success_count == self.total
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    run_id: Uuid,
    query_params: QueryParams,
    /// Kinds chosen by the first (fresh) selection; results never cover more
    planned_task_kinds: Vec<TaskKind>,
    /// Kinds executed in the current round
    selected_task_kinds: Vec<TaskKind>,
    pending_retry_kinds: Vec<TaskKind>,
    retry_count: u32,
    results: BTreeMap<TaskKind, TaskResult>,
    continue_flag: bool,
    log: Vec<LogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<RunSummary>,
}

impl RunState {
    /// Fresh state: no selection, no results, `retry_count = 0`.
    pub fn new(query_params: QueryParams) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            query_params,
            planned_task_kinds: Vec::new(),
            selected_task_kinds: Vec::new(),
            pending_retry_kinds: Vec::new(),
            retry_count: 0,
            results: BTreeMap::new(),
            continue_flag: false,
            log: Vec::new(),
            summary: None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn query_params(&self) -> &QueryParams {
        &self.query_params
    }

    pub fn planned_task_kinds(&self) -> &[TaskKind] {
        &self.planned_task_kinds
    }

    pub fn selected_task_kinds(&self) -> &[TaskKind] {
        &self.selected_task_kinds
    }

    pub fn pending_retry_kinds(&self) -> &[TaskKind] {
        &self.pending_retry_kinds
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn results(&self) -> &BTreeMap<TaskKind, TaskResult> {
        &self.results
    }

    pub fn result(&self, kind: TaskKind) -> Option<&TaskResult> {
        self.results.get(&kind)
    }

    pub fn continue_flag(&self) -> bool {
        self.continue_flag
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    /// Whether the next selection should re-run previously failing kinds.
    pub fn is_retry_round(&self) -> bool {
        !self.pending_retry_kinds.is_empty()
    }

    /// Set the kinds for the coming round. The first selection also fixes
    /// the planned set.
    pub fn with_selection(mut self, kinds: Vec<TaskKind>) -> Self {
        if self.planned_task_kinds.is_empty() {
            self.planned_task_kinds = kinds.clone();
        }
        self.selected_task_kinds = kinds;
        self
    }

    /// Overwrite the results for exactly the kinds in `round`; all other
    /// kinds keep their previous result.
    pub fn with_round_results(mut self, round: HashMap<TaskKind, TaskResult>) -> Self {
        self.results.extend(round);
        self
    }

    /// Record the quality gate's decision for this round.
    pub fn with_retry_decision(
        mut self,
        pending_retry_kinds: Vec<TaskKind>,
        continue_flag: bool,
        retry_count: u32,
    ) -> Self {
        self.pending_retry_kinds = pending_retry_kinds;
        self.continue_flag = continue_flag;
        self.retry_count = retry_count;
        self
    }

    pub fn with_summary(mut self, summary: RunSummary) -> Self {
        self.summary = Some(summary);
        self
    }

    /// Append a trace entry.
    pub fn with_log(mut self, stage: Stage, message: impl Into<String>) -> Self {
        self.log.push(LogEntry {
            at: Utc::now(),
            stage,
            message: message.into(),
        });
        self
    }
}
