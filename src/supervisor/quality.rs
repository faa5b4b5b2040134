//! Quality gate: decide which results are acceptable and whether another
//! round is worth running.

use crate::state::{RunState, Stage};
use crate::types::{TaskKind, TaskResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_MIN_SUMMARY_LENGTH: usize = 100;
pub const DEFAULT_MIN_PAYLOAD_SIZE: usize = 50;
pub const DEFAULT_MAX_RETRY: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Minimum summary length, in characters
    pub min_summary_length: usize,
    /// Minimum size of the JSON-serialized payload, in characters
    pub min_payload_size: usize,
    /// Retry rounds allowed after the first round
    pub max_retry: u32,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_summary_length: DEFAULT_MIN_SUMMARY_LENGTH,
            min_payload_size: DEFAULT_MIN_PAYLOAD_SIZE,
            max_retry: DEFAULT_MAX_RETRY,
        }
    }
}

/// Why a result was not accepted. Diagnostic only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityIssue {
    MissingResult,
    NotSuccessful,
    SummaryTooShort { actual: usize, required: usize },
    PayloadTooSmall { actual: usize, required: usize },
    ErrorReported(String),
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityIssue::MissingResult => write!(f, "no result"),
            QualityIssue::NotSuccessful => write!(f, "status failed"),
            QualityIssue::SummaryTooShort { actual, required } => {
                write!(f, "summary too short ({} < {})", actual, required)
            }
            QualityIssue::PayloadTooSmall { actual, required } => {
                write!(f, "payload too small ({} < {})", actual, required)
            }
            QualityIssue::ErrorReported(error) => write!(f, "error: {}", error),
        }
    }
}

/// Check one result against the thresholds. An empty list means accepted.
pub fn assess(result: Option<&TaskResult>, thresholds: &QualityThresholds) -> Vec<QualityIssue> {
    let Some(result) = result else {
        return vec![QualityIssue::MissingResult];
    };

    let mut issues = Vec::new();
    if !result.is_success() {
        issues.push(QualityIssue::NotSuccessful);
    }

    let summary_len = result.summary_len();
    if summary_len < thresholds.min_summary_length {
        issues.push(QualityIssue::SummaryTooShort {
            actual: summary_len,
            required: thresholds.min_summary_length,
        });
    }

    let payload_size = result.payload_size();
    if payload_size < thresholds.min_payload_size {
        issues.push(QualityIssue::PayloadTooSmall {
            actual: payload_size,
            required: thresholds.min_payload_size,
        });
    }

    if let Some(error) = result.error() {
        issues.push(QualityIssue::ErrorReported(error.to_string()));
    }

    issues
}

/// What the gate decided for one round.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityDecision {
    pub accepted: Vec<TaskKind>,
    /// Every kind that failed at least one check, with its reasons
    pub flagged: Vec<(TaskKind, Vec<QualityIssue>)>,
    /// Kinds to run next round; empty unless `continue_flag`
    pub pending_retry_kinds: Vec<TaskKind>,
    pub continue_flag: bool,
    pub retry_count: u32,
}

impl QualityDecision {
    /// Flagged kinds left as they are because the budget ran out.
    pub fn exhausted(&self) -> bool {
        !self.flagged.is_empty() && !self.continue_flag
    }
}

#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    thresholds: QualityThresholds,
}

impl QualityGate {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &QualityThresholds {
        &self.thresholds
    }

    /// Judge `selected` kinds in `results`. Pure.
    pub fn decide(
        &self,
        results: &BTreeMap<TaskKind, TaskResult>,
        selected: &[TaskKind],
        retry_count: u32,
    ) -> QualityDecision {
        let mut accepted = Vec::new();
        let mut flagged = Vec::new();

        for &kind in selected {
            let issues = assess(results.get(&kind), &self.thresholds);
            if issues.is_empty() {
                accepted.push(kind);
            } else {
                flagged.push((kind, issues));
            }
        }

        let continue_flag = !flagged.is_empty() && retry_count < self.thresholds.max_retry;
        let pending_retry_kinds = if continue_flag {
            flagged.iter().map(|(kind, _)| *kind).collect()
        } else {
            Vec::new()
        };

        QualityDecision {
            accepted,
            flagged,
            pending_retry_kinds,
            continue_flag,
            retry_count: if continue_flag {
                retry_count + 1
            } else {
                retry_count
            },
        }
    }

    /// Apply the decision for the current round to the state.
    pub fn evaluate(&self, state: RunState) -> RunState {
        let decision = self.decide(
            state.results(),
            state.selected_task_kinds(),
            state.retry_count(),
        );

        for (kind, issues) in &decision.flagged {
            let reasons = issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(task = %kind, %reasons, "result below quality bar");
        }

        let mut message = format!(
            "{}/{} accepted",
            decision.accepted.len(),
            decision.accepted.len() + decision.flagged.len()
        );
        for (kind, issues) in &decision.flagged {
            let reasons = issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            message.push_str(&format!("; {}: {}", kind, reasons));
        }
        if decision.continue_flag {
            message.push_str(&format!(
                "; retrying (retry {}/{})",
                decision.retry_count, self.thresholds.max_retry
            ));
        } else if decision.exhausted() {
            message.push_str("; retry budget exhausted, keeping current results");
        }

        tracing::info!(
            accepted = decision.accepted.len(),
            flagged = decision.flagged.len(),
            retry_count = decision.retry_count,
            continue_flag = decision.continue_flag,
            "quality check complete"
        );

        state
            .with_retry_decision(
                decision.pending_retry_kinds,
                decision.continue_flag,
                decision.retry_count,
            )
            .with_log(Stage::QualityCheck, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Payload, QueryParams};
    use rstest::rstest;
    use serde_json::json;
    use std::collections::HashMap;

    /// Payload whose serialized form is exactly `size` characters.
    fn payload_of_size(size: usize) -> Payload {
        // {"d":""} is 8 characters
        let filler = "x".repeat(size.saturating_sub(8));
        json!({ "d": filler }).as_object().cloned().unwrap()
    }

    fn success(kind: TaskKind, summary_len: usize, payload_size: usize) -> TaskResult {
        TaskResult::success(
            kind,
            payload_of_size(payload_size),
            "s".repeat(summary_len),
            vec![],
        )
        .unwrap()
    }

    #[rstest]
    #[case(150, 200, true)]
    #[case(100, 50, true)]
    #[case(99, 200, false)]
    #[case(150, 49, false)]
    #[case(0, 200, false)]
    fn test_assess_thresholds(
        #[case] summary_len: usize,
        #[case] payload_size: usize,
        #[case] accepted: bool,
    ) {
        let result = success(TaskKind::Market, summary_len, payload_size);
        assert_eq!(result.payload_size(), payload_size.max(8));
        let issues = assess(Some(&result), &QualityThresholds::default());
        assert_eq!(issues.is_empty(), accepted, "issues: {:?}", issues);
    }

    #[test]
    fn test_assess_failed_result_reports_every_reason() {
        let failed = TaskResult::failed(TaskKind::Policy, "api down");
        let issues = assess(Some(&failed), &QualityThresholds::default());
        assert_eq!(issues[0], QualityIssue::NotSuccessful);
        assert!(issues.contains(&QualityIssue::ErrorReported("api down".to_string())));
        assert_eq!(issues.len(), 4);
    }

    #[test]
    fn test_assess_missing_result() {
        assert_eq!(
            assess(None, &QualityThresholds::default()),
            vec![QualityIssue::MissingResult]
        );
    }

    #[rstest]
    #[case(0, true, 1)]
    #[case(1, true, 2)]
    #[case(2, false, 2)]
    fn test_retry_budget(
        #[case] retry_count: u32,
        #[case] expect_continue: bool,
        #[case] expect_count: u32,
    ) {
        let gate = QualityGate::default();
        let mut results = BTreeMap::new();
        results.insert(TaskKind::Market, success(TaskKind::Market, 20, 200));

        let decision = gate.decide(&results, &[TaskKind::Market], retry_count);
        assert_eq!(decision.continue_flag, expect_continue);
        assert_eq!(decision.retry_count, expect_count);
        assert_eq!(decision.pending_retry_kinds.is_empty(), !expect_continue);
        assert_eq!(decision.exhausted(), !expect_continue);
    }

    #[test]
    fn test_all_accepted_stops_without_counting() {
        let gate = QualityGate::default();
        let mut results = BTreeMap::new();
        results.insert(TaskKind::Market, success(TaskKind::Market, 150, 200));

        let decision = gate.decide(&results, &[TaskKind::Market], 0);
        assert!(!decision.continue_flag);
        assert_eq!(decision.retry_count, 0);
        assert_eq!(decision.accepted, vec![TaskKind::Market]);
        assert!(!decision.exhausted());
    }

    #[test]
    fn test_only_selected_kinds_are_judged() {
        let gate = QualityGate::default();
        let mut results = BTreeMap::new();
        results.insert(TaskKind::Market, success(TaskKind::Market, 10, 10));
        results.insert(TaskKind::Policy, success(TaskKind::Policy, 150, 200));

        let decision = gate.decide(&results, &[TaskKind::Policy], 0);
        assert!(decision.flagged.is_empty());
        assert!(!decision.continue_flag);
    }

    #[test]
    fn test_evaluate_updates_state_and_logs() {
        let mut round = HashMap::new();
        round.insert(TaskKind::Market, success(TaskKind::Market, 150, 200));
        round.insert(TaskKind::Policy, TaskResult::failed(TaskKind::Policy, "timeout"));

        let state = RunState::new(QueryParams::new())
            .with_selection(vec![TaskKind::Market, TaskKind::Policy])
            .with_round_results(round);

        let state = QualityGate::default().evaluate(state);
        assert!(state.continue_flag());
        assert_eq!(state.retry_count(), 1);
        assert_eq!(state.pending_retry_kinds(), &[TaskKind::Policy]);

        let entry = state.log().last().unwrap();
        assert_eq!(entry.stage, Stage::QualityCheck);
        assert!(entry.message.starts_with("1/2 accepted; policy: status failed"));
        assert!(entry.message.ends_with("retrying (retry 1/2)"));
    }
}
