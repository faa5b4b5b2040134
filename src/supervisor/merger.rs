//! Fan-in: summarise the final results without touching them.

use crate::state::{KindOutcome, RunState, RunSummary, Stage};
use crate::types::{TaskKind, TaskResult};
use std::collections::BTreeMap;

/// Outcome of one planned kind.
pub fn outcome_of(result: Option<&TaskResult>) -> KindOutcome {
    match result {
        Some(result) if result.is_success() => KindOutcome::Success,
        Some(_) => KindOutcome::PartialSuccess,
        None => KindOutcome::Missing,
    }
}

pub fn summarize(planned: &[TaskKind], results: &BTreeMap<TaskKind, TaskResult>) -> RunSummary {
    let outcomes: Vec<(TaskKind, KindOutcome)> = planned
        .iter()
        .map(|&kind| (kind, outcome_of(results.get(&kind))))
        .collect();
    let success_count = outcomes
        .iter()
        .filter(|(_, outcome)| *outcome == KindOutcome::Success)
        .count();

    RunSummary {
        total: outcomes.len(),
        success_count,
        outcomes,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FanInMerger;

impl FanInMerger {
    pub fn merge(&self, state: RunState) -> RunState {
        let summary = summarize(state.planned_task_kinds(), state.results());

        let detail = summary
            .outcomes
            .iter()
            .map(|(kind, outcome)| format!("{}: {}", kind, outcome))
            .collect::<Vec<_>>()
            .join(", ");
        let message = format!(
            "{}/{} succeeded after {} retries ({})",
            summary.success_count,
            summary.total,
            state.retry_count(),
            detail
        );
        tracing::info!(
            succeeded = summary.success_count,
            total = summary.total,
            retry_count = state.retry_count(),
            "fan-in complete"
        );

        state
            .with_summary(summary)
            .with_log(Stage::FanIn, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Payload, QueryParams};
    use std::collections::HashMap;

    #[test]
    fn test_outcomes_cover_planned_kinds() {
        let mut round = HashMap::new();
        round.insert(
            TaskKind::Market,
            TaskResult::success(TaskKind::Market, Payload::new(), "fine", vec![]).unwrap(),
        );
        round.insert(TaskKind::Policy, TaskResult::failed(TaskKind::Policy, "down"));

        let state = RunState::new(QueryParams::new())
            .with_selection(vec![TaskKind::Market, TaskKind::Policy, TaskKind::Survey])
            .with_round_results(round);
        let results_before = state.results().len();

        let state = FanInMerger.merge(state);
        let summary = state.summary().unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.outcome(TaskKind::Market), Some(KindOutcome::Success));
        assert_eq!(summary.outcome(TaskKind::Policy), Some(KindOutcome::PartialSuccess));
        assert_eq!(summary.outcome(TaskKind::Survey), Some(KindOutcome::Missing));
        assert_eq!(summary.outcome(TaskKind::Company), None);
        assert!(!summary.is_complete());
        assert_eq!(state.results().len(), results_before);

        let entry = state.log().last().unwrap();
        assert_eq!(entry.stage, Stage::FanIn);
        assert!(entry.message.starts_with("1/3 succeeded after 0 retries"));
    }
}
