//! Task selection: which kinds run in the coming round.
//!
//! A fresh run asks a [`Classifier`]; anything short of a usable answer
//! selects every kind. A retry round re-runs exactly the pending kinds.

use crate::llm::LLMClient;
use crate::state::{RunState, Stage};
use crate::tasks::research::first_json_object;
use crate::types::{QueryParams, Result, TaskKind};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Outcome of classifying a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Classified(Vec<TaskKind>),
    Unclassifiable,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, params: &QueryParams) -> Result<Classification>;

    /// Name for logs
    fn name(&self) -> &str;
}

/// Asks the language model which analyses the request needs.
pub struct LlmClassifier {
    llm: Arc<dyn LLMClient>,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }

    fn system_prompt() -> String {
        let kinds = TaskKind::ALL
            .iter()
            .map(|k| format!("- {}: {}", k.as_str(), k.description()))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"You plan an electric-vehicle trend analysis. Decide which analyses the request needs.

Available analyses:
{}

Respond with ONLY a JSON object such as {{"agents": ["market", "policy"]}}."#,
            kinds
        )
    }
}

/// Parse a classifier reply: the first JSON object's `"agents"` (or
/// `"tasks"`) array, unknown names dropped.
pub(crate) fn parse_classification(output: &str) -> Classification {
    let Some(object) = first_json_object(output) else {
        return Classification::Unclassifiable;
    };
    let Ok(value) = serde_json::from_str::<Value>(object) else {
        return Classification::Unclassifiable;
    };

    let names = value
        .get("agents")
        .or_else(|| value.get("tasks"))
        .and_then(Value::as_array);

    let kinds: Vec<TaskKind> = names
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .filter_map(|name| {
            let name = name.trim().to_lowercase();
            name.trim_end_matches("_agent")
                .trim_end_matches(" agent")
                .parse()
                .ok()
        })
        .collect();

    if kinds.is_empty() {
        Classification::Unclassifiable
    } else {
        Classification::Classified(kinds)
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, params: &QueryParams) -> Result<Classification> {
        let prompt = format!("Request:\n{}", params.describe());
        let response = self
            .llm
            .generate_with_system(&Self::system_prompt(), &prompt)
            .await?;

        let classification = parse_classification(&response);
        if classification == Classification::Unclassifiable {
            tracing::debug!(
                "Classifier could not parse output '{}', selecting all tasks",
                response
            );
        }
        Ok(classification)
    }

    fn name(&self) -> &str {
        "llm"
    }
}

/// Uses the kinds listed in [`QueryParams::tasks`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ExplicitClassifier;

#[async_trait]
impl Classifier for ExplicitClassifier {
    async fn classify(&self, params: &QueryParams) -> Result<Classification> {
        let Some(names) = params.tasks.as_ref() else {
            return Ok(Classification::Unclassifiable);
        };

        let mut kinds = Vec::new();
        for name in names {
            match name.parse::<TaskKind>() {
                Ok(kind) => kinds.push(kind),
                Err(e) => tracing::warn!(error = %e, "ignoring requested task"),
            }
        }

        Ok(if kinds.is_empty() {
            Classification::Unclassifiable
        } else {
            Classification::Classified(kinds)
        })
    }

    fn name(&self) -> &str {
        "explicit"
    }
}

/// Turn a classification attempt into the kinds for a fresh run.
///
/// Never returns an empty list. The result is duplicate-free and in
/// canonical order; `company` is added when companies were requested.
/// The second element carries notes for the run log.
pub fn resolve_selection(
    outcome: Result<Classification>,
    params: &QueryParams,
) -> (Vec<TaskKind>, Vec<String>) {
    let mut notes = Vec::new();

    let mut chosen: Vec<TaskKind> = match outcome {
        Ok(Classification::Classified(kinds)) => kinds,
        Ok(Classification::Unclassifiable) => {
            notes.push("classification inconclusive, selecting all tasks".to_string());
            TaskKind::ALL.to_vec()
        }
        Err(e) => {
            notes.push(format!("classification failed ({}), selecting all tasks", e));
            TaskKind::ALL.to_vec()
        }
    };

    if params.has_companies() && !chosen.contains(&TaskKind::Company) {
        notes.push("companies requested, adding company analysis".to_string());
        chosen.push(TaskKind::Company);
    }

    let kinds = TaskKind::ALL
        .into_iter()
        .filter(|kind| chosen.contains(kind))
        .collect();

    (kinds, notes)
}

fn join_kinds(kinds: &[TaskKind]) -> String {
    kinds
        .iter()
        .map(TaskKind::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct TaskSelector {
    classifier: Arc<dyn Classifier>,
}

impl TaskSelector {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self { classifier }
    }

    /// Select the kinds for the coming round and record them in the state.
    pub async fn select(&self, state: RunState) -> RunState {
        if state.is_retry_round() {
            let kinds = state.pending_retry_kinds().to_vec();
            let message = format!(
                "retry {}: re-running {}",
                state.retry_count(),
                join_kinds(&kinds)
            );
            tracing::info!(retry_count = state.retry_count(), kinds = %join_kinds(&kinds), "retry selection");
            return state
                .with_selection(kinds)
                .with_log(Stage::Selection, message);
        }

        let outcome = self.classifier.classify(state.query_params()).await;
        if let Err(e) = &outcome {
            tracing::warn!(classifier = self.classifier.name(), error = %e, "classification failed, selecting all tasks");
        }

        let (kinds, notes) = resolve_selection(outcome, state.query_params());
        tracing::info!(classifier = self.classifier.name(), kinds = %join_kinds(&kinds), "tasks selected");

        let mut message = format!(
            "selected {} ({} classifier)",
            join_kinds(&kinds),
            self.classifier.name()
        );
        for note in notes {
            message.push_str("; ");
            message.push_str(&note);
        }

        state
            .with_selection(kinds)
            .with_log(Stage::Selection, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AppError;

    struct Failing;

    #[async_trait]
    impl Classifier for Failing {
        async fn classify(&self, _params: &QueryParams) -> Result<Classification> {
            Err(AppError::LLM("connection refused".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_parse_classification_reads_agents() {
        let parsed = parse_classification(r#"Plan: {"agents": ["market", "Policy_agent", "weather"]}"#);
        assert_eq!(
            parsed,
            Classification::Classified(vec![TaskKind::Market, TaskKind::Policy])
        );
    }

    #[test]
    fn test_parse_classification_accepts_tasks_alias() {
        let parsed = parse_classification(r#"{"tasks": ["survey"]}"#);
        assert_eq!(parsed, Classification::Classified(vec![TaskKind::Survey]));
    }

    #[test]
    fn test_parse_classification_unparseable() {
        assert_eq!(parse_classification(""), Classification::Unclassifiable);
        assert_eq!(parse_classification("market please"), Classification::Unclassifiable);
        assert_eq!(parse_classification(r#"{"agents": []}"#), Classification::Unclassifiable);
        assert_eq!(parse_classification(r#"{"agents": "market"}"#), Classification::Unclassifiable);
    }

    #[test]
    fn test_resolve_dedupes_into_canonical_order() {
        let (kinds, notes) = resolve_selection(
            Ok(Classification::Classified(vec![
                TaskKind::Policy,
                TaskKind::Market,
                TaskKind::Policy,
            ])),
            &QueryParams::new(),
        );
        assert_eq!(kinds, vec![TaskKind::Market, TaskKind::Policy]);
        assert!(notes.is_empty());
    }

    #[test]
    fn test_resolve_fails_open() {
        let (kinds, _) = resolve_selection(
            Err(AppError::LLM("boom".to_string())),
            &QueryParams::new(),
        );
        assert_eq!(kinds, TaskKind::ALL.to_vec());

        let (kinds, _) = resolve_selection(Ok(Classification::Unclassifiable), &QueryParams::new());
        assert_eq!(kinds, TaskKind::ALL.to_vec());
    }

    #[test]
    fn test_resolve_adds_company_when_companies_given() {
        let params = QueryParams::new().with_companies(["Tesla"]);
        let (kinds, notes) =
            resolve_selection(Ok(Classification::Classified(vec![TaskKind::Market])), &params);
        assert_eq!(kinds, vec![TaskKind::Market, TaskKind::Company]);
        assert_eq!(notes.len(), 1);
    }

    #[tokio::test]
    async fn test_explicit_classifier() {
        let params = QueryParams::new().with_tasks(["market", "bogus"]);
        assert_eq!(
            ExplicitClassifier.classify(&params).await.unwrap(),
            Classification::Classified(vec![TaskKind::Market])
        );
        assert_eq!(
            ExplicitClassifier.classify(&QueryParams::new()).await.unwrap(),
            Classification::Unclassifiable
        );
    }

    #[tokio::test]
    async fn test_select_swallows_classifier_errors() {
        let selector = TaskSelector::new(Arc::new(Failing));
        let state = selector.select(RunState::new(QueryParams::new())).await;

        assert_eq!(state.selected_task_kinds(), &TaskKind::ALL);
        assert_eq!(state.log().len(), 1);
        assert!(state.log()[0].message.contains("classification failed"));
    }

    #[tokio::test]
    async fn test_select_in_retry_mode_uses_pending() {
        let selector = TaskSelector::new(Arc::new(Failing));
        let state = RunState::new(QueryParams::new())
            .with_selection(vec![TaskKind::Market, TaskKind::Policy])
            .with_retry_decision(vec![TaskKind::Policy], true, 1);

        let state = selector.select(state).await;
        assert_eq!(state.selected_task_kinds(), &[TaskKind::Policy]);
        assert_eq!(
            state.planned_task_kinds(),
            &[TaskKind::Market, TaskKind::Policy]
        );
        assert!(state.log()[0].message.starts_with("retry 1"));
    }
}
