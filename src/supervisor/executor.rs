//! Fan-out execution of one round.
//!
//! Every selected kind gets its own tokio task in a `JoinSet`; the round
//! waits for all of them before returning. Failures stay inside their slot.

use crate::state::{RunState, Stage};
use crate::tasks::{Task, TaskSet};
use crate::types::{AppError, QueryParams, Result, TaskKind, TaskResult};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

pub struct FanOutExecutor {
    tasks: TaskSet,
    task_timeout: Option<Duration>,
}

impl FanOutExecutor {
    pub fn new(tasks: TaskSet) -> Self {
        Self {
            tasks,
            task_timeout: None,
        }
    }

    /// Limit each task's runtime; `None` waits indefinitely.
    pub fn with_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Run `kinds` concurrently and return exactly one result per kind.
    ///
    /// Errors, timeouts and panics become failed results. The spawned tasks
    /// live in a [`JoinSet`], so dropping this future aborts them.
    pub async fn execute(
        &self,
        kinds: &[TaskKind],
        params: &QueryParams,
    ) -> HashMap<TaskKind, TaskResult> {
        let params = Arc::new(params.clone());
        let mut set = JoinSet::new();

        for &kind in kinds {
            let task = self.tasks.get(kind);
            let params = Arc::clone(&params);
            let timeout = self.task_timeout;
            set.spawn(async move {
                let outcome = AssertUnwindSafe(run_one(task, &params, timeout))
                    .catch_unwind()
                    .await;
                (kind, outcome)
            });
        }

        let mut results = HashMap::with_capacity(kinds.len());
        while let Some(joined) = set.join_next().await {
            let (kind, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::error!(error = %e, "task join failed");
                    continue;
                }
            };

            let result = match outcome {
                Ok(Ok(result)) if result.task_kind() == kind => result,
                Ok(Ok(result)) => TaskResult::failed(
                    kind,
                    format!("task returned a {} result", result.task_kind()),
                ),
                Ok(Err(e)) => {
                    tracing::warn!(task = %kind, error = %e, "task failed");
                    TaskResult::failed(kind, e.to_string())
                }
                Err(panic) => {
                    let reason = panic_message(&*panic);
                    tracing::error!(task = %kind, reason = %reason, "task aborted");
                    TaskResult::failed(kind, format!("task aborted: panicked: {}", reason))
                }
            };
            results.insert(kind, result);
        }

        for &kind in kinds {
            results
                .entry(kind)
                .or_insert_with(|| TaskResult::failed(kind, "task aborted: cancelled"));
        }

        results
    }

    /// Execute the state's selected kinds and merge their results.
    ///
    /// # Errors
    ///
    /// [`AppError::Internal`] when the round would add a kind outside the
    /// first-round selection, or when the collected results do not cover
    /// exactly the dispatched kinds.
    pub async fn run_round(&self, state: RunState) -> Result<RunState> {
        let kinds = state.selected_task_kinds().to_vec();

        if let Some(extra) = kinds
            .iter()
            .find(|k| !state.planned_task_kinds().contains(k))
        {
            return Err(AppError::Internal(format!(
                "round selected {} which was not planned",
                extra
            )));
        }

        let results = self.execute(&kinds, state.query_params()).await;

        if results.len() != kinds.len() || !kinds.iter().all(|k| results.contains_key(k)) {
            return Err(AppError::Internal(format!(
                "round dispatched {} task(s) but collected {} result(s)",
                kinds.len(),
                results.len()
            )));
        }

        let succeeded = results.values().filter(|r| r.is_success()).count();
        let message = format!(
            "round {}: ran {} task(s), {} succeeded, {} failed",
            state.retry_count().saturating_add(1),
            kinds.len(),
            succeeded,
            kinds.len() - succeeded
        );
        tracing::info!(
            round = state.retry_count().saturating_add(1),
            tasks = kinds.len(),
            succeeded,
            "fan-out round complete"
        );

        Ok(state
            .with_round_results(results)
            .with_log(Stage::FanOut, message))
    }
}

async fn run_one(
    task: Arc<dyn Task>,
    params: &QueryParams,
    timeout: Option<Duration>,
) -> Result<TaskResult> {
    let kind = task.kind();
    let started = Instant::now();
    tracing::debug!(task = %kind, "task started");

    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, task.run(params))
            .await
            .map_err(|_| {
                AppError::Timeout(format!("{} task timed out after {:?}", kind, limit))
            })?,
        None => task.run(params).await,
    };

    tracing::debug!(
        task = %kind,
        elapsed_ms = started.elapsed().as_millis() as u64,
        ok = outcome.is_ok(),
        "task finished"
    );
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Payload;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Only the drop test lets a sleeping stub run to completion.
    static FINISHED_SLEEPS: AtomicUsize = AtomicUsize::new(0);

    enum Behaviour {
        Succeed,
        Fail,
        Panic,
        Sleep(Duration),
        WrongKind,
    }

    struct Stub {
        kind: TaskKind,
        behaviour: Behaviour,
    }

    #[async_trait]
    impl Task for Stub {
        fn kind(&self) -> TaskKind {
            self.kind
        }

        async fn run(&self, _params: &QueryParams) -> Result<TaskResult> {
            match &self.behaviour {
                Behaviour::Succeed => {
                    let payload: Payload = json!({"k": "v"}).as_object().cloned().unwrap();
                    TaskResult::success(self.kind, payload, "ok", vec![])
                }
                Behaviour::Fail => Err(AppError::Search("rate limited".to_string())),
                Behaviour::Panic => panic!("boom"),
                Behaviour::Sleep(d) => {
                    tokio::time::sleep(*d).await;
                    FINISHED_SLEEPS.fetch_add(1, Ordering::SeqCst);
                    TaskResult::success(self.kind, Payload::new(), "late", vec![])
                }
                Behaviour::WrongKind => {
                    TaskResult::success(TaskKind::Survey, Payload::new(), "?", vec![])
                }
            }
        }
    }

    fn set(market: Behaviour, policy: Behaviour) -> TaskSet {
        let stub = |kind, behaviour| -> Arc<dyn Task> { Arc::new(Stub { kind, behaviour }) };
        TaskSet::new(
            stub(TaskKind::Survey, Behaviour::Succeed),
            stub(TaskKind::Market, market),
            stub(TaskKind::Policy, policy),
            stub(TaskKind::Company, Behaviour::Succeed),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_failure_is_isolated_to_its_slot() {
        let executor = FanOutExecutor::new(set(Behaviour::Succeed, Behaviour::Fail));
        let results = executor
            .execute(&[TaskKind::Market, TaskKind::Policy], &QueryParams::new())
            .await;

        assert_eq!(results.len(), 2);
        assert!(results[&TaskKind::Market].is_success());
        let policy = &results[&TaskKind::Policy];
        assert!(!policy.is_success());
        assert!(policy.error().unwrap().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_panic_becomes_failed_result() {
        let executor = FanOutExecutor::new(set(Behaviour::Panic, Behaviour::Succeed));
        let results = executor
            .execute(&[TaskKind::Market, TaskKind::Policy], &QueryParams::new())
            .await;

        let market = &results[&TaskKind::Market];
        assert!(!market.is_success());
        assert_eq!(market.error(), Some("task aborted: panicked: boom"));
        assert!(results[&TaskKind::Policy].is_success());
    }

    #[tokio::test]
    async fn test_wrong_kind_result_is_rejected() {
        let executor = FanOutExecutor::new(set(Behaviour::WrongKind, Behaviour::Succeed));
        let results = executor.execute(&[TaskKind::Market], &QueryParams::new()).await;
        let market = &results[&TaskKind::Market];
        assert_eq!(market.task_kind(), TaskKind::Market);
        assert!(!market.is_success());
    }

    #[tokio::test]
    async fn test_timeout_becomes_failed_result() {
        let executor = FanOutExecutor::new(set(
            Behaviour::Sleep(Duration::from_secs(30)),
            Behaviour::Succeed,
        ))
        .with_task_timeout(Some(Duration::from_millis(50)));

        let results = executor
            .execute(&[TaskKind::Market, TaskKind::Policy], &QueryParams::new())
            .await;

        let market = &results[&TaskKind::Market];
        assert!(!market.is_success());
        assert!(market.error().unwrap().contains("timed out after 50ms"));
        assert!(results[&TaskKind::Policy].is_success());
    }

    #[tokio::test]
    async fn test_dropping_the_round_aborts_running_tasks() {
        let executor = FanOutExecutor::new(set(
            Behaviour::Sleep(Duration::from_millis(80)),
            Behaviour::Sleep(Duration::from_millis(80)),
        ));
        let params = QueryParams::new();

        let cut_short = tokio::time::timeout(
            Duration::from_millis(10),
            executor.execute(&[TaskKind::Market, TaskKind::Policy], &params),
        )
        .await;
        assert!(cut_short.is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(FINISHED_SLEEPS.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_round_rejects_unplanned_kind() {
        let executor = FanOutExecutor::new(set(Behaviour::Succeed, Behaviour::Succeed));
        let state = RunState::new(QueryParams::new())
            .with_selection(vec![TaskKind::Market])
            .with_selection(vec![TaskKind::Policy]);

        let result = executor.run_round(state).await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn test_run_round_logs_counts() {
        let executor = FanOutExecutor::new(set(Behaviour::Succeed, Behaviour::Fail));
        let state = RunState::new(QueryParams::new())
            .with_selection(vec![TaskKind::Market, TaskKind::Policy]);

        let state = executor.run_round(state).await.unwrap();
        assert_eq!(state.results().len(), 2);
        assert_eq!(
            state.log().last().unwrap().message,
            "round 1: ran 2 task(s), 1 succeeded, 1 failed"
        );
    }
}
