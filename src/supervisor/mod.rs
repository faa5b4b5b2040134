//! The supervisor: selection, bounded fan-out/quality-check rounds, fan-in.
//!
//! ```text
//! TaskSelector ──▶ FanOutExecutor ──▶ QualityGate ──▶ FanInMerger
//!                        ▲                 │
//!                        └──── retry ──────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use trendscope::supervisor::{ExplicitClassifier, QualityThresholds, Supervisor};
//!
//! let supervisor = Supervisor::new(tasks, Arc::new(ExplicitClassifier), QualityThresholds::default());
//! let state = supervisor
//!     .coordinate(QueryParams::new().with_region("Europe").with_tasks(["market"]))
//!     .await?;
//! ```

pub mod controller;
pub mod executor;
pub mod merger;
pub mod quality;
pub mod selector;

use crate::state::RunState;
use crate::tasks::TaskSet;
use crate::types::{QueryParams, Result};
use std::sync::Arc;
use std::time::Duration;

pub use controller::{Phase, PhaseMachine, RetryController, Route};
pub use executor::FanOutExecutor;
pub use merger::FanInMerger;
pub use quality::{QualityDecision, QualityGate, QualityIssue, QualityThresholds};
pub use selector::{Classification, Classifier, ExplicitClassifier, LlmClassifier, TaskSelector};

pub struct Supervisor {
    selector: TaskSelector,
    controller: RetryController,
    merger: FanInMerger,
}

impl Supervisor {
    pub fn new(
        tasks: TaskSet,
        classifier: Arc<dyn Classifier>,
        thresholds: QualityThresholds,
    ) -> Self {
        Self {
            selector: TaskSelector::new(classifier),
            controller: RetryController::new(
                FanOutExecutor::new(tasks),
                QualityGate::new(thresholds),
            ),
            merger: FanInMerger,
        }
    }

    /// Bound each task's runtime; on expiry the task counts as failed.
    pub fn with_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.controller = self.controller.with_task_timeout(timeout);
        self
    }

    pub fn thresholds(&self) -> &QualityThresholds {
        self.controller.gate().thresholds()
    }

    /// Run one full analysis.
    ///
    /// Task failures and quality shortfalls never surface as errors; they
    /// end up as failed or substandard results in the returned state. An
    /// error means an orchestration invariant was broken.
    pub async fn coordinate(&self, params: QueryParams) -> Result<RunState> {
        let mut machine = PhaseMachine::new(self.thresholds().max_retry);
        let state = RunState::new(params);
        tracing::info!(run_id = %state.run_id(), "run started");

        let state = self.selector.select(state).await;
        let state = self.controller.run(&self.selector, &mut machine, state).await?;
        let state = self.merger.merge(state);
        machine.advance(Phase::Done)?;

        tracing::info!(
            run_id = %state.run_id(),
            rounds = machine.rounds(),
            retry_count = state.retry_count(),
            "run finished"
        );
        Ok(state)
    }
}
