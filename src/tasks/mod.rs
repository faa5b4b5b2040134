//! Analysis tasks dispatched by the supervisor.
//!
//! Each [`TaskKind`] maps to exactly one [`Task`] implementation through
//! [`TaskSet`]; the mapping is an exhaustive match, so adding a kind without
//! a task does not compile.

pub mod company;
pub mod market;
pub mod policy;
pub mod research;
pub mod survey;

use crate::types::{AppError, QueryParams, Result, TaskKind, TaskResult};
use async_trait::async_trait;
use std::sync::Arc;

pub use company::CompanyTask;
pub use market::MarketTask;
pub use policy::PolicyTask;
pub use research::{Research, ResearchOptions};
pub use survey::SurveyTask;

/// One unit of analysis work.
///
/// `run` may be slow and may fail; the executor turns errors into failed
/// results, so implementations simply propagate with `?`.
#[async_trait]
pub trait Task: Send + Sync {
    /// The kind this task produces results for
    fn kind(&self) -> TaskKind;

    async fn run(&self, params: &QueryParams) -> Result<TaskResult>;
}

/// Exhaustive task-kind → task mapping.
#[derive(Clone)]
pub struct TaskSet {
    survey: Arc<dyn Task>,
    market: Arc<dyn Task>,
    policy: Arc<dyn Task>,
    company: Arc<dyn Task>,
}

impl TaskSet {
    /// Build a set from one task per kind.
    ///
    /// # Errors
    ///
    /// [`AppError::Configuration`] when a task is placed in the slot of a
    /// different kind.
    pub fn new(
        survey: Arc<dyn Task>,
        market: Arc<dyn Task>,
        policy: Arc<dyn Task>,
        company: Arc<dyn Task>,
    ) -> Result<Self> {
        let set = Self {
            survey,
            market,
            policy,
            company,
        };

        for kind in TaskKind::ALL {
            let actual = set.get(kind).kind();
            if actual != kind {
                return Err(AppError::Configuration(format!(
                    "{} slot holds a {} task",
                    kind, actual
                )));
            }
        }
        Ok(set)
    }

    /// The web-search + LLM backed tasks.
    pub fn from_research(research: Research) -> Self {
        Self {
            survey: Arc::new(SurveyTask::new(research.clone())),
            market: Arc::new(MarketTask::new(research.clone())),
            policy: Arc::new(PolicyTask::new(research.clone())),
            company: Arc::new(CompanyTask::new(research)),
        }
    }

    pub fn get(&self, kind: TaskKind) -> Arc<dyn Task> {
        match kind {
            TaskKind::Survey => Arc::clone(&self.survey),
            TaskKind::Market => Arc::clone(&self.market),
            TaskKind::Policy => Arc::clone(&self.policy),
            TaskKind::Company => Arc::clone(&self.company),
        }
    }
}
