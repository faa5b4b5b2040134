//! Retry controller: the bounded fan-out / quality-check loop.

use super::executor::FanOutExecutor;
use super::quality::QualityGate;
use super::selector::TaskSelector;
use crate::state::RunState;
use crate::types::{AppError, Result};
use std::fmt;
use std::time::Duration;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Select,
    FanOut,
    QualityCheck,
    FanIn,
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Select => "select",
            Phase::FanOut => "fan-out",
            Phase::QualityCheck => "quality-check",
            Phase::FanIn => "fan-in",
            Phase::Done => "done",
        }
    }

    fn allowed_transitions(&self) -> &'static [Phase] {
        match self {
            Phase::Select => &[Phase::FanOut],
            Phase::FanOut => &[Phase::QualityCheck],
            Phase::QualityCheck => &[Phase::FanOut, Phase::FanIn],
            Phase::FanIn => &[Phase::Done],
            Phase::Done => &[],
        }
    }

    pub fn can_transition(&self, to: Phase) -> bool {
        self.allowed_transitions().contains(&to)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge taken out of the quality check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Retry,
    Complete,
}

impl Route {
    /// Read the route off the gate's decision.
    pub fn from_state(state: &RunState) -> Result<Self> {
        match (state.continue_flag(), state.is_retry_round()) {
            (true, true) => Ok(Route::Retry),
            (false, false) => Ok(Route::Complete),
            (true, false) => Err(AppError::Internal(
                "quality gate asked to continue with nothing pending".to_string(),
            )),
            (false, true) => Err(AppError::Internal(
                "quality gate left kinds pending without continuing".to_string(),
            )),
        }
    }
}

/// Phase tracker for one run. Counts fan-out rounds and refuses to exceed
/// `max_rounds`.
#[derive(Debug)]
pub struct PhaseMachine {
    phase: Phase,
    rounds: u32,
    max_rounds: u32,
}

impl PhaseMachine {
    pub fn new(max_retry: u32) -> Self {
        Self {
            phase: Phase::Select,
            rounds: 0,
            max_rounds: max_retry.saturating_add(1),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn advance(&mut self, to: Phase) -> Result<()> {
        if !self.phase.can_transition(to) {
            return Err(AppError::Internal(format!(
                "invalid phase transition {} -> {}",
                self.phase, to
            )));
        }

        if to == Phase::FanOut {
            if self.rounds == self.max_rounds {
                return Err(AppError::Internal(format!(
                    "round limit of {} reached",
                    self.max_rounds
                )));
            }
            self.rounds += 1;
        }

        tracing::debug!(from = %self.phase, to = %to, round = self.rounds, "phase transition");
        self.phase = to;
        Ok(())
    }
}

pub struct RetryController {
    executor: FanOutExecutor,
    gate: QualityGate,
}

impl RetryController {
    pub fn new(executor: FanOutExecutor, gate: QualityGate) -> Self {
        Self { executor, gate }
    }

    pub fn with_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.executor = self.executor.with_task_timeout(timeout);
        self
    }

    pub fn gate(&self) -> &QualityGate {
        &self.gate
    }

    /// Run rounds until the gate stops asking for retries. Expects a state
    /// whose first selection has been made; leaves the machine in
    /// [`Phase::FanIn`].
    pub async fn run(
        &self,
        selector: &TaskSelector,
        machine: &mut PhaseMachine,
        mut state: RunState,
    ) -> Result<RunState> {
        machine.advance(Phase::FanOut)?;

        loop {
            state = self.executor.run_round(state).await?;
            machine.advance(Phase::QualityCheck)?;
            state = self.gate.evaluate(state);

            match Route::from_state(&state)? {
                Route::Retry => {
                    state = selector.select(state).await;
                    machine.advance(Phase::FanOut)?;
                }
                Route::Complete => {
                    machine.advance(Phase::FanIn)?;
                    return Ok(state);
                }
            }
        }
    }
}
