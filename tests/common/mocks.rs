//! Mock implementations for testing.
//!
//! Shared between the integration test files so the supervisor and the
//! tasks can be exercised without a model server or network access.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trendscope::llm::LLMClient;
use trendscope::supervisor::{Classification, Classifier};
use trendscope::tasks::{Task, TaskSet};
use trendscope::tools::{SearchHit, WebSearch};
use trendscope::types::{AppError, Payload, QueryParams, Result, Source, TaskKind, TaskResult};

/// Mock LLM client returning a fixed reply.
///
/// ```ignore
/// let client = MockLLMClient::new("## Executive Summary\n...");
/// let client = MockLLMClient::failing();
/// ```
pub struct MockLLMClient {
    response: String,
    should_fail: bool,
    calls: AtomicUsize,
}

impl MockLLMClient {
    /// Create a new mock client that returns the given response.
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            should_fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a mock client that always returns an error.
    pub fn failing() -> Self {
        Self {
            response: String::new(),
            should_fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(AppError::LLM("Mock LLM failure".to_string()));
        }
        Ok(self.response.clone())
    }

    async fn generate_with_system(&self, _system: &str, prompt: &str) -> Result<String> {
        self.generate(prompt).await
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

/// Mock search returning the same hits for every query and recording the
/// queries it saw.
pub struct MockSearch {
    hits: Vec<SearchHit>,
    should_fail: bool,
    queries: Mutex<Vec<String>>,
}

impl MockSearch {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            should_fail: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// One hit per query, with a unique URL.
    pub fn single_hit() -> Self {
        Self::new(vec![SearchHit {
            title: "EV outlook".to_string(),
            url: "https://example.com/ev".to_string(),
            content: "Electric vehicle sales keep growing.".to_string(),
        }])
    }

    pub fn failing() -> Self {
        Self {
            hits: Vec::new(),
            should_fail: true,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebSearch for MockSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.should_fail {
            return Err(AppError::Search("Mock search failure".to_string()));
        }
        Ok(self.hits.iter().take(max_results).cloned().collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// What a [`ScriptedTask`] does on one invocation.
#[derive(Debug, Clone)]
pub enum Step {
    /// A result that clears the default quality bar
    Good,
    /// A successful result whose summary is too short
    Short,
    /// Return an error
    Fail(&'static str),
    /// Panic inside the task
    Panic,
    /// Sleep before returning a good result
    Slow(Duration),
}

/// Task that plays back a script, one step per invocation. The last step
/// repeats once the script runs out.
pub struct ScriptedTask {
    kind: TaskKind,
    script: Mutex<VecDeque<Step>>,
    last: Mutex<Step>,
    calls: AtomicUsize,
    finished: AtomicUsize,
}

impl ScriptedTask {
    pub fn new(kind: TaskKind, script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            script: Mutex::new(script.into()),
            last: Mutex::new(Step::Good),
            calls: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        })
    }

    pub fn always(kind: TaskKind, step: Step) -> Arc<Self> {
        Self::new(kind, vec![step])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Invocations that ran to completion without being aborted.
    pub fn finished_count(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let mut script = self.script.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(step) = script.pop_front() {
            *last = step;
        }
        last.clone()
    }
}

#[async_trait]
impl Task for ScriptedTask {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    async fn run(&self, _params: &QueryParams) -> Result<TaskResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = match self.next_step() {
            Step::Good => good_result(self.kind, call),
            Step::Short => short_result(self.kind),
            Step::Fail(message) => Err(AppError::LLM(message.to_string())),
            Step::Panic => panic!("scripted panic in {} task", self.kind),
            Step::Slow(delay) => {
                tokio::time::sleep(delay).await;
                good_result(self.kind, call)
            }
        };
        self.finished.fetch_add(1, Ordering::SeqCst);
        outcome
    }
}

/// A result that passes the default thresholds. `call` is recorded in the
/// payload so tests can tell which invocation produced it.
pub fn good_result(kind: TaskKind, call: usize) -> Result<TaskResult> {
    let payload: Payload = json!({
        "call": call,
        "full_report": format!("{} findings for invocation {}", kind.display_name(), call),
        "notes": "x".repeat(60),
    })
    .as_object()
    .cloned()
    .unwrap_or_default();

    TaskResult::success(
        kind,
        payload,
        format!("{} ", kind.display_name()).repeat(20),
        vec![Source::new(
            format!("{} source", kind),
            Some(format!("https://example.com/{}", kind)),
            "excerpt",
        )],
    )
}

pub fn short_result(kind: TaskKind) -> Result<TaskResult> {
    let payload: Payload = json!({ "notes": "x".repeat(60) })
        .as_object()
        .cloned()
        .unwrap_or_default();
    TaskResult::success(kind, payload, "too short", vec![])
}

/// Invocation number stored by [`good_result`].
pub fn call_of(result: &TaskResult) -> Option<u64> {
    result.payload().get("call").and_then(|v| v.as_u64())
}

pub struct Scripted {
    pub survey: Arc<ScriptedTask>,
    pub market: Arc<ScriptedTask>,
    pub policy: Arc<ScriptedTask>,
    pub company: Arc<ScriptedTask>,
}

impl Scripted {
    pub fn all_good() -> Self {
        Self::with(|_| vec![Step::Good])
    }

    pub fn with(script: impl Fn(TaskKind) -> Vec<Step>) -> Self {
        Self {
            survey: ScriptedTask::new(TaskKind::Survey, script(TaskKind::Survey)),
            market: ScriptedTask::new(TaskKind::Market, script(TaskKind::Market)),
            policy: ScriptedTask::new(TaskKind::Policy, script(TaskKind::Policy)),
            company: ScriptedTask::new(TaskKind::Company, script(TaskKind::Company)),
        }
    }

    pub fn get(&self, kind: TaskKind) -> &Arc<ScriptedTask> {
        match kind {
            TaskKind::Survey => &self.survey,
            TaskKind::Market => &self.market,
            TaskKind::Policy => &self.policy,
            TaskKind::Company => &self.company,
        }
    }

    pub fn task_set(&self) -> TaskSet {
        TaskSet::new(
            self.survey.clone(),
            self.market.clone(),
            self.policy.clone(),
            self.company.clone(),
        )
        .unwrap()
    }
}

/// Classifier with a canned answer.
pub struct FixedClassifier(pub Result<Classification>);

impl FixedClassifier {
    pub fn kinds(kinds: &[TaskKind]) -> Arc<Self> {
        Arc::new(Self(Ok(Classification::Classified(kinds.to_vec()))))
    }

    pub fn unclassifiable() -> Arc<Self> {
        Arc::new(Self(Ok(Classification::Unclassifiable)))
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self(Err(AppError::LLM("classifier offline".to_string()))))
    }
}

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, _params: &QueryParams) -> Result<Classification> {
        match &self.0 {
            Ok(classification) => Ok(classification.clone()),
            Err(e) => Err(AppError::LLM(e.to_string())),
        }
    }

    fn name(&self) -> &str {
        "fixed"
    }
}
