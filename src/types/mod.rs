use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Longest excerpt kept for a single source record.
pub const MAX_EXCERPT_CHARS: usize = 300;

// ============= Task Types =============

/// The fixed set of analyses the supervisor can dispatch.
///
/// Declaration order is the canonical order used for "select all" and for
/// report sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Survey,
    Market,
    Policy,
    Company,
}

impl TaskKind {
    /// Every task kind, in canonical order.
    pub const ALL: [TaskKind; 4] = [
        TaskKind::Survey,
        TaskKind::Market,
        TaskKind::Policy,
        TaskKind::Company,
    ];

    /// Tag used in configuration, CLI flags and classifier output.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Survey => "survey",
            TaskKind::Market => "market",
            TaskKind::Policy => "policy",
            TaskKind::Company => "company",
        }
    }

    /// Heading used in logs and reports.
    pub fn display_name(&self) -> &'static str {
        match self {
            TaskKind::Survey => "Public Sentiment",
            TaskKind::Market => "Market Analysis",
            TaskKind::Policy => "Policy Analysis",
            TaskKind::Company => "Company Analysis",
        }
    }

    /// One-line capability description shown to the classifier.
    pub fn description(&self) -> &'static str {
        match self {
            TaskKind::Survey => "public opinion, consumer perception, purchase trends",
            TaskKind::Market => "market size, sales volume, price trends, market share",
            TaskKind::Policy => "government policy, regulation, subsidies, legislation",
            TaskKind::Company => "specific companies, strategy, financials, products",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "survey" => Ok(TaskKind::Survey),
            "market" => Ok(TaskKind::Market),
            "policy" => Ok(TaskKind::Policy),
            "company" => Ok(TaskKind::Company),
            other => Err(AppError::InvalidInput(format!(
                "Unknown task kind '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Failed,
}

// ============= Result Types =============

/// Provenance record attached to a task result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: Option<String>,
    pub excerpt: String,
}

impl Source {
    /// Build a source, truncating the excerpt to [`MAX_EXCERPT_CHARS`].
    pub fn new(title: impl Into<String>, url: Option<String>, excerpt: &str) -> Self {
        Self {
            title: title.into(),
            url: url.filter(|u| !u.trim().is_empty()),
            excerpt: excerpt.chars().take(MAX_EXCERPT_CHARS).collect(),
        }
    }

    /// Whether the url is a real web link (as opposed to a placeholder).
    pub fn is_web_link(&self) -> bool {
        self.url
            .as_deref()
            .map(|u| u.starts_with("http://") || u.starts_with("https://"))
            .unwrap_or(false)
    }
}

/// Free-form structured output of a task.
pub type Payload = Map<String, Value>;

/// Immutable outcome of one task invocation.
///
/// Constructed only through [`TaskResult::success`] and [`TaskResult::failed`],
/// so `status == Failed` holds exactly when `error` is present, and a
/// successful result always carries a summary or a payload.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    task_kind: TaskKind,
    status: TaskStatus,
    payload: Payload,
    summary: String,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    sources: Vec<Source>,
}

impl TaskResult {
    /// Create a successful result.
    ///
    /// Fails with [`AppError::InvalidInput`] when both payload and summary are
    /// empty; callers inside a task propagate this with `?` and the executor
    /// turns it into a failed result.
    pub fn success(
        task_kind: TaskKind,
        payload: Payload,
        summary: impl Into<String>,
        sources: Vec<Source>,
    ) -> Result<Self> {
        let summary = summary.into();
        if payload.is_empty() && summary.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "{} task produced neither a summary nor a payload",
                task_kind
            )));
        }

        Ok(Self {
            task_kind,
            status: TaskStatus::Success,
            payload,
            summary,
            created_at: Utc::now(),
            error: None,
            sources,
        })
    }

    /// Create a failed result with an empty payload and summary.
    pub fn failed(task_kind: TaskKind, error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "task failed without an error description".to_string();
        }

        Self {
            task_kind,
            status: TaskStatus::Failed,
            payload: Payload::new(),
            summary: String::new(),
            created_at: Utc::now(),
            error: Some(error),
            sources: Vec::new(),
        }
    }

    pub fn task_kind(&self) -> TaskKind {
        self.task_kind
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Summary length in characters.
    pub fn summary_len(&self) -> usize {
        self.summary.chars().count()
    }

    /// Size of the JSON-serialized payload in characters.
    pub fn payload_size(&self) -> usize {
        serde_json::to_string(&self.payload)
            .map(|s| s.chars().count())
            .unwrap_or(0)
    }
}

// ============= Query Types =============

/// Immutable input configuration for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    /// Target regions (e.g. "Korea", "Europe")
    #[serde(default)]
    pub region: Vec<String>,
    /// Analysis period (e.g. "2024")
    #[serde(default)]
    pub period: String,
    /// Companies of interest
    #[serde(default)]
    pub companies: Vec<String>,
    /// Keywords for sentiment and trend searches
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Explicitly requested task kinds, read by the explicit classifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<String>>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region.push(region.into());
        self
    }

    pub fn with_period(mut self, period: impl Into<String>) -> Self {
        self.period = period.into();
        self
    }

    pub fn with_companies<I, S>(mut self, companies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.companies = companies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tasks<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tasks = Some(tasks.into_iter().map(Into::into).collect());
        self
    }

    /// Whether a non-blank company list was supplied.
    pub fn has_companies(&self) -> bool {
        self.companies.iter().any(|c| !c.trim().is_empty())
    }

    /// The period, or the current year when none was given.
    pub fn period_or_current_year(&self) -> String {
        if self.period.trim().is_empty() {
            Utc::now().year().to_string()
        } else {
            self.period.clone()
        }
    }

    /// Deduplicated regions in input order, or `fallback` when none were given.
    pub fn regions_or(&self, fallback: &str) -> Vec<String> {
        let mut regions: Vec<String> = Vec::new();
        for region in self.region.iter().map(|r| r.trim()).filter(|r| !r.is_empty()) {
            if !regions.iter().any(|r| r == region) {
                regions.push(region.to_string());
            }
        }
        if regions.is_empty() {
            regions.push(fallback.to_string());
        }
        regions
    }

    /// Short "field: value" rendering used inside prompts.
    pub fn describe(&self) -> String {
        fn list(values: &[String]) -> String {
            if values.is_empty() {
                "N/A".to_string()
            } else {
                values.join(", ")
            }
        }

        format!(
            "- Region: {}\n- Period: {}\n- Companies: {}\n- Keywords: {}",
            list(&self.region),
            if self.period.is_empty() { "N/A" } else { &self.period },
            list(&self.companies),
            list(&self.keywords)
        )
    }
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
