//! TOML-based configuration for trendscope
//!
//! Everything has a default, so an empty `trendscope.toml` (or none at all)
//! gives a working local setup: Ollama for the model, DuckDuckGo for search,
//! and the standard quality thresholds.
//!
//! ```toml
//! log_level = "info"
//!
//! [llm]
//! type = "openai"
//! api_key_env = "OPENAI_API_KEY"
//! model = "gpt-4o-mini"
//!
//! [quality]
//! min_summary_length = 100
//! min_payload_size = 50
//! max_retry = 2
//! ```

use crate::llm::Provider;
use crate::report::DEFAULT_TITLE;
use crate::supervisor::QualityThresholds;
use crate::tasks::ResearchOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "trendscope.toml";

/// Upper bound accepted for `quality.max_retry`.
pub const MAX_RETRY_LIMIT: u32 = 10;

/// Root configuration structure loaded from trendscope.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub llm: LlmConfig,

    /// Search limits shared by all tasks
    #[serde(default)]
    pub search: ResearchOptions,

    #[serde(default)]
    pub quality: QualityThresholds,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            llm: LlmConfig::default(),
            search: ResearchOptions::default(),
            quality: QualityThresholds::default(),
            executor: ExecutorConfig::default(),
            selection: SelectionConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

// ============= LLM Configuration =============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LlmConfig {
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        #[serde(default = "default_ollama_model")]
        model: String,
    },
    OpenAI {
        /// Environment variable containing API key
        #[serde(default = "default_openai_key_env")]
        api_key_env: String,
        #[serde(default = "default_openai_base")]
        api_base: String,
        #[serde(default = "default_openai_model")]
        model: String,
    },
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2".to_string()
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig::Ollama {
            base_url: default_ollama_url(),
            model: default_ollama_model(),
        }
    }
}

impl LlmConfig {
    pub fn model(&self) -> &str {
        match self {
            LlmConfig::Ollama { model, .. } | LlmConfig::OpenAI { model, .. } => model,
        }
    }

    /// Resolve into a [`Provider`], reading secrets from the environment.
    pub fn provider(&self) -> Result<Provider, ConfigError> {
        match self {
            LlmConfig::Ollama { base_url, model } => Ok(Provider::Ollama {
                base_url: base_url.clone(),
                model: model.clone(),
            }),
            LlmConfig::OpenAI {
                api_key_env,
                api_base,
                model,
            } => {
                let api_key = std::env::var(api_key_env)
                    .map_err(|_| ConfigError::MissingEnvVar(api_key_env.clone()))?;
                Ok(Provider::OpenAI {
                    api_key,
                    api_base: api_base.clone(),
                    model: model.clone(),
                })
            }
        }
    }
}

// ============= Executor / Selection / Report =============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Per-task time limit in seconds; absent means no limit
    #[serde(default)]
    pub task_timeout_secs: Option<u64>,
}

impl ExecutorConfig {
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Ask the model which analyses to run
    #[default]
    Llm,
    /// Use the task list given on the command line
    Explicit,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default)]
    pub mode: SelectionMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStyle {
    /// The model writes one combined report around the run's tables
    #[default]
    Llm,
    /// Task outputs laid out section by section, no extra model call
    Plain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_report_title")]
    pub title: String,

    #[serde(default)]
    pub style: ReportStyle,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs/reports")
}

fn default_report_title() -> String {
    DEFAULT_TITLE.to_string()
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            title: default_report_title(),
            style: ReportStyle::default(),
        }
    }
}

// ============= Loading & Validation =============

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),
}

impl TrendConfig {
    /// Load and validate configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: TrendConfig = toml::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// Like [`TrendConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(path.as_ref()) {
            Err(ConfigError::FileNotFound(missing)) => {
                tracing::info!(path = %missing.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Check values that parse but cannot work.
    ///
    /// Secrets are not checked here; they are resolved when the provider is
    /// built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.model().trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "llm.model must not be empty".to_string(),
            ));
        }

        if self.search.max_results == 0 {
            return Err(ConfigError::ValidationError(
                "search.max_results must be greater than 0".to_string(),
            ));
        }

        if self.search.max_queries == 0 {
            return Err(ConfigError::ValidationError(
                "search.max_queries must be greater than 0".to_string(),
            ));
        }

        if self.quality.max_retry > MAX_RETRY_LIMIT {
            return Err(ConfigError::ValidationError(format!(
                "quality.max_retry must be at most {} (got {})",
                MAX_RETRY_LIMIT, self.quality.max_retry
            )));
        }

        if self.executor.task_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationError(
                "executor.task_timeout_secs must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }
}
