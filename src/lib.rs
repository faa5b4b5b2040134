//! # trendscope
//!
//! A supervisor that runs several market-trend analyses concurrently,
//! checks each result against a quality bar, re-runs the ones that fall
//! short within a bounded retry budget, and merges everything into a
//! single run state that a renderer turns into a markdown report.
//!
//! ## Overview
//!
//! trendscope can be used in two ways:
//!
//! 1. **As a command-line tool** - Run the `trendscope` binary
//! 2. **As a library** - Embed the [`Supervisor`] with your own tasks
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use trendscope::{
//!     DuckDuckGoSearch, ExplicitClassifier, Provider, QualityThresholds, QueryParams,
//!     Research, ResearchOptions, Supervisor, TaskSet,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> trendscope::Result<()> {
//!     let llm = Provider::Ollama {
//!         base_url: "http://localhost:11434".to_string(),
//!         model: "llama3.2".to_string(),
//!     }
//!     .create_client()?;
//!
//!     let research = Research::new(llm, Arc::new(DuckDuckGoSearch::new()), ResearchOptions::default());
//!     let supervisor = Supervisor::new(
//!         TaskSet::from_research(research),
//!         Arc::new(ExplicitClassifier),
//!         QualityThresholds::default(),
//!     );
//!
//!     let state = supervisor
//!         .coordinate(QueryParams::new().with_region("Europe").with_tasks(["market", "policy"]))
//!         .await?;
//!     println!("{} retries", state.retry_count());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ollama` | Ollama local inference (default) |
//! | `openai` | OpenAI API and compatible endpoints |
//! | `all-llm` | Both providers |
//!
//! ## Modules
//!
//! - [`supervisor`] - Selection, fan-out, quality gate, retry control, fan-in
//! - [`tasks`] - The four analysis tasks
//! - [`state`] - The run state threaded through the supervisor
//! - [`report`] - Markdown report rendering
//! - [`llm`] - LLM client implementations
//! - [`tools`] - Web search
//! - [`types`] - Common types and error handling

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// Command-line parsing and terminal output.
pub mod cli;
/// LLM provider clients and abstractions.
pub mod llm;
/// Report rendering.
pub mod report;
/// Run state and run log.
pub mod state;
/// Orchestration of analysis rounds.
pub mod supervisor;
/// The analysis tasks.
pub mod tasks;
/// Web search.
pub mod tools;
/// Core types (task kinds, results, query parameters, errors).
pub mod types;
/// Configuration utilities (TOML).
pub mod utils;

// Re-export commonly used types
pub use llm::{LLMClient, Provider};
pub use report::{
    LlmReportRenderer, MarkdownReportRenderer, RenderOutcome, RenderStatus, ReportRenderer,
};
pub use state::{KindOutcome, RunState, RunSummary};
pub use supervisor::{
    Classifier, ExplicitClassifier, LlmClassifier, QualityThresholds, Supervisor,
};
pub use tasks::{Research, ResearchOptions, Task, TaskSet};
pub use tools::{DuckDuckGoSearch, WebSearch};
pub use types::{AppError, QueryParams, Result, TaskKind, TaskResult};
pub use utils::toml_config::{ConfigError, TrendConfig};
