//! LLM client abstraction and provider selection
//!
//! Tasks and the classifier only ever see [`LLMClient`]; which backend sits
//! behind it is decided once, from configuration, through [`Provider`].

use crate::types::{AppError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Generic LLM client trait for provider abstraction
///
/// Clients are shared between concurrently running tasks, so implementations
/// must be `Send + Sync` and must not hold per-call state.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate a completion from a prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate with system prompt
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}

/// Provider enum for runtime selection
///
/// | Provider | Cargo feature | Notes |
/// |----------|---------------|-------|
/// | OpenAI | `openai` | Any OpenAI-compatible endpoint |
/// | Ollama | `ollama` (default) | Local inference |
#[derive(Debug, Clone, PartialEq)]
pub enum Provider {
    /// OpenAI API provider (including compatible APIs)
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::OpenAI {
    ///     api_key: "sk-...".to_string(),
    ///     api_base: "https://api.openai.com/v1".to_string(),
    ///     model: "gpt-4o-mini".to_string(),
    /// };
    /// ```
    OpenAI {
        api_key: String,
        api_base: String,
        model: String,
    },

    /// Ollama local LLM provider
    Ollama { base_url: String, model: String },
}

impl Provider {
    /// Create a shared client for this provider.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Configuration`] when the provider's cargo feature
    /// was not compiled in.
    pub fn create_client(&self) -> Result<Arc<dyn LLMClient>> {
        match self {
            #[cfg(feature = "openai")]
            Provider::OpenAI {
                api_key,
                api_base,
                model,
            } => Ok(Arc::new(super::openai::OpenAIClient::new(
                api_key.clone(),
                api_base.clone(),
                model.clone(),
            ))),

            #[cfg(feature = "ollama")]
            Provider::Ollama { base_url, model } => Ok(Arc::new(
                super::ollama::OllamaClient::new(base_url, model.clone())?,
            )),

            #[allow(unreachable_patterns)]
            other => Err(AppError::Configuration(format!(
                "{} provider is not enabled in this build; rebuild with `--features {}`",
                other.name(),
                other.feature()
            ))),
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAI { .. } => "OpenAI",
            Provider::Ollama { .. } => "Ollama",
        }
    }

    /// Cargo feature that compiles this provider in
    pub fn feature(&self) -> &'static str {
        match self {
            Provider::OpenAI { .. } => "openai",
            Provider::Ollama { .. } => "ollama",
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Provider::OpenAI { model, .. } | Provider::Ollama { model, .. } => model,
        }
    }
}
