//! LLM provider clients
//!
//! Every provider implements [`LLMClient`]; [`Provider`] picks one at runtime
//! from configuration.
//!
//! # Supported Providers
//!
//! Enable providers via Cargo features:
//! - `ollama` - Local Ollama server (default)
//! - `openai` - OpenAI API and compatible endpoints
//!
//! # Example
//!
//! ```ignore
//! use trendscope::llm::Provider;
//!
//! let client = Provider::Ollama {
//!     base_url: "http://localhost:11434".to_string(),
//!     model: "llama3.2".to_string(),
//! }
//! .create_client()?;
//!
//! let answer = client.generate("Summarise EV sales in Europe").await?;
//! ```

/// Core LLM client trait and provider selection.
pub mod client;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "openai")]
pub mod openai;

pub use client::{LLMClient, Provider};
