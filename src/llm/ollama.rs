use crate::llm::client::LLMClient;
use crate::types::{AppError, Result};
use async_trait::async_trait;
use ollama_rs::{
    Ollama,
    generation::chat::{ChatMessage, request::ChatMessageRequest},
};

const DEFAULT_PORT: u16 = 11434;

pub struct OllamaClient {
    client: Ollama,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: String) -> Result<Self> {
        let (scheme, host, port) = split_base_url(base_url)?;
        let client = Ollama::new(format!("{}://{}", scheme, host), port);

        Ok(Self { client, model })
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let request = ChatMessageRequest::new(self.model.clone(), messages);

        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| AppError::LLM(format!("Ollama error: {}", e)))?;

        Ok(response.message.content)
    }
}

/// Split `scheme://host[:port]` into its parts. A missing scheme means http,
/// a missing or unparsable port means 11434.
fn split_base_url(base_url: &str) -> Result<(String, String, u16)> {
    let trimmed = base_url.trim();
    let (scheme, rest) = match trimmed.split_once("://") {
        Some((scheme, rest)) => (scheme.to_string(), rest),
        None => ("http".to_string(), trimmed),
    };
    let rest = rest.trim_end_matches('/');

    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().unwrap_or(DEFAULT_PORT)),
        None => (rest, DEFAULT_PORT),
    };

    if host.is_empty() {
        return Err(AppError::Configuration(format!(
            "Invalid Ollama base URL '{}'",
            base_url
        )));
    }

    Ok((scheme, host.to_string(), port))
}

#[async_trait]
impl LLMClient for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.chat(vec![ChatMessage::user(prompt.to_string())]).await
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.chat(vec![
            ChatMessage::system(system.to_string()),
            ChatMessage::user(prompt.to_string()),
        ])
        .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
