//! Shared search-then-analyse plumbing for the analysis tasks.

use crate::llm::LLMClient;
use crate::tools::{SearchHit, WebSearch};
use crate::types::Source;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Hard cap on queries a task may build before execution is limited further
/// by [`ResearchOptions::max_queries`].
pub const MAX_BUILT_QUERIES: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchOptions {
    /// Hits requested per query
    pub max_results: usize,
    /// Queries actually executed per task
    pub max_queries: usize,
}

impl Default for ResearchOptions {
    fn default() -> Self {
        Self {
            max_results: 3,
            max_queries: 15,
        }
    }
}

/// The collaborators every analysis task needs.
#[derive(Clone)]
pub struct Research {
    pub llm: Arc<dyn LLMClient>,
    pub search: Arc<dyn WebSearch>,
    pub options: ResearchOptions,
}

impl Research {
    pub fn new(
        llm: Arc<dyn LLMClient>,
        search: Arc<dyn WebSearch>,
        options: ResearchOptions,
    ) -> Self {
        Self {
            llm,
            search,
            options,
        }
    }

    /// Run up to `max_queries` searches sequentially. Failed queries are
    /// logged and skipped.
    pub async fn gather(&self, queries: &[String]) -> Vec<SearchHit> {
        let mut hits = Vec::new();

        for query in queries.iter().take(self.options.max_queries) {
            tracing::debug!(provider = self.search.name(), %query, "searching");
            match self.search.search(query, self.options.max_results).await {
                Ok(found) => hits.extend(found),
                Err(e) => tracing::warn!(%query, error = %e, "search failed, skipping query"),
            }
        }

        hits
    }
}

/// Render hits as numbered blocks for a prompt.
pub fn format_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No search results".to_string();
    }

    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "[Source {}]\nTitle: {}\nURL: {}\nContent: {}\n{}",
                i + 1,
                hit.title,
                hit.url,
                hit.content,
                "=".repeat(40)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn sources_from(hits: &[SearchHit]) -> Vec<Source> {
    hits.iter()
        .map(|hit| {
            let title = if hit.title.trim().is_empty() {
                "Untitled".to_string()
            } else {
                hit.title.clone()
            };
            Source::new(title, Some(hit.url.clone()), &hit.content)
        })
        .collect()
}

/// Extract a markdown section starting at `marker` up to the next `## ` or
/// `# ` heading.
pub fn extract_section(content: &str, marker: &str) -> Option<String> {
    let start = content.find(marker)?;
    let after = start + marker.len();
    let end = content[after..]
        .find("\n## ")
        .or_else(|| content[after..].find("\n# "))
        .map(|offset| after + offset)
        .unwrap_or(content.len());

    Some(content[start..end].trim().to_string())
}

/// Strip a ```json (or bare ```) fence if the text contains one.
pub fn unwrap_json_block(text: &str) -> &str {
    for fence in ["```json", "```"] {
        if let Some(start) = text.find(fence) {
            let body = &text[start + fence.len()..];
            let end = body.find("```").unwrap_or(body.len());
            return body[..end].trim();
        }
    }
    text.trim()
}

/// First balanced `{...}` object in `text`, ignoring braces inside strings.
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Cut `text` to `max_chars` characters, appending "..." when shortened.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}
