//! Public-sentiment analysis over web search results for the requested
//! keywords.

use super::research::{Research, first_json_object, format_hits, sources_from, unwrap_json_block};
use super::Task;
use crate::types::{AppError, Payload, QueryParams, Result, TaskKind, TaskResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

const DEFAULT_KEYWORD: &str = "electric vehicle";

const SYSTEM_PROMPT: &str = "You analyse public opinion about electric vehicles. \
Read the supplied search results and reply with ONLY a JSON object of the form \
{\"overall_sentiment\": \"positive|neutral|negative|mixed\", \
\"positive_ratio\": <percent>, \"neutral_ratio\": <percent>, \"negative_ratio\": <percent>, \
\"key_insights\": [..], \"why_people_like\": [..], \"why_people_dislike\": [..]}. \
Ratios are percentages that add up to 100.";

/// Sentiment breakdown returned by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentReport {
    pub overall_sentiment: String,
    pub positive_ratio: f64,
    pub neutral_ratio: f64,
    pub negative_ratio: f64,
    pub key_insights: Vec<String>,
    pub why_people_like: Vec<String>,
    pub why_people_dislike: Vec<String>,
}

impl SentimentReport {
    /// Parse the model reply, unwrapping code fences and surrounding prose.
    pub fn parse(reply: &str) -> Result<Self> {
        let body = unwrap_json_block(reply);
        let object = first_json_object(body).unwrap_or(body);

        let report: Self = serde_json::from_str(object)
            .map_err(|e| AppError::LLM(format!("Unparseable sentiment report: {}", e)))?;

        if report.overall_sentiment.trim().is_empty() {
            return Err(AppError::LLM(
                "Sentiment report is missing overall_sentiment".to_string(),
            ));
        }
        Ok(report)
    }

    /// Prose digest used as the task summary.
    pub fn digest(&self) -> String {
        let mut text = format!(
            "Overall public sentiment is {} (positive {:.1}%, neutral {:.1}%, negative {:.1}%).",
            self.overall_sentiment, self.positive_ratio, self.neutral_ratio, self.negative_ratio
        );
        if !self.key_insights.is_empty() {
            text.push_str(&format!(" Key insights: {}.", self.key_insights.join("; ")));
        }
        if !self.why_people_like.is_empty() {
            text.push_str(&format!(
                " People like: {}.",
                self.why_people_like.join("; ")
            ));
        }
        if !self.why_people_dislike.is_empty() {
            text.push_str(&format!(
                " People dislike: {}.",
                self.why_people_dislike.join("; ")
            ));
        }
        text
    }
}

pub struct SurveyTask {
    research: Research,
}

impl SurveyTask {
    pub fn new(research: Research) -> Self {
        Self { research }
    }
}

pub fn build_queries(params: &QueryParams) -> Vec<String> {
    let period = params.period_or_current_year();
    let mut keywords: Vec<&str> = params
        .keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    if keywords.is_empty() {
        keywords.push(DEFAULT_KEYWORD);
    }

    keywords
        .into_iter()
        .flat_map(|keyword| {
            [
                format!("{} public opinion {}", keyword, period),
                format!("{} consumer reviews {}", keyword, period),
                format!("{} buyer sentiment survey {}", keyword, period),
            ]
        })
        .collect()
}

#[async_trait]
impl Task for SurveyTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Survey
    }

    async fn run(&self, params: &QueryParams) -> Result<TaskResult> {
        let queries = build_queries(params);
        let hits = self.research.gather(&queries).await;
        tracing::info!(task = %self.kind(), hits = hits.len(), "survey search complete");

        let prompt = format!(
            "Keywords: {}\n\nSearch results:\n{}",
            params.keywords.join(", "),
            format_hits(&hits)
        );
        let reply = self
            .research
            .llm
            .generate_with_system(SYSTEM_PROMPT, &prompt)
            .await?;
        let report = SentimentReport::parse(&reply)?;

        let mut payload = match serde_json::to_value(&report) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Payload::new(),
        };
        payload.insert("sources_count".to_string(), json!(hits.len()));

        TaskResult::success(TaskKind::Survey, payload, report.digest(), sources_from(&hits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_reply() {
        let reply = "Here you go:\n```json\n{\"overall_sentiment\": \"positive\", \
                     \"positive_ratio\": 60, \"neutral_ratio\": 25, \"negative_ratio\": 15, \
                     \"key_insights\": [\"range anxiety is fading\"]}\n```";
        let report = SentimentReport::parse(reply).unwrap();
        assert_eq!(report.overall_sentiment, "positive");
        assert_eq!(report.positive_ratio, 60.0);
        assert!(report.why_people_like.is_empty());
    }

    #[test]
    fn test_parse_rejects_prose() {
        assert!(SentimentReport::parse("people seem happy").is_err());
        assert!(SentimentReport::parse("{\"positive_ratio\": 10}").is_err());
    }

    #[test]
    fn test_digest_mentions_ratios_and_insights() {
        let report = SentimentReport {
            overall_sentiment: "mixed".to_string(),
            positive_ratio: 40.0,
            neutral_ratio: 30.0,
            negative_ratio: 30.0,
            key_insights: vec!["price matters".to_string()],
            why_people_like: vec![],
            why_people_dislike: vec!["charging".to_string()],
        };
        let digest = report.digest();
        assert!(digest.starts_with("Overall public sentiment is mixed"));
        assert!(digest.contains("positive 40.0%"));
        assert!(digest.contains("Key insights: price matters."));
        assert!(digest.contains("People dislike: charging."));
        assert!(!digest.contains("People like"));
    }

    #[test]
    fn test_default_keyword_queries() {
        let queries = build_queries(&QueryParams::new().with_period("2024"));
        assert_eq!(queries.len(), 3);
        assert!(queries[0].starts_with(DEFAULT_KEYWORD));
    }
}
