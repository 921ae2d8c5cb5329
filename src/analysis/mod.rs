//! Optional text analysis of a resolved record.
//!
//! Runs after normalization and only decorates the result: an analyzer
//! failure is logged and the record is returned without `analysis`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::domain::ContentAnalysis;

const DEFAULT_API_URL: &str = "https://api.mistral.ai/v1/chat/completions";

/// Longest text sent for analysis, in characters
const MAX_INPUT_CHARS: usize = 4000;

/// Configuration for the chat-completions analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Run analysis after a successful resolution (needs `api_key`)
    pub enabled: bool,

    /// OpenAI-compatible chat completions endpoint
    pub api_url: String,

    pub api_key: Option<String>,

    pub model: String,

    pub temperature: f32,

    pub max_tokens: u32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            model: "mistral-tiny".to_string(),
            temperature: 0.7,
            max_tokens: 500,
            timeout_secs: 30,
        }
    }
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Analysis API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Analysis API returned no choices")]
    EmptyResponse,

    #[error("Could not read analysis: {0}")]
    Malformed(String),

    #[error("Nothing to analyze")]
    NoText,
}

/// Summarises a piece of text
#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<ContentAnalysis, AnalysisError>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

/// Analyzer backed by an OpenAI-compatible chat completions API
pub struct ChatAnalyzer {
    http: Client,
    settings: AnalysisSettings,
    api_key: String,
}

impl ChatAnalyzer {
    /// `None` when analysis is disabled or no API key is configured
    pub fn from_settings(settings: &AnalysisSettings) -> Result<Option<Self>, AnalysisError> {
        let api_key = match settings.api_key.as_deref().map(str::trim) {
            Some(key) if settings.enabled && !key.is_empty() => key.to_string(),
            _ => return Ok(None),
        };
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Some(Self {
            http,
            settings: settings.clone(),
            api_key,
        }))
    }

    fn prompt(text: &str) -> String {
        let text: String = text.chars().take(MAX_INPUT_CHARS).collect();
        format!(
            "Analyze this short-form video's caption and description.\n\n\
             {}\n\n\
             Reply with a JSON object only, with keys:\n\
             \"summary\": one or two sentences on what the video is about,\n\
             \"sentiment\": one of positive, negative, neutral,\n\
             \"keywords\": up to five topic keywords.",
            text
        )
    }
}

#[async_trait]
impl TextAnalyzer for ChatAnalyzer {
    async fn analyze(&self, text: &str) -> Result<ContentAnalysis, AnalysisError> {
        if text.trim().is_empty() {
            return Err(AnalysisError::NoText);
        }

        let request = json!({
            "model": self.settings.model,
            "messages": [{"role": "user", "content": Self::prompt(text)}],
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens,
        });

        tracing::debug!(model = %self.settings.model, "Analysis request");

        let response = self
            .http
            .post(&self.settings.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Api { status, body });
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(AnalysisError::EmptyResponse)?;

        parse_analysis(&content)
    }
}

/// Read the JSON object out of a model reply, tolerating code fences and prose
pub fn parse_analysis(content: &str) -> Result<ContentAnalysis, AnalysisError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let body = match (start, end) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => return Err(AnalysisError::Malformed("no JSON object in reply".to_string())),
    };

    let mut analysis: ContentAnalysis =
        serde_json::from_str(body).map_err(|e| AnalysisError::Malformed(e.to_string()))?;
    analysis.sentiment = analysis.sentiment.trim().to_lowercase();
    analysis.keywords.retain(|k| !k.trim().is_empty());
    analysis.keywords.truncate(5);
    Ok(analysis)
}
