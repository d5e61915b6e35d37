use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::parser::ProcessedDocument;

const BASE_BACKOFF_MS: u64 = 2000;
const MAX_BACKOFF_MS: u64 = 60_000;

const SYSTEM_PROMPT: &str = "You are an expert research-paper summarization assistant. \
You will receive pre-split sections from a PDF: abstract, introduction, methods, results, \
discussion, conclusion, formulas, and references. Produce a concise but detailed summary.";

const INSTRUCTIONS: &str = "Below is the content of a research paper, already split into major sections.

Please:
1. Provide a high-level summary (3-5 bullet points).
2. Briefly describe the introduction and problem statement.
3. Summarize the methodology.
4. Summarize key results and conclusions.
5. List and briefly interpret the main formulas or equations (if any).
6. Provide a one-paragraph takeaway for a non-expert audience.";

#[derive(Debug, Error)]
pub enum SummarizerError {
    #[error("summarizer setting '{0}' is not configured")]
    MissingSetting(&'static str),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("no completion in response")]
    EmptyResponse,
    #[error("failed to encode sections: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SummarizerError {
    fn is_retryable(&self) -> bool {
        match self {
            SummarizerError::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            SummarizerError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub endpoint: Option<String>,
    pub credential: Option<String>,
    pub deployment_name: String,
    pub api_version: String,
    pub temperature: f32,
    /// Per-section character cap applied when building the prompt.
    pub max_section_chars: Option<usize>,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        SummarizerConfig {
            endpoint: None,
            credential: None,
            deployment_name: "gpt-35-turbo".to_string(),
            api_version: "2025-01-01-preview".to_string(),
            temperature: 0.7,
            max_section_chars: None,
            max_retries: 1,
            timeout_secs: 120,
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait Summarizer {
    async fn summarize(&self, doc: &ProcessedDocument) -> Result<String, SummarizerError>;
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u64,
}

/// Azure OpenAI chat-completions client.
pub struct AzureOpenAi {
    client: reqwest::Client,
    url: String,
    credential: String,
    config: SummarizerConfig,
}

impl AzureOpenAi {
    pub fn new(config: SummarizerConfig) -> Result<Self, SummarizerError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .filter(|e| !e.is_empty())
            .ok_or(SummarizerError::MissingSetting("endpoint"))?;
        let credential = config
            .credential
            .clone()
            .filter(|c| !c.is_empty())
            .ok_or(SummarizerError::MissingSetting("credential"))?;
        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            endpoint.trim_end_matches('/'),
            config.deployment_name,
            config.api_version
        );
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(AzureOpenAi {
            client,
            url,
            credential,
            config,
        })
    }

    async fn complete_once(&self, messages: &[ChatMessage]) -> Result<String, SummarizerError> {
        let request = ChatRequest {
            messages,
            temperature: self.config.temperature,
        };
        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.credential)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizerError::Api { status, body });
        }

        let parsed: ChatResponse = response.json().await?;
        if let Some(usage) = &parsed.usage {
            info!(tokens = usage.total_tokens, "Completion usage");
        }
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(SummarizerError::EmptyResponse)
    }
}

impl Summarizer for AzureOpenAi {
    async fn summarize(&self, doc: &ProcessedDocument) -> Result<String, SummarizerError> {
        let messages = build_messages(doc, self.config.max_section_chars)?;
        let max_retries = self.config.max_retries;

        let mut attempt = 0;
        loop {
            match self.complete_once(&messages).await {
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    let backoff = backoff_for(attempt);
                    warn!(
                        "Summarizer error: {} (attempt {}/{}), backing off {:.1}s",
                        e,
                        attempt + 1,
                        max_retries,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// `BASE_BACKOFF_MS * 2^attempt`, capped at `MAX_BACKOFF_MS`.
fn backoff_for(attempt: u32) -> Duration {
    let ms = 2u64
        .checked_pow(attempt)
        .and_then(|factor| BASE_BACKOFF_MS.checked_mul(factor))
        .map_or(MAX_BACKOFF_MS, |ms| ms.min(MAX_BACKOFF_MS));
    Duration::from_millis(ms)
}

/// System + user messages for one document. Empty sections are named as
/// absent so the model can note them instead of inventing content.
pub fn build_messages(
    doc: &ProcessedDocument,
    max_section_chars: Option<usize>,
) -> Result<Vec<ChatMessage>, SummarizerError> {
    let mut payload = doc.clone();
    if let Some(limit) = max_section_chars {
        for text in [
            &mut payload.abstract_text,
            &mut payload.introduction,
            &mut payload.methods,
            &mut payload.results,
            &mut payload.discussion,
            &mut payload.conclusion,
            &mut payload.references,
            &mut payload.formulas,
        ] {
            truncate_at_boundary(text, limit);
        }
        if let Some(other) = payload.other.as_mut() {
            truncate_at_boundary(other, limit);
        }
    }
    let sections_json = serde_json::to_string_pretty(&payload)?;

    let missing = doc.missing_sections();
    let absent_note = if missing.is_empty() {
        String::new()
    } else {
        let names: Vec<&str> = missing.iter().map(|s| s.as_str()).collect();
        format!(
            "\nThese sections were not found in the document: {}. Note their absence rather than guessing.\n",
            names.join(", ")
        )
    };

    Ok(vec![
        ChatMessage {
            role: "system",
            content: SYSTEM_PROMPT.to_string(),
        },
        ChatMessage {
            role: "user",
            content: format!("{}\n{}\nSections (JSON):\n{}", INSTRUCTIONS, absent_note, sections_json),
        },
    ])
}

/// Cut `text` to at most `limit` bytes on a char boundary.
fn truncate_at_boundary(text: &mut String, limit: usize) {
    if text.len() <= limit {
        return;
    }
    let mut end = limit;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> ProcessedDocument {
        ProcessedDocument {
            abstract_text: "Abstract\nWe study X.".into(),
            introduction: "Introduction\nX matters.".into(),
            formulas: "a = b + c".into(),
            ..Default::default()
        }
    }

    #[test]
    fn missing_endpoint_rejected() {
        let cfg = SummarizerConfig {
            credential: Some("k".into()),
            ..Default::default()
        };
        assert!(matches!(AzureOpenAi::new(cfg), Err(SummarizerError::MissingSetting("endpoint"))));
    }

    #[test]
    fn missing_credential_rejected() {
        let cfg = SummarizerConfig {
            endpoint: Some("https://example.openai.azure.com".into()),
            credential: Some(String::new()),
            ..Default::default()
        };
        assert!(matches!(AzureOpenAi::new(cfg), Err(SummarizerError::MissingSetting("credential"))));
    }

    #[test]
    fn deployment_url() {
        let cfg = SummarizerConfig {
            endpoint: Some("https://example.openai.azure.com/".into()),
            credential: Some("k".into()),
            ..Default::default()
        };
        let client = AzureOpenAi::new(cfg).unwrap();
        assert_eq!(
            client.url,
            "https://example.openai.azure.com/openai/deployments/gpt-35-turbo/chat/completions?api-version=2025-01-01-preview"
        );
    }

    #[test]
    fn prompt_embeds_sections_and_notes_absence() {
        let messages = build_messages(&doc(), None).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        let user = &messages[1].content;
        assert!(user.contains("\"abstract\": \"Abstract\\nWe study X.\""));
        assert!(user.contains("\"formulas\": \"a = b + c\""));
        assert!(user.contains("not found in the document: methods, results, discussion, conclusion, references"));
    }

    #[test]
    fn prompt_truncates_sections() {
        let mut d = doc();
        d.methods = "é".repeat(100);
        let messages = build_messages(&d, Some(5)).unwrap();
        let user = &messages[1].content;
        assert!(user.contains("\"methods\": \"éé\""));
        assert!(user.contains("\"abstract\": \"Abstr\""));
    }

    #[test]
    fn truncate_respects_char_boundary() {
        let mut s = "aé".to_string();
        truncate_at_boundary(&mut s, 2);
        assert_eq!(s, "a");
    }

    #[test]
    fn retryable_statuses() {
        let rate = SummarizerError::Api { status: StatusCode::TOO_MANY_REQUESTS, body: String::new() };
        let bad = SummarizerError::Api { status: StatusCode::BAD_REQUEST, body: String::new() };
        let down = SummarizerError::Api { status: StatusCode::SERVICE_UNAVAILABLE, body: String::new() };
        assert!(rate.is_retryable());
        assert!(down.is_retryable());
        assert!(!bad.is_retryable());
        assert!(!SummarizerError::EmptyResponse.is_retryable());
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_for(0), Duration::from_millis(2000));
        assert_eq!(backoff_for(1), Duration::from_millis(4000));
        assert_eq!(backoff_for(5), Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(backoff_for(63), Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(backoff_for(200), Duration::from_millis(MAX_BACKOFF_MS));
    }
}
