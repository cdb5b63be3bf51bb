//! Generative language model clients
//!
//! The synthesizers only see the `LanguageModel` trait. Two backends are
//! provided: Google Gemini (default) and Anthropic Claude. Both issue exactly
//! one blocking request per `generate` call.

use crate::error::SurveyError;
use crate::settings::{LlmBackend, Settings};
use crate::utils::safe_truncate;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

/// Longest slice of an error body kept in messages
const MAX_ERROR_BODY: usize = 800;

/// A text-in, text-out generation service
pub trait LanguageModel {
    fn generate(&self, prompt: &str) -> Result<String, SurveyError>;
}

impl<T: LanguageModel + ?Sized> LanguageModel for Box<T> {
    fn generate(&self, prompt: &str) -> Result<String, SurveyError> {
        (**self).generate(prompt)
    }
}

impl<T: LanguageModel + ?Sized> LanguageModel for &T {
    fn generate(&self, prompt: &str) -> Result<String, SurveyError> {
        (**self).generate(prompt)
    }
}

/// Build the client selected in settings
pub fn build_model(settings: &Settings) -> Result<Box<dyn LanguageModel>, SurveyError> {
    let api_key = settings.require_api_key()?.to_string();
    let http = http_client(settings.request_timeout_secs)?;
    let model = settings.model_name().to_string();

    tracing::debug!(backend = settings.llm_backend.as_str(), model = %model, "Building language model client");

    Ok(match settings.llm_backend {
        LlmBackend::Gemini => Box::new(GeminiClient { http, api_key, model }),
        LlmBackend::Anthropic => Box::new(AnthropicClient { http, api_key, model }),
    })
}

fn http_client(timeout_secs: u64) -> Result<Client, SurveyError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| SurveyError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

fn api_error(service: &str, status: reqwest::StatusCode, body: &str) -> SurveyError {
    let body = body.trim();
    if body.is_empty() {
        return SurveyError::Upstream(format!("{} error {}", service, status));
    }
    let shown = safe_truncate(body, MAX_ERROR_BODY);
    let ellipsis = if shown.len() < body.len() { "..." } else { "" };
    SurveyError::Upstream(format!("{} error {}: {}{}", service, status, shown, ellipsis))
}

// ==================== Gemini ====================

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: String,
}

pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
}

impl LanguageModel for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String, SurveyError> {
        let url = format!("{}/models/{}:generateContent", GEMINI_BASE_URL, self.model);
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart { text: prompt.to_string() }],
            }],
        };

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .map_err(|e| SurveyError::Upstream(format!("HTTP request failed: {}", e.without_url())))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(api_error("Gemini", status, &body));
        }

        let body: GeminiResponse = response
            .json()
            .map_err(|e| SurveyError::Upstream(format!("Failed to parse response: {}", e)))?;

        gemini_text(body)
    }
}

/// Concatenate the text parts of the first candidate
///
/// A blocked prompt or a candidate without text is an upstream error.
fn gemini_text(body: GeminiResponse) -> Result<String, SurveyError> {
    let block_reason = body.prompt_feedback.and_then(|f| f.block_reason);
    let Some(candidate) = body.candidates.into_iter().next() else {
        return Err(SurveyError::Upstream(match block_reason {
            Some(reason) => format!("Gemini blocked the prompt ({})", reason),
            None => "Gemini returned no candidates".to_string(),
        }));
    };

    let text = candidate
        .content
        .map(|c| c.parts.into_iter().map(|p| p.text).collect::<Vec<_>>().join(""))
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(SurveyError::Upstream(format!(
            "Gemini returned an empty answer (finish reason: {})",
            reason
        )));
    }
    Ok(text)
}

// ==================== Anthropic ====================

/// Anthropic API message format
#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Anthropic API request format
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

/// Anthropic API response format
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

pub struct AnthropicClient {
    http: Client,
    api_key: String,
    model: String,
}

impl LanguageModel for AnthropicClient {
    fn generate(&self, prompt: &str) -> Result<String, SurveyError> {
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: 8192,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .http
            .post(ANTHROPIC_MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .map_err(|e| SurveyError::Upstream(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(api_error("Anthropic", status, &body));
        }

        let api_response: AnthropicResponse = response
            .json()
            .map_err(|e| SurveyError::Upstream(format!("Failed to parse response: {}", e)))?;

        if let Some(usage) = &api_response.usage {
            tracing::debug!(input_tokens = usage.input_tokens, output_tokens = usage.output_tokens, "Anthropic usage");
        }

        anthropic_text(api_response)
    }
}

fn anthropic_text(body: AnthropicResponse) -> Result<String, SurveyError> {
    let text = body.content.into_iter().map(|c| c.text).collect::<Vec<_>>().join("");
    if text.trim().is_empty() {
        let reason = body.stop_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(SurveyError::Upstream(format!(
            "Anthropic returned an empty answer (stop reason: {})",
            reason
        )));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_model_requires_key() {
        let settings = Settings::default();
        let err = build_model(&settings).err().expect("missing key must fail");
        assert!(matches!(err, SurveyError::Configuration(_)));
    }

    #[test]
    fn test_build_model_anthropic_key() {
        let mut settings = Settings::default();
        settings.llm_backend = LlmBackend::Anthropic;
        settings.set_api_key(LlmBackend::Gemini, "gemini-only".to_string());
        // the Gemini key does not satisfy the Anthropic backend
        assert!(build_model(&settings).is_err());

        settings.set_api_key(LlmBackend::Anthropic, "sk-ant-test".to_string());
        assert!(build_model(&settings).is_ok());
    }

    #[test]
    fn test_gemini_text_joins_parts() {
        let body: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"VALID: "},{"text":"transformer attention"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(gemini_text(body).unwrap(), "VALID: transformer attention");
    }

    #[test]
    fn test_gemini_blocked_prompt_is_upstream_error() {
        let body: GeminiResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        let err = gemini_text(body).unwrap_err();
        assert!(matches!(err, SurveyError::Upstream(_)));
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_gemini_empty_candidate_names_finish_reason() {
        let body: GeminiResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"RECITATION"}]}"#).unwrap();
        let err = gemini_text(body).unwrap_err();
        assert!(matches!(err, SurveyError::Upstream(_)));
        assert!(err.to_string().contains("RECITATION"));
    }

    #[test]
    fn test_anthropic_empty_content_is_upstream_error() {
        let body: AnthropicResponse =
            serde_json::from_str(r#"{"content":[],"stop_reason":"max_tokens"}"#).unwrap();
        let err = anthropic_text(body).unwrap_err();
        assert!(err.to_string().contains("max_tokens"));

        let body: AnthropicResponse =
            serde_json::from_str(r#"{"content":[{"type":"text","text":"Survey"}]}"#).unwrap();
        assert_eq!(anthropic_text(body).unwrap(), "Survey");
    }

    #[test]
    fn test_api_error_truncates_body() {
        let body = "x".repeat(2000);
        let err = api_error("Gemini", reqwest::StatusCode::BAD_REQUEST, &body);
        let msg = err.to_string();
        assert!(msg.ends_with("..."));
        assert!(msg.len() < 1000);
    }
}
