//! Google Gemini endpoint.
//!
//! Calls the `generateContent` API (<https://ai.google.dev/>) with the role
//! instructions as the system instruction and the task plus data context as
//! the user turn.

use super::client::ApiKey;
use super::endpoint::{AttemptOptions, EndpointError, FailureKind, ModelEndpoint};
use crate::config::LlmConfig;
use crate::error::Result;
use crate::prompt::PromptPayload;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

/// Default Gemini API endpoint.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models/";

/// Finish reasons meaning the provider withheld the content.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "BLOCKED",
    "PROHIBITED_CONTENT",
    "RECITATION",
    "SPII",
    "BLOCKLIST",
];

// Gemini API request structures
#[derive(Serialize)]
struct GeminiRequest {
    #[serde(rename = "systemInstruction")]
    system_instruction: Content,
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

// Gemini API response structures
#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<Part>>,
}

#[derive(Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

/// [`ModelEndpoint`] backed by the Gemini API.
pub struct GeminiEndpoint {
    api_key: ApiKey,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    base_url: String,
    client: Client,
}

impl GeminiEndpoint {
    /// Create an endpoint from the LLM configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(api_key: ApiKey, config: &LlmConfig) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            api_key,
            model: config.model_name().to_string(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client,
        })
    }

    fn request(&self, payload: &PromptPayload) -> GeminiRequest {
        GeminiRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: payload.system_role().to_string(),
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: payload.user_message(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }
}

/// Pull the generated text out of a response body.
fn extract_text(body: &str) -> std::result::Result<String, EndpointError> {
    let response: GeminiResponse = serde_json::from_str(body).map_err(|e| {
        EndpointError::new(FailureKind::InvalidResponse, format!("undecodable response: {}", e))
    })?;

    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
    {
        return Err(EndpointError::new(
            FailureKind::ContentRejected,
            format!("prompt blocked: {}", reason),
        ));
    }

    let candidate = response
        .candidates
        .as_ref()
        .and_then(|candidates| candidates.first())
        .ok_or_else(|| EndpointError::new(FailureKind::InvalidResponse, "no candidates in response"))?;

    let text: String = candidate
        .content
        .as_ref()
        .and_then(|content| content.parts.as_ref())
        .map(|parts| parts.iter().map(|p| p.text.as_str()).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(match candidate.finish_reason.as_deref() {
            Some(reason) if BLOCKING_FINISH_REASONS.contains(&reason) => EndpointError::new(
                FailureKind::ContentRejected,
                format!("response blocked (finish reason: {})", reason),
            ),
            Some(reason) => EndpointError::new(
                FailureKind::InvalidResponse,
                format!("empty response (finish reason: {})", reason),
            ),
            None => EndpointError::new(FailureKind::InvalidResponse, "empty response"),
        });
    }

    Ok(text)
}

impl ModelEndpoint for GeminiEndpoint {
    fn send(&self, payload: &PromptPayload, options: &AttemptOptions) -> std::result::Result<String, EndpointError> {
        // {base_url}{model}:generateContent
        let url = format!("{}{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .timeout(options.timeout)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", self.api_key.expose())
            .json(&self.request(payload))
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(EndpointError::from_status(status.as_u16(), &body));
        }
        extract_text(&body)
    }

    fn name(&self) -> &str {
        "Gemini"
    }

    fn model(&self) -> Option<&str> {
        Some(&self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_joins_parts() {
        let body = r###"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "## Executive"}, {"text": " Summary"}]},
                "finishReason": "STOP"
            }]
        }"###;
        assert_eq!(extract_text(body).unwrap(), "## Executive Summary");
    }

    #[test]
    fn test_safety_block_is_content_rejected() {
        let body = r#"{"candidates": [{"finishReason": "SAFETY"}]}"#;
        let err = extract_text(body).unwrap_err();
        assert_eq!(err.kind, FailureKind::ContentRejected);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_prompt_feedback_block() {
        let body = r#"{"promptFeedback": {"blockReason": "OTHER"}}"#;
        assert_eq!(extract_text(body).unwrap_err().kind, FailureKind::ContentRejected);
    }

    #[test]
    fn test_empty_candidates_is_invalid_response() {
        assert_eq!(
            extract_text(r#"{"candidates": []}"#).unwrap_err().kind,
            FailureKind::InvalidResponse
        );
        assert_eq!(
            extract_text(r#"{"candidates": [{"finishReason": "MAX_TOKENS"}]}"#)
                .unwrap_err()
                .kind,
            FailureKind::InvalidResponse
        );
    }

    #[test]
    fn test_malformed_json() {
        let err = extract_text(r#"{"candidates": "nope"}"#).unwrap_err();
        assert_eq!(err.kind, FailureKind::InvalidResponse);
    }

    #[test]
    fn test_request_shape() {
        let endpoint = GeminiEndpoint::new(ApiKey::new("k"), &LlmConfig::default()).unwrap();
        let doc = crate::transform::ContextDocument::assemble(
            Vec::new(),
            crate::transform::ContextMetadata::default(),
            10_000,
        )
        .unwrap();
        let payload = crate::prompt::PromptBuilder::new(10_000)
            .build(&doc, "You are an analyst.", "Summarize.")
            .unwrap();

        let json = serde_json::to_value(endpoint.request(&payload)).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "You are an analyst.");
        assert_eq!(json["contents"][0]["role"], "user");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 4000);
        assert_eq!(endpoint.model(), Some("gemini-2.5-flash"));
    }
}
