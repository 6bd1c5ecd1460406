//! OpenRouter endpoint.
//!
//! OpenRouter (<https://openrouter.ai/>) exposes many models behind an
//! OpenAI-compatible chat-completions API.

use super::client::ApiKey;
use super::endpoint::{AttemptOptions, EndpointError, FailureKind, ModelEndpoint};
use crate::config::LlmConfig;
use crate::error::Result;
use crate::prompt::PromptPayload;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

/// Default OpenRouter API endpoint.
const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

#[derive(Debug, Serialize)]
struct OpenRouterRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterResponse {
    choices: Option<Vec<Choice>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<Message>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<u16>,
    message: Option<String>,
}

/// [`ModelEndpoint`] backed by OpenRouter.
pub struct OpenRouterEndpoint {
    api_key: ApiKey,
    model: String,
    temperature: f32,
    max_tokens: u32,
    base_url: String,
    client: Client,
}

impl OpenRouterEndpoint {
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
            max_tokens: config.max_output_tokens,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client,
        })
    }

    fn request(&self, payload: &PromptPayload) -> OpenRouterRequest {
        OpenRouterRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: Some(payload.system_role().to_string()),
                },
                Message {
                    role: "user".to_string(),
                    content: Some(payload.user_message()),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

fn extract_text(body: &str) -> std::result::Result<String, EndpointError> {
    let response: OpenRouterResponse = serde_json::from_str(body).map_err(|e| {
        EndpointError::new(FailureKind::InvalidResponse, format!("undecodable response: {}", e))
    })?;

    // errors can arrive with a 200 status
    if let Some(error) = response.error {
        let message = error.message.unwrap_or_else(|| "unknown error".to_string());
        return Err(match error.code {
            Some(code) => EndpointError::from_status(code, &message),
            None => EndpointError::new(FailureKind::Server, message),
        });
    }

    let choice = response
        .choices
        .and_then(|choices| choices.into_iter().next())
        .ok_or_else(|| EndpointError::new(FailureKind::InvalidResponse, "no choices in response"))?;

    let text = choice
        .message
        .and_then(|m| m.content)
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(match choice.finish_reason.as_deref() {
            Some("content_filter") => {
                EndpointError::new(FailureKind::ContentRejected, "response blocked by content filter")
            }
            _ => EndpointError::new(FailureKind::InvalidResponse, "empty response"),
        });
    }

    Ok(text)
}

impl ModelEndpoint for OpenRouterEndpoint {
    fn send(&self, payload: &PromptPayload, options: &AttemptOptions) -> std::result::Result<String, EndpointError> {
        let response = self
            .client
            .post(&self.base_url)
            .timeout(options.timeout)
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .header("Content-Type", "application/json")
            .header("X-Title", "sales-report")
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
        "OpenRouter"
    }

    fn model(&self) -> Option<&str> {
        Some(&self.model)
    }
}
