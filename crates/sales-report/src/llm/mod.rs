//! Model invocation.
//!
//! The module is built around the [`ModelEndpoint`] trait, one blocking
//! request per call, and the [`LlmClient`] that adds retries, backoff and
//! cancellation on top of any endpoint.
//!
//! # Feature Flag
//!
//! The concrete HTTP endpoints require the `ai` feature. The trait, the
//! client and the retry machinery are always available, so a custom or
//! scripted endpoint works without it.
//!
//! ```toml
//! sales-report = { version = "0.1", default-features = false }
//! ```
//!
//! - [`GeminiEndpoint`] - Google Gemini API (requires `ai` feature)
//! - [`OpenRouterEndpoint`] - OpenRouter API (requires `ai` feature)

mod client;
mod endpoint;
mod retry;

pub use client::{ApiKey, ClientState, LlmClient, ModelResponse, ResponseStatus};
pub use endpoint::{AttemptOptions, EndpointError, FailureKind, ModelEndpoint};
pub use retry::{JitterSource, NoJitter, RandJitter, RetryPolicy, Sleeper, ThreadSleeper};

#[cfg(feature = "ai")]
mod gemini;
#[cfg(feature = "ai")]
mod openrouter;

#[cfg(feature = "ai")]
pub use gemini::GeminiEndpoint;
#[cfg(feature = "ai")]
pub use openrouter::OpenRouterEndpoint;

/// Build the endpoint selected by `config`.
#[cfg(feature = "ai")]
pub fn endpoint_for(
    config: &crate::config::LlmConfig,
    api_key: ApiKey,
) -> crate::error::Result<Box<dyn ModelEndpoint>> {
    use crate::config::Provider;

    Ok(match config.provider {
        Provider::Gemini => Box::new(GeminiEndpoint::new(api_key, config)?),
        Provider::OpenRouter => Box::new(OpenRouterEndpoint::new(api_key, config)?),
    })
}
