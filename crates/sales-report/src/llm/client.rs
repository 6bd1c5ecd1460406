//! Retrying model client.
//!
//! [`LlmClient`] drives one [`ModelEndpoint`] through the attempt state
//! machine:
//!
//! ```text
//! Idle -> Sending -> Success
//!            |  \-> Failed          (fatal failure, or attempts exhausted)
//!            \-> RetryWait -> Sending
//! ```
//!
//! Every visited state is recorded in [`ModelResponse::trace`]. Model failures
//! never surface as `Err`: they are carried in the response so the report can
//! degrade to a placeholder narrative. Only cancellation aborts the call.

use super::endpoint::{AttemptOptions, EndpointError, FailureKind, ModelEndpoint};
use super::retry::{JitterSource, RandJitter, RetryPolicy, Sleeper, ThreadSleeper};
use crate::error::{ReportError, Result};
use crate::pipeline::CancellationToken;
use crate::prompt::PromptPayload;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// States of a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    Idle,
    Sending,
    Success,
    RetryWait,
    Failed,
}

/// Overall outcome of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    /// The last failure was transient but the attempt budget ran out.
    RetryableFailure,
    FatalFailure,
}

/// Result of [`LlmClient::invoke`].
#[derive(Debug, Clone, Serialize)]
pub struct ModelResponse {
    pub status: ResponseStatus,
    /// Generated text, present on success only.
    pub text: Option<String>,
    /// Wall time of the whole invocation, waits included.
    pub latency: Duration,
    pub attempts: u32,
    pub trace: Vec<ClientState>,
    /// Class and cause of the last failed attempt.
    pub failure: Option<EndpointError>,
}

impl ModelResponse {
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// Terminal state of the machine.
    pub fn final_state(&self) -> ClientState {
        self.trace.last().copied().unwrap_or(ClientState::Idle)
    }

    /// Human-readable reason for a failed invocation.
    pub fn failure_reason(&self) -> Option<String> {
        self.failure.as_ref().map(|failure| {
            format!(
                "model call failed after {} attempt(s) ({})",
                self.attempts, failure
            )
        })
    }
}

/// API credential read from the environment.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    /// Read the key from `var`; missing or blank is a configuration error.
    pub fn from_env(var: &str) -> Result<Self> {
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => Ok(Self(value.trim().to_string())),
            _ => Err(ReportError::MissingCredential(var.to_string())),
        }
    }

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Calls a model endpoint with retries, backoff and cancellation.
///
/// # Example
///
/// ```rust,ignore
/// use sales_report::llm::{LlmClient, RetryPolicy};
///
/// let client = LlmClient::new(endpoint, RetryPolicy::default(), Duration::from_secs(60))
///     .with_cancellation(token.clone());
/// let response = client.invoke(&payload)?;
/// ```
pub struct LlmClient<E> {
    endpoint: E,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    sleeper: Arc<dyn Sleeper>,
    jitter: Arc<dyn JitterSource>,
    token: CancellationToken,
}

impl<E: ModelEndpoint> LlmClient<E> {
    pub fn new(endpoint: E, policy: RetryPolicy, attempt_timeout: Duration) -> Self {
        Self {
            endpoint,
            policy,
            attempt_timeout,
            sleeper: Arc::new(ThreadSleeper),
            jitter: Arc::new(RandJitter::new()),
            token: CancellationToken::new(),
        }
    }

    /// Replace the wait primitive.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Replace the jitter source.
    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Observe this token between attempts and during waits.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send the payload, retrying transient failures.
    ///
    /// Returns `Err(ReportError::Cancelled)` only if the token fires; every
    /// model failure is reported through the returned [`ModelResponse`].
    pub fn invoke(&self, payload: &PromptPayload) -> Result<ModelResponse> {
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut trace = vec![ClientState::Idle];
        let mut attempts = 0u32;

        info!(
            provider = self.endpoint.name(),
            model = self.endpoint.model().unwrap_or("unknown"),
            prompt_chars = payload.char_count(),
            max_attempts,
            "Invoking model"
        );

        loop {
            if self.token.is_cancelled() {
                return Err(ReportError::Cancelled);
            }

            attempts += 1;
            trace.push(ClientState::Sending);
            let options = AttemptOptions {
                timeout: self.attempt_timeout,
                attempt: attempts,
            };
            debug!(attempt = attempts, "Sending prompt");

            let failure = match self.endpoint.send(payload, &options) {
                Ok(text) if !text.trim().is_empty() => {
                    trace.push(ClientState::Success);
                    let latency = started.elapsed();
                    info!(
                        attempts,
                        latency_ms = latency.as_millis() as u64,
                        chars = text.chars().count(),
                        "Model responded"
                    );
                    return Ok(ModelResponse {
                        status: ResponseStatus::Success,
                        text: Some(text),
                        latency,
                        attempts,
                        trace,
                        failure: None,
                    });
                }
                Ok(_) => EndpointError::new(FailureKind::InvalidResponse, "empty response text"),
                Err(err) => err,
            };

            if failure.is_retryable() && attempts < max_attempts {
                let delay = self.policy.backoff(attempts, self.jitter.as_ref());
                warn!(
                    attempt = attempts,
                    max_attempts,
                    kind = %failure.kind,
                    delay_ms = delay.as_millis() as u64,
                    "Model attempt failed, retrying: {}",
                    failure.message
                );
                trace.push(ClientState::RetryWait);
                if !self.sleeper.sleep(delay, &self.token) {
                    info!("Retry wait interrupted by cancellation");
                    return Err(ReportError::Cancelled);
                }
                continue;
            }

            trace.push(ClientState::Failed);
            let status = if failure.is_retryable() {
                ResponseStatus::RetryableFailure
            } else {
                ResponseStatus::FatalFailure
            };
            warn!(
                attempts,
                kind = %failure.kind,
                "Model call failed: {}",
                failure.message
            );
            return Ok(ModelResponse {
                status,
                text: None,
                latency: started.elapsed(),
                attempts,
                trace,
                failure: Some(failure),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::retry::NoJitter;
    use crate::transform::{ContextDocument, ContextMetadata, ContextSection};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Scripted {
        replies: Mutex<VecDeque<std::result::Result<String, EndpointError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(replies: Vec<std::result::Result<String, EndpointError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ModelEndpoint for Scripted {
        fn send(
            &self,
            _payload: &PromptPayload,
            options: &AttemptOptions,
        ) -> std::result::Result<String, EndpointError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            assert_eq!(options.attempt, n);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(EndpointError::new(FailureKind::Server, "script exhausted")))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// Records requested delays without sleeping.
    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
        cancel_on_sleep: Option<CancellationToken>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration, token: &CancellationToken) -> bool {
            self.delays.lock().unwrap().push(duration);
            if let Some(canceller) = &self.cancel_on_sleep {
                canceller.cancel();
            }
            !token.is_cancelled()
        }
    }

    fn payload() -> PromptPayload {
        let doc = ContextDocument::assemble(
            vec![ContextSection::new("totals", "Totals", 100, "- 10 units".to_string())],
            ContextMetadata::default(),
            10_000,
        )
        .unwrap();
        crate::prompt::PromptBuilder::new(10_000)
            .build(&doc, "role", "task")
            .unwrap()
    }

    fn client(endpoint: Arc<Scripted>, sleeper: Arc<RecordingSleeper>) -> LlmClient<Arc<Scripted>> {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
            multiplier: 2.0,
            jitter: 0.0,
        };
        LlmClient::new(endpoint, policy, Duration::from_secs(5))
            .with_sleeper(sleeper)
            .with_jitter(Arc::new(NoJitter))
    }

    fn transient() -> std::result::Result<String, EndpointError> {
        Err(EndpointError::new(FailureKind::Timeout, "timed out"))
    }

    #[test]
    fn test_success_first_try() {
        let endpoint = Arc::new(Scripted::new(vec![Ok("## Executive Summary\nok".to_string())]));
        let sleeper = Arc::new(RecordingSleeper::default());
        let response = client(endpoint.clone(), sleeper.clone()).invoke(&payload()).unwrap();

        assert!(response.is_success());
        assert_eq!(response.attempts, 1);
        assert_eq!(
            response.trace,
            vec![ClientState::Idle, ClientState::Sending, ClientState::Success]
        );
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[test]
    fn test_recovers_after_transient_failure() {
        let endpoint = Arc::new(Scripted::new(vec![transient(), Ok("text".to_string())]));
        let sleeper = Arc::new(RecordingSleeper::default());
        let response = client(endpoint.clone(), sleeper.clone()).invoke(&payload()).unwrap();

        assert!(response.is_success());
        assert_eq!(response.attempts, 2);
        assert_eq!(endpoint.calls(), 2);
        assert_eq!(*sleeper.delays.lock().unwrap(), vec![Duration::from_millis(100)]);
    }

    #[test]
    fn test_persistent_transient_exhausts_attempts() {
        let endpoint = Arc::new(Scripted::new(vec![transient(), transient(), transient(), transient()]));
        let sleeper = Arc::new(RecordingSleeper::default());
        let response = client(endpoint.clone(), sleeper.clone()).invoke(&payload()).unwrap();

        assert_eq!(response.status, ResponseStatus::RetryableFailure);
        assert_eq!(response.attempts, 3);
        assert_eq!(endpoint.calls(), 3);
        assert_eq!(response.final_state(), ClientState::Failed);
        assert_eq!(
            *sleeper.delays.lock().unwrap(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
        assert_eq!(response.failure.as_ref().unwrap().kind, FailureKind::Timeout);
        assert!(response.failure_reason().unwrap().contains("3 attempt(s)"));
    }

    #[test]
    fn test_fatal_failure_single_attempt() {
        let endpoint = Arc::new(Scripted::new(vec![
            Err(EndpointError::new(FailureKind::Authentication, "bad key")),
            Ok("never reached".to_string()),
        ]));
        let sleeper = Arc::new(RecordingSleeper::default());
        let response = client(endpoint.clone(), sleeper).invoke(&payload()).unwrap();

        assert_eq!(response.status, ResponseStatus::FatalFailure);
        assert_eq!(response.attempts, 1);
        assert_eq!(endpoint.calls(), 1);
        assert_eq!(
            response.trace,
            vec![ClientState::Idle, ClientState::Sending, ClientState::Failed]
        );
    }

    #[test]
    fn test_blank_response_is_fatal() {
        let endpoint = Arc::new(Scripted::new(vec![Ok("   ".to_string())]));
        let sleeper = Arc::new(RecordingSleeper::default());
        let response = client(endpoint.clone(), sleeper).invoke(&payload()).unwrap();

        assert_eq!(response.status, ResponseStatus::FatalFailure);
        assert_eq!(response.failure.unwrap().kind, FailureKind::InvalidResponse);
    }

    #[test]
    fn test_cancel_during_retry_wait() {
        let token = CancellationToken::new();
        let endpoint = Arc::new(Scripted::new(vec![transient(), Ok("late".to_string())]));
        let sleeper = Arc::new(RecordingSleeper {
            delays: Mutex::new(Vec::new()),
            cancel_on_sleep: Some(token.clone()),
        });
        let result = client(endpoint.clone(), sleeper)
            .with_cancellation(token)
            .invoke(&payload());

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(endpoint.calls(), 1);
    }

    #[test]
    fn test_cancelled_before_first_attempt() {
        let token = CancellationToken::new();
        token.cancel();
        let endpoint = Arc::new(Scripted::new(vec![Ok("unused".to_string())]));
        let result = client(endpoint.clone(), Arc::new(RecordingSleeper::default()))
            .with_cancellation(token)
            .invoke(&payload());

        assert!(result.is_err());
        assert_eq!(endpoint.calls(), 0);
    }

    #[test]
    fn test_api_key_from_env() {
        let var = "SALES_REPORT_TEST_KEY_PRESENT";
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var(var, "  secret  ") };
        let key = ApiKey::from_env(var).unwrap();
        assert_eq!(key.expose(), "secret");
        assert_eq!(format!("{key:?}"), "ApiKey(***)");
    }

    #[test]
    fn test_api_key_missing_or_blank() {
        let err = ApiKey::from_env("SALES_REPORT_TEST_KEY_MISSING").unwrap_err();
        assert_eq!(err.error_code(), "MISSING_CREDENTIAL");

        let var = "SALES_REPORT_TEST_KEY_BLANK";
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var(var, "   ") };
        assert!(ApiKey::from_env(var).unwrap_err().is_configuration());
    }
}
