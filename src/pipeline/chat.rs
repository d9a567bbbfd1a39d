//! Chat-completions client with rate-limit backoff.
//!
//! Talks to any OpenAI-compatible `POST {base_url}/chat/completions`
//! endpoint (Moonshot/Kimi by default) with a bearer token.
//!
//! ## Retry Strategy
//!
//! Only HTTP 429 is retried. Each call gets at most
//! [`RetryPolicy::max_attempts`] attempts (6 by default). Before the next
//! attempt the client waits either the server's `Retry-After` seconds or
//! `min(30 s, 2^attempt s)` plus up to 0.5 s of random jitter:
//! 1 s → 2 s → 4 s → 8 s → 16 s. Nothing is slept after the last attempt.
//! Any other error status fails at once with the server's body attached.
//! Waits race a [`CancellationToken`].
//!
//! ## Transport
//!
//! The `reqwest::Client` is built with `no_proxy()`: `HTTP_PROXY` and
//! friends in the caller's shell never reroute the request.

use crate::config::{AnalysisConfig, DEFAULT_BASE_URL, DEFAULT_MODEL, ENV_API_KEY};
use crate::error::Patent2DocxError;
use crate::progress::ProgressCallback;
use futures::future::BoxFuture;
use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ── Messages ─────────────────────────────────────────────────────────────

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// JSON body of a chat-completions request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    /// Reject requests the endpoint would refuse anyway.
    pub fn validate(&self) -> Result<(), Patent2DocxError> {
        if self.messages.is_empty() {
            return Err(Patent2DocxError::InvalidRequest(
                "at least one message is required".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(Patent2DocxError::InvalidRequest(format!(
                "temperature must be within 0.0–1.0, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(Patent2DocxError::InvalidRequest(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(Patent2DocxError::InvalidRequest(
                "model must not be empty".into(),
            ));
        }
        Ok(())
    }
}

// ── Replies ──────────────────────────────────────────────────────────────

/// Decoded success response.
///
/// Upstream response shapes drift, so a body without
/// `choices[0].message.content` is handed back whole as [`ChatReply::Raw`]
/// instead of failing.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatReply {
    /// `choices[0].message.content`.
    Text(String),
    /// The complete decoded payload, when no text content was found.
    Raw(Value),
}

impl ChatReply {
    pub fn from_payload(payload: Value) -> Self {
        let content = payload
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .map(str::to_owned);

        match content {
            Some(text) => ChatReply::Text(text),
            None => ChatReply::Raw(payload),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ChatReply::Text(t) => Some(t),
            ChatReply::Raw(_) => None,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, ChatReply::Raw(_))
    }

    /// Plain text for downstream stages; raw payloads become pretty JSON.
    pub fn into_text(self) -> String {
        match self {
            ChatReply::Text(t) => t,
            ChatReply::Raw(v) => format!("{v:#}"),
        }
    }
}

/// A reply plus how many attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOutcome {
    pub reply: ChatReply,
    pub attempts: u32,
}

// ── Backoff ──────────────────────────────────────────────────────────────

/// Rate-limit backoff protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Default: 6.
    pub max_attempts: u32,
    /// Ceiling for the exponential part of the delay. Default: 30 s.
    pub max_backoff: Duration,
    /// Jitter is drawn uniformly from `[0, max_jitter)`. Default: 500 ms.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            max_backoff: Duration::from_secs(30),
            max_jitter: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// `min(max_backoff, 2^attempt s) + jitter` for a zero-based `attempt`.
    pub fn backoff(&self, attempt: u32, jitter: Duration) -> Duration {
        let exponential = 2u64
            .checked_pow(attempt)
            .map(Duration::from_secs)
            .unwrap_or(self.max_backoff);
        exponential.min(self.max_backoff) + jitter
    }

    /// Random jitter in `[0, max_jitter)`.
    pub fn sample_jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let secs = rand::thread_rng().gen_range(0.0..self.max_jitter.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Delay before the attempt after zero-based `attempt`, jitter included.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff(attempt, self.sample_jitter())
    }
}

/// `Retry-After` as a number of seconds. HTTP-date values, negatives and
/// garbage return `None` so the caller falls back to exponential backoff.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    let secs: f64 = raw.parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

/// Suspends the retry loop between attempts.
///
/// Swapped out in tests to record delays instead of waiting them out.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Real wall-clock sleeping via `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

// ── Client ───────────────────────────────────────────────────────────────

/// Authenticated chat-completions client.
///
/// Cheap to clone; safe to reuse for many calls. Every [`ChatClient::send`]
/// runs its own independent retry loop.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    default_model: String,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("default_model", &self.default_model)
            .field("retry", &self.retry)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl ChatClient {
    /// Start building a client authenticated with `api_key`.
    pub fn builder(api_key: impl Into<String>) -> ChatClientBuilder {
        ChatClientBuilder {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
            sleeper: None,
            cancel: None,
            progress: None,
        }
    }

    /// Build a client from an [`AnalysisConfig`].
    ///
    /// Fails with [`Patent2DocxError::MissingApiKey`] when the config has no key.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, Patent2DocxError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(Patent2DocxError::MissingApiKey { var: ENV_API_KEY })?;

        let mut builder = ChatClient::builder(api_key)
            .base_url(&config.base_url)
            .default_model(&config.model)
            .timeout(config.request_timeout())
            .retry_policy(config.retry);
        if let Some(ref cb) = config.progress_callback {
            builder = builder.progress_callback(Arc::clone(cb));
        }
        builder.build()
    }

    /// Full URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Model used when a call does not name one.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Token that aborts in-flight requests and backoff sleeps when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Send `messages` and return the reply.
    ///
    /// `model = None` uses [`ChatClient::default_model`].
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
        model: Option<&str>,
    ) -> Result<ChatReply, Patent2DocxError> {
        let request = ChatRequest {
            model: model.unwrap_or(&self.default_model).to_string(),
            messages: messages.to_vec(),
            temperature,
            max_tokens,
        };
        self.send(&request).await.map(|outcome| outcome.reply)
    }

    /// Post `request`, retrying on HTTP 429 per the client's [`RetryPolicy`].
    pub async fn send(&self, request: &ChatRequest) -> Result<ChatOutcome, Patent2DocxError> {
        request.validate()?;

        let start = Instant::now();
        let max_attempts = self.retry.max_attempts;

        for attempt in 0..max_attempts {
            let attempt_num = attempt + 1;
            if self.cancel.is_cancelled() {
                return Err(Patent2DocxError::Cancelled);
            }

            debug!(
                "POST {} (model {}, attempt {}/{})",
                self.endpoint, request.model, attempt_num, max_attempts
            );

            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = self
                    .http
                    .post(&self.endpoint)
                    .bearer_auth(&self.api_key)
                    .json(request)
                    .send() => Some(result),
            };
            let response = match sent {
                Some(result) => result?,
                None => return Err(Patent2DocxError::Cancelled),
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt_num == max_attempts {
                    warn!("Rate limited on final attempt {}/{}", attempt_num, max_attempts);
                    break;
                }

                let delay = parse_retry_after(response.headers())
                    .unwrap_or_else(|| self.retry.delay_for(attempt));
                warn!(
                    "Rate limited (attempt {}/{}); retrying in {:.2}s",
                    attempt_num,
                    max_attempts,
                    delay.as_secs_f64()
                );
                if let Some(ref cb) = self.progress {
                    cb.on_rate_limited(attempt_num, max_attempts, delay);
                }
                self.pause(delay).await?;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                warn!("Chat API error {}: {}", status, body);
                return Err(Patent2DocxError::Api { status, body });
            }

            let payload: Value =
                response
                    .json()
                    .await
                    .map_err(|e| Patent2DocxError::InvalidResponse {
                        detail: e.to_string(),
                    })?;

            let reply = ChatReply::from_payload(payload);
            if reply.is_raw() {
                warn!("Response has no choices[0].message.content; returning the raw payload");
            }

            info!(
                "Chat completed in {}ms after {} attempt(s)",
                start.elapsed().as_millis(),
                attempt_num
            );

            return Ok(ChatOutcome {
                reply,
                attempts: attempt_num,
            });
        }

        Err(Patent2DocxError::RateLimitExhausted {
            attempts: max_attempts,
        })
    }

    async fn pause(&self, delay: Duration) -> Result<(), Patent2DocxError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Patent2DocxError::Cancelled),
            _ = self.sleeper.sleep(delay) => Ok(()),
        }
    }
}

/// Builder for [`ChatClient`].
pub struct ChatClientBuilder {
    api_key: String,
    base_url: String,
    default_model: String,
    timeout: Duration,
    retry: RetryPolicy,
    sleeper: Option<Arc<dyn Sleeper>>,
    cancel: Option<CancellationToken>,
    progress: Option<ProgressCallback>,
}

impl ChatClientBuilder {
    pub fn base_url(mut self, url: impl AsRef<str>) -> Self {
        self.base_url = url.as_ref().trim_end_matches('/').to_string();
        self
    }

    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.progress = Some(cb);
        self
    }

    pub fn build(self) -> Result<ChatClient, Patent2DocxError> {
        if self.api_key.trim().is_empty() {
            return Err(Patent2DocxError::MissingApiKey { var: ENV_API_KEY });
        }
        if self.retry.max_attempts == 0 {
            return Err(Patent2DocxError::InvalidConfig(
                "Retry policy needs at least one attempt".into(),
            ));
        }

        let http = reqwest::Client::builder()
            .no_proxy()
            .timeout(self.timeout)
            .build()?;

        Ok(ChatClient {
            http,
            endpoint: format!("{}/chat/completions", self.base_url),
            api_key: self.api_key,
            default_model: self.default_model,
            retry: self.retry,
            sleeper: self.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper)),
            cancel: self.cancel.unwrap_or_default(),
            progress: self.progress,
        })
    }
}
