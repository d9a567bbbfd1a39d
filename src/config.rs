//! Configuration types for patent analysis runs.
//!
//! All run behaviour is controlled through [`AnalysisConfig`], built via its
//! [`AnalysisConfigBuilder`]. One struct for every knob keeps the CLI, tests,
//! and library callers on the same defaults.

use crate::error::Patent2DocxError;
use crate::pipeline::chat::RetryPolicy;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the bearer token.
pub const ENV_API_KEY: &str = "KIMI_API_KEY";
/// Environment variable overriding the model identifier.
pub const ENV_MODEL: &str = "KIMI_TEXT_MODEL";
/// Environment variable overriding the API base URL.
pub const ENV_BASE_URL: &str = "KIMI_BASE_URL";

/// Moonshot's OpenAI-compatible API root.
pub const DEFAULT_BASE_URL: &str = "https://api.moonshot.cn/v1";
/// Model used when neither the caller nor the environment names one.
pub const DEFAULT_MODEL: &str = "moonshot-v1-8k";
/// Prompt template location, relative to the working directory.
pub const DEFAULT_PROMPT_PATH: &str = "prompts/patent_analysis_prompt.txt";

/// Upper bound accepted for the page cap.
pub const MAX_PAGE_CAP: usize = 600;

/// Configuration for a patent analysis run.
///
/// Built via [`AnalysisConfig::builder()`], [`AnalysisConfigBuilder::from_env()`],
/// or using [`AnalysisConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_patent2docx::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .api_key("sk-test")
///     .max_pages(50)
///     .temperature(0.3)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_pages, 50);
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Bearer token for the chat endpoint. Required by [`crate::Analyzer::new`].
    pub api_key: Option<String>,

    /// API root; `/chat/completions` is appended. Default: [`DEFAULT_BASE_URL`].
    pub base_url: String,

    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Sampling temperature, 0.0–1.0. Default: 0.2.
    ///
    /// Patent analysis wants stable, repeatable structure; low values keep the
    /// model on the section layout the prompt asks for.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 2000.
    pub max_tokens: u32,

    /// Page cap for text extraction, 1–600. Default: 200.
    pub max_pages: usize,

    /// Path of the prompt template file. Default: [`DEFAULT_PROMPT_PATH`].
    pub prompt_path: PathBuf,

    /// Per-request timeout in seconds. Default: 120.
    pub request_timeout_secs: u64,

    /// Rate-limit backoff protocol for the chat client.
    pub retry: RetryPolicy,

    /// Optional stage/rate-limit event sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.2,
            max_tokens: 2000,
            max_pages: 200,
            prompt_path: PathBuf::from(DEFAULT_PROMPT_PATH),
            request_timeout_secs: 120,
            retry: RetryPolicy::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_pages", &self.max_pages)
            .field("prompt_path", &self.prompt_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("retry", &self.retry)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AnalysisProgressCallback>"),
            )
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// Per-request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    /// Start from defaults overlaid with `KIMI_API_KEY`, `KIMI_TEXT_MODEL`
    /// and `KIMI_BASE_URL` when they are set and non-empty.
    pub fn from_env() -> Self {
        let mut builder = AnalysisConfig::builder();
        if let Some(key) = non_empty_env(ENV_API_KEY) {
            builder = builder.api_key(key);
        }
        if let Some(model) = non_empty_env(ENV_MODEL) {
            builder = builder.model(model);
        }
        if let Some(url) = non_empty_env(ENV_BASE_URL) {
            builder = builder.base_url(url);
        }
        builder
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 1.0);
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n.clamp(1, MAX_PAGE_CAP);
        self
    }

    pub fn prompt_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.prompt_path = path.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, Patent2DocxError> {
        let c = &self.config;
        if c.base_url.is_empty() {
            return Err(Patent2DocxError::InvalidConfig(
                "Base URL must not be empty".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(Patent2DocxError::InvalidConfig(
                "Model identifier must not be empty".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(Patent2DocxError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.request_timeout_secs == 0 {
            return Err(Patent2DocxError::InvalidConfig(
                "Request timeout must be ≥ 1 second".into(),
            ));
        }
        if c.retry.max_attempts == 0 {
            return Err(Patent2DocxError::InvalidConfig(
                "Retry policy needs at least one attempt".into(),
            ));
        }
        Ok(self.config)
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}
