//! # edgequake-patent2docx
//!
//! Turn a patent PDF into a structured Word analysis report with an LLM.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Extract  per-page text via lopdf (CPU-bound, spawn_blocking)
//!  ├─ 2. Clean    strip control characters, collapse whitespace
//!  ├─ 3. Chat     one chat-completions call, 429-aware backoff
//!  ├─ 4. Split    brief / full / translation by heading markers
//!  └─ 5. Report   minimal .docx package, written atomically
//! ```
//!
//! The model is asked for three parts: a short summary, a full structured
//! analysis and a translation of the abstract and claims. The prompt lives
//! in a plain-text template (`prompts/patent_analysis_prompt.txt` by
//! default) so the wording can be tuned without a rebuild.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_patent2docx::{write_report, AnalysisConfigBuilder, Analyzer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key from KIMI_API_KEY, model from KIMI_TEXT_MODEL
//!     let config = AnalysisConfigBuilder::from_env().build()?;
//!     let analyzer = Analyzer::new(config)?;
//!     let output = analyzer.analyze_file("CN112233445A.pdf").await?;
//!     write_report(&output.file_name, &output.report).await?;
//!     eprintln!("{} pages, {} chat attempt(s)",
//!         output.stats.processed_pages,
//!         output.stats.chat_attempts);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `patent2docx` binary (clap + anyhow + tracing-subscriber + indicatif + dotenv) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-patent2docx = { version = "0.1", default-features = false }
//! ```
//!
//! ## Endpoint
//!
//! Any OpenAI-compatible `chat/completions` endpoint works. The defaults
//! target Moonshot (`https://api.moonshot.cn/v1`, model `moonshot-v1-8k`);
//! override with `KIMI_BASE_URL` and `KIMI_TEXT_MODEL`. A 200-page patent
//! easily exceeds an 8k context window, so lower the page cap or pick a
//! long-context model for large documents.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{inspect, write_report, Analyzer, BusyToken, SessionGuard};
pub use config::{AnalysisConfig, AnalysisConfigBuilder};
pub use error::Patent2DocxError;
pub use output::{AnalysisOutput, AnalysisStats, DocumentInfo};
pub use pipeline::chat::{
    ChatClient, ChatClientBuilder, ChatMessage, ChatReply, RetryPolicy, Role, Sleeper,
    TokioSleeper,
};
pub use pipeline::report::{build_report, ReportSpec};
pub use pipeline::sections::{split, SectionSet};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
