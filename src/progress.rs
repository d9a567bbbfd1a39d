//! Progress-callback trait for analysis stage events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its three stages and while the chat
//! client waits out a rate limit.
//!
//! # Example
//!
//! ```rust
//! use edgequake_patent2docx::{AnalysisConfig, AnalysisProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl AnalysisProgressCallback for Printer {
//!     fn on_stage_start(&self, stage: Stage) {
//!         eprintln!("{}", stage.label());
//!     }
//! }
//!
//! let config = AnalysisConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The three sequential stages of one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Stage {
    /// PDF parsing, text extraction and cleaning.
    Extract,
    /// The chat completion call, including any rate-limit waits.
    Chat,
    /// Section splitting and `.docx` assembly.
    Report,
}

impl Stage {
    /// 1-based position of the stage in the pipeline.
    pub fn ordinal(self) -> usize {
        match self {
            Stage::Extract => 1,
            Stage::Chat => 2,
            Stage::Report => 3,
        }
    }

    /// Human-readable label, e.g. `"1/3 Extracting PDF text"`.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Extract => "1/3 Extracting PDF text",
            Stage::Chat => "2/3 Asking the model for an analysis",
            Stage::Report => "3/3 Building the Word report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Called by the pipeline as it moves through each stage.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync`; the analyzer
/// may be shared across tasks.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage finishes successfully.
    ///
    /// # Arguments
    /// * `stage`: the stage that finished
    /// * `elapsed_ms`: wall-clock time spent in the stage
    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Called before the chat client sleeps after an HTTP 429.
    ///
    /// # Arguments
    /// * `attempt`: 1-based number of the attempt that was rate limited
    /// * `max_attempts`: attempt cap of the retry policy
    /// * `delay`: how long the client is about to wait
    fn on_rate_limited(&self, attempt: u32, max_attempts: u32, delay: Duration) {
        let _ = (attempt, max_attempts, delay);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;
