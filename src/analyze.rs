//! Analysis entry points.
//!
//! An [`Analyzer`] runs one patent through the whole pipeline:
//!
//! ```text
//! bytes ─▶ %PDF check ─▶ extract + clean ─▶ prompt ─▶ chat ─▶ split ─▶ .docx
//! ```
//!
//! Each analyzer is one session. A session runs at most one analysis at a
//! time; a second call made while the first is still in flight fails fast
//! with [`Patent2DocxError::Busy`] instead of queueing behind it.

use crate::config::AnalysisConfig;
use crate::error::Patent2DocxError;
use crate::output::{AnalysisOutput, AnalysisStats, DocumentInfo};
use crate::pipeline::chat::{ChatClient, ChatMessage, ChatRequest};
use crate::pipeline::report::{self, ReportSpec};
use crate::pipeline::{clean, extract, input, sections};
use crate::progress::Stage;
use crate::prompts::{self, SYSTEM_PROMPT};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

// ── Busy guard ───────────────────────────────────────────────────────────

/// Per-session "analysis in flight" flag.
#[derive(Debug, Clone, Default)]
pub struct SessionGuard {
    busy: Arc<AtomicBool>,
}

impl SessionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the session, or fail with [`Patent2DocxError::Busy`] if another
    /// token is alive.
    pub fn try_acquire(&self) -> Result<BusyToken, Patent2DocxError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Patent2DocxError::Busy)?;
        Ok(BusyToken {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof that the session is claimed. Dropping it releases the session.
#[derive(Debug)]
#[must_use = "the session is released as soon as the token is dropped"]
pub struct BusyToken {
    busy: Arc<AtomicBool>,
}

impl Drop for BusyToken {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

// ── Analyzer ─────────────────────────────────────────────────────────────

/// Runs patent PDFs through extraction, the chat model and report assembly.
#[derive(Debug)]
pub struct Analyzer {
    config: AnalysisConfig,
    client: ChatClient,
    guard: SessionGuard,
}

impl Analyzer {
    /// Create an analyzer and its chat client from `config`.
    ///
    /// # Errors
    /// [`Patent2DocxError::MissingApiKey`] when `config.api_key` is `None`.
    pub fn new(config: AnalysisConfig) -> Result<Self, Patent2DocxError> {
        let client = ChatClient::from_config(&config)?;
        Ok(Self::with_client(config, client))
    }

    /// Create an analyzer around an already-built client.
    pub fn with_client(config: AnalysisConfig, client: ChatClient) -> Self {
        Self {
            config,
            client,
            guard: SessionGuard::new(),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    pub fn session_guard(&self) -> &SessionGuard {
        &self.guard
    }

    pub fn is_busy(&self) -> bool {
        self.guard.is_busy()
    }

    /// Token that aborts the chat call and any rate-limit wait in progress.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.client.cancellation_token()
    }

    /// Analyse one patent PDF held in memory.
    ///
    /// `source_name` is the original file name; it appears in the report
    /// and determines [`AnalysisOutput::file_name`].
    ///
    /// # Errors
    /// * [`Patent2DocxError::Busy`] if this session is already analysing
    /// * [`Patent2DocxError::NotAPdf`] / [`Patent2DocxError::CorruptPdf`]
    /// * [`Patent2DocxError::NoExtractableText`] for scanned documents
    /// * [`Patent2DocxError::PromptNotFound`] if the prompt template is missing
    /// * any chat error ([`Patent2DocxError::RateLimitExhausted`], `Api`, …)
    pub async fn analyze(
        &self,
        pdf_bytes: Vec<u8>,
        source_name: &str,
    ) -> Result<AnalysisOutput, Patent2DocxError> {
        let _token = self.guard.try_acquire()?;
        self.run(pdf_bytes, source_name).await
    }

    /// Read a local PDF and analyse it.
    ///
    /// The session is claimed before the file is read, so a rejected call
    /// never touches the disk.
    pub async fn analyze_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<AnalysisOutput, Patent2DocxError> {
        let _token = self.guard.try_acquire()?;
        let pdf = input::read_local(path.as_ref()).await?;
        self.run(pdf.bytes, &pdf.source_name).await
    }

    /// The pipeline proper. Callers hold the session token.
    async fn run(
        &self,
        pdf_bytes: Vec<u8>,
        source_name: &str,
    ) -> Result<AnalysisOutput, Patent2DocxError> {
        let total_start = Instant::now();
        info!("Starting analysis: {}", source_name);

        input::ensure_pdf(&pdf_bytes)?;

        // ── Stage 1: extract and clean ──────────────────────────────────
        self.stage_start(Stage::Extract);
        let extract_start = Instant::now();
        let max_pages = self.config.max_pages;
        let (document, extracted) = tokio::task::spawn_blocking(move || {
            extract::extract_with_info(&pdf_bytes, max_pages)
        })
        .await
        .map_err(|e| Patent2DocxError::Internal(format!("Extraction task panicked: {}", e)))??;

        let text = clean::clean(&extracted);
        let extract_ms = extract_start.elapsed().as_millis() as u64;
        self.stage_complete(Stage::Extract, extract_ms);
        debug!(
            "Extracted {} chars, {} after cleaning",
            extracted.chars().count(),
            text.chars().count()
        );

        if text.is_empty() {
            return Err(Patent2DocxError::NoExtractableText);
        }

        // ── Stage 2: chat ───────────────────────────────────────────────
        let prompt = prompts::load_prompt(&self.config.prompt_path).await?;

        self.stage_start(Stage::Chat);
        let chat_start = Instant::now();
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(prompts::build_user_content(&prompt, &text)),
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let outcome = self.client.send(&request).await?;
        let chat_ms = chat_start.elapsed().as_millis() as u64;
        self.stage_complete(Stage::Chat, chat_ms);

        // ── Stage 3: split and build the report ─────────────────────────
        self.stage_start(Stage::Report);
        let report_start = Instant::now();
        let raw_text = outcome.reply.into_text();
        let sections = sections::split(&raw_text);
        let spec = ReportSpec::new(source_name, sections);
        let report = report::build_report(&spec)?;
        let report_ms = report_start.elapsed().as_millis() as u64;
        self.stage_complete(Stage::Report, report_ms);

        let stats = AnalysisStats {
            total_pages: document.page_count,
            processed_pages: extract::pages_to_process(document.page_count, max_pages),
            extracted_chars: extracted.chars().count(),
            cleaned_chars: text.chars().count(),
            chat_attempts: outcome.attempts,
            extract_ms,
            chat_ms,
            report_ms,
            total_ms: total_start.elapsed().as_millis() as u64,
        };

        info!(
            "Analysis complete: {} pages read, {} byte report, {}ms total",
            stats.processed_pages,
            report.len(),
            stats.total_ms
        );

        Ok(AnalysisOutput {
            file_name: input::report_file_name(source_name),
            report,
            raw_text,
            sections: spec.sections,
            generated_at: spec.generated_at,
            stats,
        })
    }

    /// Synchronous wrapper around [`Analyzer::analyze`].
    ///
    /// Creates a temporary tokio runtime internally, so it must not be called
    /// from inside an async context.
    pub fn analyze_blocking(
        &self,
        pdf_bytes: Vec<u8>,
        source_name: &str,
    ) -> Result<AnalysisOutput, Patent2DocxError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| Patent2DocxError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.analyze(pdf_bytes, source_name))
    }

    fn stage_start(&self, stage: Stage) {
        debug!("{}", stage.label());
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_start(stage);
        }
    }

    fn stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_complete(stage, elapsed_ms);
        }
    }
}

// ── Free functions ───────────────────────────────────────────────────────

/// Read PDF metadata from a local file without extracting text.
///
/// Does not require an API key.
pub async fn inspect(path: impl AsRef<Path>) -> Result<DocumentInfo, Patent2DocxError> {
    let pdf = input::read_local(path.as_ref()).await?;
    tokio::task::spawn_blocking(move || extract::inspect(&pdf.bytes))
        .await
        .map_err(|e| Patent2DocxError::Internal(format!("Inspect task panicked: {}", e)))?
}

/// Write report bytes to `path`, creating parent directories.
///
/// The bytes go to a temporary file in the target directory which is then
/// renamed over `path`, so readers never observe a partial report. The
/// temporary file is removed if anything fails.
pub async fn write_report(path: impl AsRef<Path>, bytes: &[u8]) -> Result<(), Patent2DocxError> {
    let path = path.as_ref().to_path_buf();
    let bytes = bytes.to_vec();
    tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
        .await
        .map_err(|e| Patent2DocxError::Internal(format!("Write task panicked: {}", e)))?
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Patent2DocxError> {
    let fail = |source: std::io::Error| Patent2DocxError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent: PathBuf = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(fail)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(fail)?;
    tmp.write_all(bytes).map_err(fail)?;
    tmp.as_file().sync_all().map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}
