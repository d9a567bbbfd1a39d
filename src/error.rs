//! Error types for the edgequake-patent2docx library.
//!
//! A single fatal error type, [`Patent2DocxError`], covers every way an
//! analysis run can stop. Variants are grouped by the stage that raises them
//! so a caller (the CLI, a web handler) can pick its own presentation:
//!
//! * **Configuration**: missing API key or prompt file. Report verbatim, never retry.
//! * **Input / extraction**: unreadable file, corrupt PDF, or a PDF with no
//!   text layer. The last one is user-actionable (run OCR first).
//! * **Chat**: transport failures, non-429 HTTP errors (with the server body),
//!   and rate-limit exhaustion after the backoff protocol gave up.
//! * **Orchestration / output**: a second run while one is in flight, or a
//!   failure writing the `.docx`.

use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-patent2docx library.
#[derive(Debug, Error)]
pub enum Patent2DocxError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// No API key was supplied via config, flag, or environment.
    #[error("No API key configured.\nSet {var}=<your key> in the environment or in a .env file.")]
    MissingApiKey { var: &'static str },

    /// The prompt template file does not exist.
    #[error("Prompt file not found: '{path}'")]
    PromptNotFound { path: PathBuf },

    /// The prompt template exists but could not be read as UTF-8 text.
    #[error("Failed to read prompt file '{path}': {source}")]
    PromptReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Builder or request validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Any other I/O failure while reading the input (a directory, EIO, ...).
    #[error("Could not read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No `%PDF-` header near the start of the input.
    #[error("Input is not a PDF. First bytes: {magic:02x?}")]
    NotAPdf { magic: Vec<u8> },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The PDF structure could not be parsed.
    #[error("PDF could not be parsed: {source}")]
    CorruptPdf {
        #[source]
        source: lopdf::Error,
    },

    /// The PDF parsed fine but no page carried a text layer.
    #[error(
        "No text could be extracted from the PDF; it is probably a scanned image.\n\
Run it through OCR first, then analyse the OCR output."
    )]
    NoExtractableText,

    // ── Chat errors ───────────────────────────────────────────────────────
    /// The chat request itself is malformed (empty messages, bad temperature…).
    #[error("Invalid chat request: {0}")]
    InvalidRequest(String),

    /// Connecting, sending, or receiving failed below the HTTP layer.
    #[error("Request to chat endpoint failed: {source}")]
    Transport {
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint answered with a non-success status other than 429.
    #[error("Chat API returned HTTP {status}\n\n--- server response ---\n{body}")]
    Api { status: StatusCode, body: String },

    /// Every attempt was answered with HTTP 429.
    #[error(
        "Rate limited (HTTP 429) on all {attempts} attempts.\n\
Wait a little and try again, or lower the request frequency."
    )]
    RateLimitExhausted { attempts: u32 },

    /// The success response body was not valid JSON.
    #[error("Chat API returned an unreadable response: {detail}")]
    InvalidResponse { detail: String },

    /// The run was cancelled while a request or backoff sleep was pending.
    #[error("Request cancelled")]
    Cancelled,

    // ── Orchestration errors ──────────────────────────────────────────────
    /// Another analysis is still running in this session.
    #[error("An analysis is already running; wait for it to finish before starting another.")]
    Busy,

    // ── Output errors ─────────────────────────────────────────────────────
    /// Assembling the `.docx` package failed.
    #[error("Failed to assemble Word report: {source}")]
    ReportWriteFailed {
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the output `.docx` file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Patent2DocxError {
    /// True for failures the user can fix without changing code or config
    /// (rescan the document, wait out a rate limit, wait for a running job).
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            Patent2DocxError::NoExtractableText
                | Patent2DocxError::RateLimitExhausted { .. }
                | Patent2DocxError::Busy
        )
    }

    /// True for configuration problems that no retry can resolve.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Patent2DocxError::MissingApiKey { .. }
                | Patent2DocxError::PromptNotFound { .. }
                | Patent2DocxError::PromptReadFailed { .. }
                | Patent2DocxError::InvalidConfig(_)
        )
    }
}

impl From<reqwest::Error> for Patent2DocxError {
    fn from(source: reqwest::Error) -> Self {
        Patent2DocxError::Transport { source }
    }
}
