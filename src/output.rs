//! Result types returned by the analysis entry points.

use crate::pipeline::sections::SectionSet;
use chrono::{DateTime, Local};
use serde::Serialize;

/// Everything one analysis run produced.
///
/// Serialises to JSON without the report bytes; write those with
/// [`crate::analyze::write_report`].
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutput {
    /// Suggested report file name, `<stem>_patent-analysis-report.docx`.
    pub file_name: String,
    /// The `.docx` package.
    #[serde(skip)]
    pub report: Vec<u8>,
    /// Model reply exactly as used for splitting (pretty JSON when the
    /// endpoint returned no text content).
    pub raw_text: String,
    pub sections: SectionSet,
    pub generated_at: DateTime<Local>,
    pub stats: AnalysisStats,
}

/// Counters and timings for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisStats {
    /// Pages in the PDF.
    pub total_pages: usize,
    /// Pages actually read, after applying the page cap.
    pub processed_pages: usize,
    /// Characters of extracted text before cleaning.
    pub extracted_chars: usize,
    /// Characters sent to the model after cleaning.
    pub cleaned_chars: usize,
    /// HTTP attempts the chat call needed (1 unless rate limited).
    pub chat_attempts: u32,
    pub extract_ms: u64,
    pub chat_ms: u64,
    pub report_ms: u64,
    pub total_ms: u64,
}

/// Document-level facts read without extracting text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    /// Header version, e.g. `"1.7"`.
    pub pdf_version: String,
    pub is_encrypted: bool,
}
