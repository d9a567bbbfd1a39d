//! Input resolution: read a user-supplied PDF and check it really is one.
//!
//! Uploads arrive as raw bytes, the CLI hands us a path. Both funnel through
//! [`ensure_pdf`] so callers get a meaningful [`Patent2DocxError::NotAPdf`]
//! instead of an opaque parser error when someone feeds in a `.docx` or an
//! HTML error page.

use crate::error::Patent2DocxError;
use std::path::Path;
use tracing::debug;

/// PDF header signature.
pub const PDF_MAGIC: &[u8; 5] = b"%PDF-";

/// How far into the file the header may start. Readers tolerate a BOM, a
/// stray line ending or a short preamble before `%PDF-`.
pub const PDF_HEADER_WINDOW: usize = 1024;

/// Leading bytes quoted in [`Patent2DocxError::NotAPdf`].
const QUOTED_BYTES: usize = 8;

/// A PDF read from disk, with the file name used for report metadata.
#[derive(Debug, Clone)]
pub struct PdfInput {
    /// File name (no directories), e.g. `CN123456A.pdf`.
    pub source_name: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

/// Verify a `%PDF-` header appears within the first [`PDF_HEADER_WINDOW`]
/// bytes.
pub fn ensure_pdf(bytes: &[u8]) -> Result<(), Patent2DocxError> {
    let window = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
    match window.windows(PDF_MAGIC.len()).position(|w| w == PDF_MAGIC) {
        Some(offset) => {
            if offset > 0 {
                debug!("PDF header found at offset {}", offset);
            }
            Ok(())
        }
        None => Err(Patent2DocxError::NotAPdf {
            magic: bytes.iter().take(QUOTED_BYTES).copied().collect(),
        }),
    }
}

/// Read a local PDF file, validating existence, permissions and magic bytes.
pub async fn read_local(path: &Path) -> Result<PdfInput, Patent2DocxError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Patent2DocxError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => Patent2DocxError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Patent2DocxError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    ensure_pdf(&bytes)?;

    let source_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(PdfInput { source_name, bytes })
}

/// Output file name for a report: `<stem>_patent-analysis-report.docx`.
pub fn report_file_name(source_name: &str) -> String {
    let stem = Path::new(source_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    format!("{stem}_patent-analysis-report.docx")
}
