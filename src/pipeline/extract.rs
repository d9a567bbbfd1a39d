//! PDF text extraction via lopdf.
//!
//! Patents published as born-digital PDFs carry a text layer, so the plain
//! text is read straight out of the content streams; nothing is rasterised.
//! Scanned patents have no text layer and come back as an empty string,
//! which the orchestrator turns into [`Patent2DocxError::NoExtractableText`].
//!
//! Parsing is CPU-bound and synchronous, so [`extract_text_async`] moves it
//! onto tokio's blocking pool the same way the rest of the pipeline keeps
//! the async workers free.

use crate::error::Patent2DocxError;
use crate::output::DocumentInfo;
use lopdf::Document;
use tracing::{debug, info, warn};

/// Marker written ahead of each page's text, e.g. `===== Page 3 =====`.
pub fn page_marker(page_num: usize) -> String {
    format!("===== Page {page_num} =====")
}

/// Extract plain text from at most `max_pages` pages of a PDF.
///
/// Each page that yields text is emitted as `"\n\n===== Page N =====\n<text>"`
/// and pages are joined with `"\n"` in document order. Pages without text
/// (image-only pages) are skipped. The result is trimmed; an empty string
/// means no page had a text layer.
///
/// # Errors
/// * [`Patent2DocxError::InvalidConfig`] when `max_pages` is 0
/// * [`Patent2DocxError::CorruptPdf`] when the bytes are not a parseable PDF
pub fn extract_text(bytes: &[u8], max_pages: usize) -> Result<String, Patent2DocxError> {
    extract_with_info(bytes, max_pages).map(|(_, text)| text)
}

/// [`extract_text`] plus the [`DocumentInfo`] of the parsed document, from a
/// single parse.
pub fn extract_with_info(
    bytes: &[u8],
    max_pages: usize,
) -> Result<(DocumentInfo, String), Patent2DocxError> {
    if max_pages == 0 {
        return Err(Patent2DocxError::InvalidConfig(
            "max_pages must be ≥ 1".into(),
        ));
    }

    let document = load(bytes)?;
    let info = document_info(&document);
    let pages = document.get_pages();
    let page_count = pages_to_process(info.page_count, max_pages);
    info!("PDF loaded: {} pages, extracting {}", info.page_count, page_count);

    let mut parts = Vec::with_capacity(page_count);

    for (idx, &page_number) in pages.keys().take(page_count).enumerate() {
        let page_num = idx + 1;
        match document.extract_text(&[page_number]) {
            Ok(text) if !text.trim().is_empty() => {
                debug!("Page {}: {} chars", page_num, text.len());
                parts.push(format!("\n\n{}\n{}", page_marker(page_num), text));
            }
            Ok(_) => debug!("Page {}: no text layer", page_num),
            Err(e) => warn!("Page {}: text extraction failed: {}", page_num, e),
        }
    }

    Ok((info, parts.join("\n").trim().to_string()))
}

/// [`extract_text`] on tokio's blocking pool.
pub async fn extract_text_async(
    bytes: Vec<u8>,
    max_pages: usize,
) -> Result<String, Patent2DocxError> {
    tokio::task::spawn_blocking(move || extract_text(&bytes, max_pages))
        .await
        .map_err(|e| Patent2DocxError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// Read document-level facts without extracting any text.
pub fn inspect(bytes: &[u8]) -> Result<DocumentInfo, Patent2DocxError> {
    load(bytes).map(|document| document_info(&document))
}

/// Number of pages a run with `max_pages` will actually read.
pub fn pages_to_process(total_pages: usize, max_pages: usize) -> usize {
    total_pages.min(max_pages)
}

fn document_info(document: &Document) -> DocumentInfo {
    DocumentInfo {
        page_count: document.get_pages().len(),
        pdf_version: document.version.clone(),
        is_encrypted: document.trailer.get(b"Encrypt").is_ok(),
    }
}

fn load(bytes: &[u8]) -> Result<Document, Patent2DocxError> {
    Document::load_mem(bytes).map_err(|source| Patent2DocxError::CorruptPdf { source })
}
