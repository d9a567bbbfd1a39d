//! Prompts for patent analysis.
//!
//! The instructional prompt itself lives in a plain-text template file
//! (default [`crate::config::DEFAULT_PROMPT_PATH`]) so analysts can tune the
//! wording without a rebuild. This module holds the fixed system message,
//! loads the template, and glues template + extracted text into the user turn.

use crate::error::Patent2DocxError;
use std::path::Path;
use tracing::debug;

/// System message sent ahead of every analysis request.
pub const SYSTEM_PROMPT: &str = "你是专业专利分析师。请严格按用户Prompt结构输出。";

/// Banner separating the instructions from the extracted patent text.
pub const TEXT_BANNER: &str = "====================\n\
【以下是专利文件解析出的正文文本】\n\
====================";

/// Load the prompt template from `path`.
///
/// A missing file is a configuration error ([`Patent2DocxError::PromptNotFound`]),
/// never retried.
pub async fn load_prompt(path: &Path) -> Result<String, Patent2DocxError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => {
            debug!("Loaded prompt template {} ({} bytes)", path.display(), text.len());
            Ok(text)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Patent2DocxError::PromptNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(source) => Err(Patent2DocxError::PromptReadFailed {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Build the single user turn: template, banner, then the patent text.
pub fn build_user_content(prompt: &str, pdf_text: &str) -> String {
    format!("{prompt}\n\n{TEXT_BANNER}\n{pdf_text}\n")
}
