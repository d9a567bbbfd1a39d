//! Pipeline stages for patent PDF analysis.
//!
//! Each submodule implements exactly one transformation step and can be
//! tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ clean ──▶ chat ──▶ sections ──▶ report
//! (bytes)   (lopdf)    (regex)   (LLM)    (markers)    (.docx)
//! ```
//!
//! 1. [`input`]: read a local file and check the `%PDF` magic
//! 2. [`extract`]: per-page text with page markers; runs in `spawn_blocking`
//! 3. [`clean`]: drop control characters, collapse whitespace
//! 4. [`chat`]: the chat completion call with 429 backoff; the only
//!    stage with network I/O
//! 5. [`sections`]: split the reply into brief / full / translation
//! 6. [`report`]: lay out and package the Word document

pub mod chat;
pub mod clean;
pub mod extract;
pub mod input;
pub mod report;
pub mod sections;
