mod metadata;
mod page_window;

pub use metadata::{extract_metadata, extract_metadata_blocking};
pub use page_window::{
    extract_page_window, extract_page_window_blocking, PageErrorPayload, PageTextWindow,
    PageWindowError, DEFAULT_CONTEXT_LINES,
};

use std::path::Path;

use lopdf::Document;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("File could not be read: {0}")]
    Unreadable(#[from] std::io::Error),
    #[error("PDF could not be parsed: {0}")]
    Parse(String),
    #[error("Text of page {page} could not be extracted: {reason}")]
    PageText { page: u32, reason: String },
    #[error("Extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub(crate) fn load_document(path: &Path) -> Result<Document, ExtractionError> {
    let bytes = std::fs::read(path)?;
    Document::load_mem(&bytes).map_err(|err| ExtractionError::Parse(err.to_string()))
}

pub(crate) fn page_count(document: &Document) -> u32 {
    u32::try_from(document.get_pages().len()).unwrap_or(u32::MAX)
}

/// Text of one page (1-based) with trailing whitespace removed.
pub(crate) fn page_text(document: &Document, page: u32) -> Result<String, ExtractionError> {
    document
        .extract_text(&[page])
        .map(|text| text.trim_end().to_string())
        .map_err(|err| ExtractionError::PageText {
            page,
            reason: err.to_string(),
        })
}
