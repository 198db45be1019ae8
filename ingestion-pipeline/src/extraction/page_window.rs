use std::path::Path;

use lopdf::Document;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::{load_document, page_count, page_text, ExtractionError};

pub const DEFAULT_CONTEXT_LINES: usize = 2;

/// Text of one page together with the tail of the page before it and the
/// head of the page after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTextWindow {
    pub current_page_text: String,
    pub previous_context: String,
    pub next_context: String,
    pub has_previous: bool,
    pub has_next: bool,
    pub total_pages: u32,
}

#[derive(Error, Debug)]
pub enum PageWindowError {
    #[error("Invalid page number {requested}; document has {total_pages} pages")]
    InvalidPage { requested: u32, total_pages: u32 },
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Error body returned to readers: the message plus an empty page text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageErrorPayload {
    pub error: String,
    pub text: String,
}

impl PageWindowError {
    pub fn to_payload(&self) -> PageErrorPayload {
        PageErrorPayload {
            error: self.to_string(),
            text: String::new(),
        }
    }
}

pub async fn extract_page_window(
    path: &Path,
    page_number: u32,
    context_lines: usize,
) -> Result<PageTextWindow, PageWindowError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        extract_page_window_blocking(&path, page_number, context_lines)
    })
    .await
    .map_err(ExtractionError::from)?
}

/// Returns page `page_number` (1-based) with up to `context_lines` lines
/// from each neighbouring page. A neighbour with fewer lines is returned
/// whole; a neighbour whose text cannot be extracted contributes nothing.
pub fn extract_page_window_blocking(
    path: &Path,
    page_number: u32,
    context_lines: usize,
) -> Result<PageTextWindow, PageWindowError> {
    let document = load_document(path)?;
    let total_pages = page_count(&document);
    if page_number == 0 || page_number > total_pages {
        return Err(PageWindowError::InvalidPage {
            requested: page_number,
            total_pages,
        });
    }

    let current_page_text = page_text(&document, page_number)?;
    let has_previous = page_number > 1;
    let has_next = page_number < total_pages;

    let previous_context = if has_previous {
        neighbour_text(&document, page_number.saturating_sub(1))
            .map(|text| last_lines(&text, context_lines))
            .unwrap_or_default()
    } else {
        String::new()
    };
    let next_context = if has_next {
        neighbour_text(&document, page_number.saturating_add(1))
            .map(|text| first_lines(&text, context_lines))
            .unwrap_or_default()
    } else {
        String::new()
    };

    Ok(PageTextWindow {
        current_page_text,
        previous_context,
        next_context,
        has_previous,
        has_next,
        total_pages,
    })
}

fn neighbour_text(document: &Document, page: u32) -> Option<String> {
    match page_text(document, page) {
        Ok(text) => Some(text),
        Err(err) => {
            warn!(page, error = %err, "neighbouring page text unavailable");
            None
        }
    }
}

pub(crate) fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() < count {
        return text.to_string();
    }
    lines
        .get(lines.len().saturating_sub(count)..)
        .unwrap_or_default()
        .join("\n")
}

pub(crate) fn first_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() < count {
        return text.to_string();
    }
    lines.get(..count).unwrap_or_default().join("\n")
}
