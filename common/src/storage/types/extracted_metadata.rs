use serde::{Deserialize, Serialize};

pub const FALLBACK_TITLE: &str = "Untitled";

/// Descriptive metadata read out of a PDF. Text fields are empty when the
/// document does not carry them; `extraction_errors` collects notes about
/// anything that could not be read without failing the whole extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedMetadata {
    pub total_pages: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub producer: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub keywords: String,
    #[serde(default)]
    pub creation_date: Option<String>,
    #[serde(default)]
    pub modification_date: Option<String>,
    #[serde(default)]
    pub extraction_errors: Vec<String>,
}

impl ExtractedMetadata {
    pub fn note(&mut self, message: impl Into<String>) {
        self.extraction_errors.push(message.into());
    }

    /// Picks the display title: caller override, then the document's own
    /// title, then the uploaded file's name without its extension.
    pub fn resolve_title(&self, title_override: Option<&str>, original_filename: &str) -> String {
        non_blank(title_override)
            .or_else(|| non_blank(Some(&self.title)))
            .map_or_else(|| filename_stem(original_filename), str::to_string)
    }

    pub fn resolve_author(&self, author_override: Option<&str>) -> String {
        non_blank(author_override)
            .or_else(|| non_blank(Some(&self.author)))
            .unwrap_or_default()
            .to_string()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// File name without directories or its final extension.
pub fn filename_stem(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim();
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.trim().is_empty() => stem.trim(),
        _ => base,
    };

    if stem.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        stem.to_string()
    }
}
