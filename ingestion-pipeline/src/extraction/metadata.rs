use std::path::Path;

use common::storage::types::extracted_metadata::ExtractedMetadata;
use lopdf::{Dictionary, Document, Object};
use tracing::{debug, warn};

use super::{load_document, page_count, page_text, ExtractionError};

const TITLE_MAX_CHARS: usize = 100;
const TITLE_MIN_CHARS: usize = 3;
const UTF16_BOM: [u8; 2] = [0xFE, 0xFF];
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Reads page count and document information from the PDF at `path`.
///
/// Fails only when the file cannot be read or parsed at all. Individual
/// fields that cannot be decoded are left empty and described in
/// `extraction_errors`. When the document carries no usable title, the first
/// substantial line of page 1 is used instead.
pub async fn extract_metadata(path: &Path) -> Result<ExtractedMetadata, ExtractionError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || extract_metadata_blocking(&path)).await?
}

pub fn extract_metadata_blocking(path: &Path) -> Result<ExtractedMetadata, ExtractionError> {
    let document = load_document(path)?;
    let mut metadata = ExtractedMetadata {
        total_pages: page_count(&document),
        ..Default::default()
    };

    match info_dictionary(&document) {
        Ok(Some(info)) => read_info_fields(&document, info, &mut metadata),
        Ok(None) => debug!(path = %path.display(), "document has no info dictionary"),
        Err(note) => metadata.note(note),
    }

    if metadata.title.is_empty() {
        recover_title(&document, &mut metadata);
    }

    for note in &metadata.extraction_errors {
        warn!(path = %path.display(), %note, "metadata extraction degraded");
    }
    debug!(
        path = %path.display(),
        total_pages = metadata.total_pages,
        has_title = !metadata.title.is_empty(),
        "metadata extracted"
    );

    Ok(metadata)
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> lopdf::Result<&'a Object> {
    match object {
        Object::Reference(id) => document.get_object(*id),
        other => Ok(other),
    }
}

fn info_dictionary(document: &Document) -> Result<Option<&Dictionary>, String> {
    let Ok(info) = document.trailer.get(b"Info") else {
        return Ok(None);
    };

    resolve(document, info)
        .and_then(Object::as_dict)
        .map(Some)
        .map_err(|err| format!("Info dictionary unreadable: {err}"))
}

fn read_info_fields(document: &Document, info: &Dictionary, metadata: &mut ExtractedMetadata) {
    let mut notes = Vec::new();
    let mut field = |key: &str| -> String {
        let Ok(value) = info.get(key.as_bytes()) else {
            return String::new();
        };
        match resolve(document, value).and_then(Object::as_str) {
            Ok(bytes) => decode_pdf_text(bytes),
            Err(err) => {
                notes.push(format!("{key} field unreadable: {err}"));
                String::new()
            }
        }
    };

    metadata.title = field("Title");
    metadata.author = field("Author");
    metadata.subject = field("Subject");
    metadata.keywords = field("Keywords");
    metadata.creator = field("Creator");
    metadata.producer = field("Producer");
    metadata.creation_date = Some(field("CreationDate")).filter(|date| !date.is_empty());
    metadata.modification_date = Some(field("ModDate")).filter(|date| !date.is_empty());

    for note in notes {
        metadata.note(note);
    }
}

fn recover_title(document: &Document, metadata: &mut ExtractedMetadata) {
    if metadata.total_pages == 0 {
        metadata.note("Title recovery skipped: document has no pages");
        return;
    }

    match page_text(document, 1) {
        Ok(text) => match title_from_text(&text) {
            Some(title) => metadata.title = title,
            None => metadata.note("Title recovery found no usable line on page 1"),
        },
        Err(err) => metadata.note(format!("Title recovery failed: {err}")),
    }
}

/// First line longer than three characters once trimmed, cut to 100 characters.
pub(crate) fn title_from_text(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| line.chars().count() > TITLE_MIN_CHARS)
        .map(|line| line.chars().take(TITLE_MAX_CHARS).collect())
}

/// PDFDocEncoding agrees with Latin-1 except for these ranges.
const PDF_DOC_LOW: [char; 8] = [
    '\u{02D8}', '\u{02C7}', '\u{02C6}', '\u{02D9}', '\u{02DD}', '\u{02DB}', '\u{02DA}', '\u{02DC}',
];
const PDF_DOC_HIGH: [char; 33] = [
    '\u{2022}', '\u{2020}', '\u{2021}', '\u{2026}', '\u{2014}', '\u{2013}', '\u{0192}', '\u{2044}',
    '\u{2039}', '\u{203A}', '\u{2212}', '\u{2030}', '\u{201E}', '\u{201C}', '\u{201D}', '\u{2018}',
    '\u{2019}', '\u{201A}', '\u{2122}', '\u{FB01}', '\u{FB02}', '\u{0141}', '\u{0152}', '\u{0160}',
    '\u{0178}', '\u{017D}', '\u{0131}', '\u{0142}', '\u{0153}', '\u{0161}', '\u{017E}', '\u{FFFD}',
    '\u{20AC}',
];

fn pdf_doc_char(byte: u8) -> char {
    match byte {
        0x18..=0x1F => table_char(&PDF_DOC_LOW, byte.wrapping_sub(0x18)),
        0x80..=0xA0 => table_char(&PDF_DOC_HIGH, byte.wrapping_sub(0x80)),
        0xAD => char::REPLACEMENT_CHARACTER,
        _ => char::from(byte),
    }
}

fn table_char(table: &[char], index: u8) -> char {
    table
        .get(usize::from(index))
        .copied()
        .unwrap_or(char::REPLACEMENT_CHARACTER)
}

/// Decodes a PDF text string: UTF-16BE when it starts with a byte order
/// mark, UTF-8 with its mark, otherwise single-byte PDFDocEncoding.
/// Surrounding whitespace and NULs are dropped.
pub(crate) fn decode_pdf_text(bytes: &[u8]) -> String {
    let decoded = if let Some(utf16) = bytes.strip_prefix(&UTF16_BOM) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else if let Some(utf8) = bytes.strip_prefix(&UTF8_BOM) {
        String::from_utf8_lossy(utf8).into_owned()
    } else {
        bytes.iter().map(|&byte| pdf_doc_char(byte)).collect()
    };

    decoded
        .trim_matches(|c: char| c.is_whitespace() || c == '\0')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pdfs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, bytes: &[u8]) -> std::path::PathBuf {
        test_pdfs::write_pdf(dir.path(), "book.pdf", bytes)
    }

    #[tokio::test]
    async fn reads_the_information_dictionary() {
        let dir = TempDir::new().expect("tempdir");
        let info = test_pdfs::info(&[
            ("Title", "Deep Work"),
            ("Author", "Cal Newport"),
            ("Producer", "pdfTeX-1.40"),
            ("Creator", "LaTeX"),
            ("Subject", "Focus"),
            ("Keywords", "attention, work"),
            ("CreationDate", "D:20160105120000Z"),
        ]);
        let path = write(
            &dir,
            &test_pdfs::build_pdf(&[&["Chapter One"], &["Chapter Two"]], Some(info)),
        );

        let metadata = extract_metadata(&path).await.expect("metadata");

        assert_eq!(metadata.total_pages, 2);
        assert_eq!(metadata.title, "Deep Work");
        assert_eq!(metadata.author, "Cal Newport");
        assert_eq!(metadata.producer, "pdfTeX-1.40");
        assert_eq!(metadata.creator, "LaTeX");
        assert_eq!(metadata.subject, "Focus");
        assert_eq!(metadata.keywords, "attention, work");
        assert_eq!(metadata.creation_date.as_deref(), Some("D:20160105120000Z"));
        assert!(metadata.modification_date.is_none());
        assert!(metadata.extraction_errors.is_empty());
    }

    #[tokio::test]
    async fn recovers_title_from_first_page_without_info() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(
            &dir,
            &test_pdfs::pdf_with_pages(&[
                &["12", "abc", "The Art of Reading", "by Someone"],
                &["Second page"],
                &["Third page"],
            ]),
        );

        let metadata = extract_metadata(&path).await.expect("metadata");

        assert_eq!(metadata.total_pages, 3);
        assert_eq!(metadata.title, "The Art of Reading");
        assert_eq!(metadata.author, "");
        assert_eq!(metadata.producer, "");
        assert!(metadata.creation_date.is_none());
    }

    #[tokio::test]
    async fn textless_document_keeps_empty_title_and_notes_why() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(&dir, &test_pdfs::pdf_with_pages(&[&[], &[], &[]]));

        let metadata = extract_metadata(&path).await.expect("metadata");

        assert_eq!(metadata.total_pages, 3);
        assert_eq!(metadata.title, "");
        assert_eq!(metadata.extraction_errors.len(), 1);
    }

    #[tokio::test]
    async fn blank_embedded_title_triggers_recovery() {
        let dir = TempDir::new().expect("tempdir");
        let info = test_pdfs::info(&[("Title", "   ")]);
        let path = write(
            &dir,
            &test_pdfs::build_pdf(&[&["Recovered Heading"]], Some(info)),
        );

        let metadata = extract_metadata(&path).await.expect("metadata");
        assert_eq!(metadata.title, "Recovered Heading");
    }

    #[tokio::test]
    async fn non_string_title_is_noted_and_recovered() {
        let dir = TempDir::new().expect("tempdir");
        let mut info = test_pdfs::info(&[("Author", "Someone")]);
        info.set("Title", 42);
        let path = write(
            &dir,
            &test_pdfs::build_pdf(&[&["Heading From Text"]], Some(info)),
        );

        let metadata = extract_metadata(&path).await.expect("metadata");

        assert_eq!(metadata.title, "Heading From Text");
        assert_eq!(metadata.author, "Someone");
        assert!(metadata
            .extraction_errors
            .iter()
            .any(|note| note.starts_with("Title field unreadable")));
    }

    #[tokio::test]
    async fn unicode_title_is_decoded() {
        let dir = TempDir::new().expect("tempdir");
        let mut info = Dictionary::new();
        info.set(
            "Title",
            Object::string_literal(vec![0xFE, 0xFF, 0x00, 0x48, 0x00, 0xE9, 0x00, 0x6C, 0x00, 0x6C, 0x00, 0x6F]),
        );
        let path = write(&dir, &test_pdfs::build_pdf(&[&["Body"]], Some(info)));

        let metadata = extract_metadata(&path).await.expect("metadata");
        assert_eq!(metadata.title, "Héllo");
    }

    #[tokio::test]
    async fn extraction_is_repeatable() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(
            &dir,
            &test_pdfs::pdf_with_pages(&[&["Same Every Time"], &["Again"]]),
        );

        let first = extract_metadata(&path).await.expect("first");
        let second = extract_metadata(&path).await.expect("second");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = TempDir::new().expect("tempdir");

        let result = extract_metadata(&dir.path().join("gone.pdf")).await;
        assert!(matches!(result, Err(ExtractionError::Unreadable(_))));
    }

    #[tokio::test]
    async fn garbage_is_a_parse_error() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(&dir, b"%PDF-1.4\nnot a real document");

        let result = extract_metadata(&path).await;
        assert!(matches!(result, Err(ExtractionError::Parse(_))));
    }

    #[test]
    fn title_heuristic_skips_short_lines_and_truncates() {
        assert_eq!(title_from_text("1\n  ab \n\nReal Title  \nmore"), Some("Real Title".into()));
        assert_eq!(title_from_text("abc\n12\n"), None);
        assert_eq!(title_from_text(""), None);

        let long = "x".repeat(150);
        let title = title_from_text(&long).expect("title");
        assert_eq!(title.chars().count(), 100);
    }

    #[test]
    fn decode_handles_each_encoding() {
        assert_eq!(decode_pdf_text(b"  Plain  "), "Plain");
        assert_eq!(decode_pdf_text(&[0x43, 0x61, 0x66, 0xE9]), "Café");
        assert_eq!(decode_pdf_text(&[0xFE, 0xFF, 0x00, 0x41, 0x00, 0x42]), "AB");
        assert_eq!(decode_pdf_text(&[0xEF, 0xBB, 0xBF, b'o', b'k']), "ok");
        assert_eq!(decode_pdf_text(b"Nul\0"), "Nul");
    }

    #[test]
    fn pdf_doc_encoding_differs_from_latin1_where_it_should() {
        assert_eq!(decode_pdf_text(b"Brand\x92"), "Brand\u{2122}");
        assert_eq!(decode_pdf_text(b"\x8DQuoted\x8E"), "\u{201C}Quoted\u{201D}");
        assert_eq!(decode_pdf_text(b"\x93nd \x84 \xA0"), "\u{FB01}nd \u{2014} \u{20AC}");
        assert_eq!(decode_pdf_text(b"a\x18b"), "a\u{02D8}b");
        assert_eq!(decode_pdf_text(b"\xE9t\xE9"), "\u{E9}t\u{E9}");
    }
}
