use std::{
    fmt,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use common::{
    error::AppError,
    utils::config::{AppConfig, DEFAULT_MAX_UPLOAD_SIZE},
};
use lopdf::Document;
use tracing::{debug, info, warn};

const PDF_MAGIC: &[u8] = b"%PDF-";
const SNIFF_WINDOW: usize = 512;
const ENCRYPT_KEY: &[u8] = b"/Encrypt";
const PDF_WHITESPACE: &[u8] = b" \t\r\n\x0c\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    pub max_upload_size: u64,
}

impl ValidationLimits {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_upload_size: config.max_upload_size,
        }
    }
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }
}

/// Why an upload was turned away. `Display` yields the message shown to the
/// uploader; `code` is a stable machine-readable identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    FileMissing,
    Empty,
    Oversized { actual: u64, limit: u64 },
    WrongMimeType { detected: String },
    Unreadable,
    ZeroPages,
    Encrypted,
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::FileMissing => "file-missing",
            RejectionReason::Empty => "empty",
            RejectionReason::Oversized { .. } => "oversized",
            RejectionReason::WrongMimeType { .. } => "wrong-mime-type",
            RejectionReason::Unreadable => "unreadable",
            RejectionReason::ZeroPages => "zero-pages",
            RejectionReason::Encrypted => "encrypted",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::FileMissing => f.write_str("File does not exist"),
            RejectionReason::Empty => f.write_str("File is empty"),
            RejectionReason::Oversized { actual, limit } => {
                write!(f, "File too large ({actual} > {limit})")
            }
            RejectionReason::WrongMimeType { detected } => {
                write!(f, "Invalid file type: {detected}")
            }
            RejectionReason::Unreadable => f.write_str("PDF could not be parsed"),
            RejectionReason::ZeroPages => f.write_str("PDF has no pages"),
            RejectionReason::Encrypted => f.write_str("PDF is encrypted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Rejected(RejectionReason),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn rejection(&self) -> Option<&RejectionReason> {
        match self {
            ValidationResult::Valid => None,
            ValidationResult::Rejected(reason) => Some(reason),
        }
    }
}

/// Decides whether the file at `path` is an acceptable PDF upload.
///
/// Checks run cheapest first and stop at the first failure: existence,
/// non-empty, size limit, sniffed content type, parseability, page count,
/// and finally encryption. Never panics and never returns an error; every
/// failure is folded into a [`RejectionReason`].
pub fn validate_pdf(path: &Path, limits: &ValidationLimits) -> ValidationResult {
    match run_checks(path, limits) {
        Ok(()) => {
            debug!(path = %path.display(), "upload passed validation");
            ValidationResult::Valid
        }
        Err(reason) => {
            info!(
                path = %path.display(),
                reason = reason.code(),
                message = %reason,
                "upload rejected"
            );
            ValidationResult::Rejected(reason)
        }
    }
}

/// Runs [`validate_pdf`] on the blocking pool.
pub async fn validate_upload(
    path: PathBuf,
    limits: ValidationLimits,
) -> Result<ValidationResult, AppError> {
    Ok(tokio::task::spawn_blocking(move || validate_pdf(&path, &limits)).await?)
}

fn run_checks(path: &Path, limits: &ValidationLimits) -> Result<(), RejectionReason> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata,
        Ok(_) => return Err(RejectionReason::FileMissing),
        Err(err) if err.kind() == ErrorKind::NotFound => return Err(RejectionReason::FileMissing),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "could not stat upload");
            return Err(RejectionReason::Unreadable);
        }
    };

    let size = metadata.len();
    if size == 0 {
        return Err(RejectionReason::Empty);
    }
    if size > limits.max_upload_size {
        return Err(RejectionReason::Oversized {
            actual: size,
            limit: limits.max_upload_size,
        });
    }

    let bytes = std::fs::read(path).map_err(|err| {
        warn!(path = %path.display(), error = %err, "could not read upload");
        RejectionReason::Unreadable
    })?;

    let detected = sniff_mime_type(&bytes);
    if detected != mime::APPLICATION_PDF.essence_str() {
        return Err(RejectionReason::WrongMimeType { detected });
    }

    let document = match Document::load_mem(&bytes) {
        Ok(document) => document,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "PDF parse failed");
            if trailer_declares_encryption(&bytes) {
                return Err(RejectionReason::Encrypted);
            }
            return Err(RejectionReason::Unreadable);
        }
    };

    if document.get_pages().is_empty() {
        return Err(RejectionReason::ZeroPages);
    }
    if document.is_encrypted() {
        return Err(RejectionReason::Encrypted);
    }

    Ok(())
}

/// Used only when lopdf cannot load the file: reports whether the last
/// trailer (or, failing that, the cross-reference stream dictionary) holds an
/// `/Encrypt` entry pointing at an indirect object.
fn trailer_declares_encryption(bytes: &[u8]) -> bool {
    trailer_dictionary(bytes).is_some_and(has_encrypt_reference)
}

fn trailer_dictionary(bytes: &[u8]) -> Option<&[u8]> {
    if let Some(pos) = rfind(bytes, b"trailer") {
        return bytes.get(pos..);
    }
    let xref = rfind(bytes, b"/XRef")?;
    let start = bytes.get(..xref).and_then(|head| rfind(head, b"obj")).unwrap_or(0);
    let end = bytes
        .get(xref..)
        .and_then(|tail| find(tail, b"stream"))
        .map_or(bytes.len(), |offset| xref.saturating_add(offset));
    bytes.get(start..end)
}

fn has_encrypt_reference(dictionary: &[u8]) -> bool {
    let mut rest = dictionary;
    while let Some(pos) = find(rest, ENCRYPT_KEY) {
        let after = rest.get(pos.saturating_add(ENCRYPT_KEY.len())..).unwrap_or_default();
        if indirect_reference(after).is_some() {
            return true;
        }
        rest = after;
    }
    false
}

/// Matches `<ws> N <ws> G <ws> R` at the start of `bytes`.
fn indirect_reference(bytes: &[u8]) -> Option<()> {
    let rest = skip_while(bytes, |b| PDF_WHITESPACE.contains(&b))?;
    let rest = skip_while(rest, |b| b.is_ascii_digit())?;
    let rest = skip_while(rest, |b| PDF_WHITESPACE.contains(&b))?;
    let rest = skip_while(rest, |b| b.is_ascii_digit())?;
    let rest = skip_while(rest, |b| PDF_WHITESPACE.contains(&b))?;
    match rest {
        [b'R'] => Some(()),
        [b'R', next, ..] if !next.is_ascii_alphanumeric() => Some(()),
        _ => None,
    }
}

/// Skips a non-empty run of bytes matching `pred`.
fn skip_while(bytes: &[u8], pred: impl Fn(u8) -> bool) -> Option<&[u8]> {
    let count = bytes.iter().take_while(|b| pred(**b)).count();
    if count == 0 {
        return None;
    }
    bytes.get(count..)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|window| window == needle)
}

/// Identifies a file type from its leading bytes. Returns a MIME type
/// string; unknown binary content is `application/octet-stream`.
pub fn sniff_mime_type(header: &[u8]) -> String {
    let window = header.get(..SNIFF_WINDOW).unwrap_or(header);

    let sniffed = if window.starts_with(PDF_MAGIC) {
        mime::APPLICATION_PDF
    } else if window.starts_with(b"\x89PNG\r\n\x1a\n") {
        mime::IMAGE_PNG
    } else if window.starts_with(&[0xFF, 0xD8, 0xFF]) {
        mime::IMAGE_JPEG
    } else if window.starts_with(b"GIF87a") || window.starts_with(b"GIF89a") {
        mime::IMAGE_GIF
    } else if window.starts_with(b"PK\x03\x04") {
        return "application/zip".to_string();
    } else if window.starts_with(&[0x1F, 0x8B]) {
        return "application/gzip".to_string();
    } else if looks_like_text(window) {
        mime::TEXT_PLAIN
    } else {
        mime::APPLICATION_OCTET_STREAM
    };

    sniffed.essence_str().to_string()
}

fn looks_like_text(window: &[u8]) -> bool {
    if window.contains(&0) {
        return false;
    }
    match std::str::from_utf8(window) {
        Ok(_) => true,
        // A multi-byte character cut off by the sniff window is still text.
        Err(err) => err.error_len().is_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pdfs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        test_pdfs::write_pdf(dir.path(), name, bytes)
    }

    fn rejection(path: &Path, limits: &ValidationLimits) -> RejectionReason {
        match validate_pdf(path, limits) {
            ValidationResult::Rejected(reason) => reason,
            ValidationResult::Valid => panic!("expected {} to be rejected", path.display()),
        }
    }

    #[test]
    fn accepts_a_regular_pdf() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(
            &dir,
            "ok.pdf",
            &test_pdfs::pdf_with_pages(&[&["Hello"], &["World"]]),
        );

        let result = validate_pdf(&path, &ValidationLimits::default());
        assert!(result.is_valid());
        assert!(result.rejection().is_none());
    }

    #[test]
    fn missing_file_is_reported_first() {
        let dir = TempDir::new().expect("tempdir");
        let reason = rejection(&dir.path().join("nope.pdf"), &ValidationLimits::default());

        assert_eq!(reason, RejectionReason::FileMissing);
        assert_eq!(reason.code(), "file-missing");
        assert_eq!(reason.to_string(), "File does not exist");
    }

    #[test]
    fn directory_is_not_a_file() {
        let dir = TempDir::new().expect("tempdir");

        assert_eq!(
            rejection(dir.path(), &ValidationLimits::default()),
            RejectionReason::FileMissing
        );
    }

    #[test]
    fn empty_file_is_rejected_before_type_checks() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(&dir, "empty.pdf", b"");

        let reason = rejection(&path, &ValidationLimits::default());
        assert_eq!(reason, RejectionReason::Empty);
        assert_eq!(reason.to_string(), "File is empty");
    }

    #[test]
    fn oversized_file_reports_both_sizes() {
        let dir = TempDir::new().expect("tempdir");
        let bytes = test_pdfs::pdf_with_pages(&[&["Hello"]]);
        let path = write(&dir, "big.pdf", &bytes);
        let limits = ValidationLimits {
            max_upload_size: 10,
        };

        let reason = rejection(&path, &limits);
        let actual = u64::try_from(bytes.len()).expect("len fits");
        assert_eq!(reason, RejectionReason::Oversized { actual, limit: 10 });
        assert_eq!(reason.to_string(), format!("File too large ({actual} > 10)"));
    }

    #[test]
    fn file_at_exact_limit_is_accepted() {
        let dir = TempDir::new().expect("tempdir");
        let bytes = test_pdfs::pdf_with_pages(&[&["Hello"]]);
        let path = write(&dir, "edge.pdf", &bytes);
        let limits = ValidationLimits {
            max_upload_size: u64::try_from(bytes.len()).expect("len fits"),
        };

        assert!(validate_pdf(&path, &limits).is_valid());
    }

    #[test]
    fn plain_text_is_the_wrong_type() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(&dir, "notes.pdf", b"just some notes, renamed to .pdf");

        let reason = rejection(&path, &ValidationLimits::default());
        assert_eq!(
            reason,
            RejectionReason::WrongMimeType {
                detected: "text/plain".into()
            }
        );
        assert_eq!(reason.to_string(), "Invalid file type: text/plain");
    }

    #[test]
    fn png_is_the_wrong_type() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(&dir, "image.pdf", b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR");

        assert_eq!(
            rejection(&path, &ValidationLimits::default()).code(),
            "wrong-mime-type"
        );
    }

    #[test]
    fn corrupt_pdf_is_unreadable() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(&dir, "broken.pdf", b"%PDF-1.4\nthis is not really a pdf body\n");

        let reason = rejection(&path, &ValidationLimits::default());
        assert_eq!(reason, RejectionReason::Unreadable);
        assert_eq!(reason.to_string(), "PDF could not be parsed");
    }

    #[test]
    fn document_without_pages_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(&dir, "blank.pdf", &test_pdfs::empty_page_tree());

        let reason = rejection(&path, &ValidationLimits::default());
        assert_eq!(reason, RejectionReason::ZeroPages);
        assert_eq!(reason.to_string(), "PDF has no pages");
    }

    #[test]
    fn encrypted_document_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(&dir, "locked.pdf", &test_pdfs::encrypted_pdf());

        let reason = rejection(&path, &ValidationLimits::default());
        assert_eq!(reason, RejectionReason::Encrypted);
        assert_eq!(reason.to_string(), "PDF is encrypted");
    }

    #[test]
    fn encrypt_key_in_metadata_text_is_not_encryption() {
        let dir = TempDir::new().expect("tempdir");
        let bytes = test_pdfs::build_pdf(
            &[&["hello world"]],
            Some(test_pdfs::info(&[("Subject", "Notes on /Encrypt dictionaries")])),
        );
        let path = write(&dir, "notes.pdf", &bytes);

        assert!(validate_pdf(&path, &ValidationLimits::default()).is_valid());
    }

    #[test]
    fn encrypt_key_in_page_text_is_not_encryption() {
        let dir = TempDir::new().expect("tempdir");
        let bytes = test_pdfs::pdf_with_pages(&[&["Chapter 9: how the /Encrypt key works"]]);
        let path = write(&dir, "chapter.pdf", &bytes);

        assert!(validate_pdf(&path, &ValidationLimits::default()).is_valid());
    }

    #[test]
    fn trailer_scan_requires_an_indirect_reference_in_the_trailer() {
        assert!(trailer_declares_encryption(
            b"1 0 obj\n<< >>\nendobj\ntrailer\n<< /Root 1 0 R /Encrypt 7 0 R >>\n%%EOF"
        ));
        assert!(trailer_declares_encryption(
            b"trailer<</Encrypt\r\n12 0 R/Root 1 0 R>>"
        ));
        assert!(!trailer_declares_encryption(
            b"3 0 obj\n<< /Subject (/Encrypt 7 0 R) >>\nendobj\ntrailer\n<< /Root 1 0 R >>"
        ));
        assert!(!trailer_declares_encryption(
            b"trailer\n<< /Root 1 0 R /Subject (about /Encrypt keys) >>"
        ));
        assert!(!trailer_declares_encryption(
            b"trailer\n<< /Encrypted 7 0 R >>"
        ));
        assert!(!trailer_declares_encryption(b"%PDF-1.4\n/Encrypt 7 0 R\n"));
    }

    #[test]
    fn trailer_scan_reads_cross_reference_stream_dictionaries() {
        assert!(trailer_declares_encryption(
            b"9 0 obj\n<< /Type /XRef /Size 10 /Encrypt 8 0 R >>\nstream\n..."
        ));
        assert!(!trailer_declares_encryption(
            b"9 0 obj\n<< /Type /XRef /Size 10 >>\nstream\n/Encrypt 8 0 R"
        ));
    }

    #[test]
    fn sniffing_recognises_common_signatures() {
        assert_eq!(sniff_mime_type(b"%PDF-1.7\n"), "application/pdf");
        assert_eq!(sniff_mime_type(b"\xFF\xD8\xFF\xE0"), "image/jpeg");
        assert_eq!(sniff_mime_type(b"GIF89a...."), "image/gif");
        assert_eq!(sniff_mime_type(b"PK\x03\x04rest"), "application/zip");
        assert_eq!(sniff_mime_type(b"plain words"), "text/plain");
        assert_eq!(sniff_mime_type(&[0x00, 0x01, 0x02, 0xFE]), "application/octet-stream");
    }

    #[test]
    fn pdf_magic_must_be_at_offset_zero() {
        assert_eq!(sniff_mime_type(b"  %PDF-1.4"), "text/plain");
    }

    #[tokio::test]
    async fn async_wrapper_matches_sync_result() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(&dir, "empty.pdf", b"");

        let result = validate_upload(path, ValidationLimits::default())
            .await
            .expect("join");
        assert_eq!(result, ValidationResult::Rejected(RejectionReason::Empty));
    }

    #[test]
    fn limits_follow_config() {
        let config = AppConfig {
            max_upload_size: 42,
            ..Default::default()
        };

        assert_eq!(ValidationLimits::from_config(&config).max_upload_size, 42);
    }
}
