use super::config::AppConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestValidationError {
    PayloadTooLarge(String),
    BadRequest(String),
}

/// Checks the free-text fields that accompany an upload.
pub fn validate_upload_fields(
    config: &AppConfig,
    file_name: &str,
    title: Option<&str>,
    author: Option<&str>,
) -> Result<(), IngestValidationError> {
    if file_name.trim().is_empty() {
        return Err(IngestValidationError::BadRequest(
            "Uploaded file must carry a file name".to_string(),
        ));
    }

    for (label, value) in [
        ("File name", Some(file_name)),
        ("Title", title),
        ("Author", author),
    ] {
        if let Some(value) = value {
            if value.len() > config.max_field_bytes {
                return Err(IngestValidationError::PayloadTooLarge(format!(
                    "{label} is too large. Maximum allowed is {} bytes",
                    config.max_field_bytes
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_file_name() {
        let config = AppConfig::default();
        let result = validate_upload_fields(&config, "  ", None, None);

        assert!(matches!(result, Err(IngestValidationError::BadRequest(_))));
    }

    #[test]
    fn rejects_oversized_title() {
        let config = AppConfig {
            max_field_bytes: 4,
            ..Default::default()
        };
        let result = validate_upload_fields(&config, "a.pdf", Some("12345"), None);

        assert!(matches!(
            result,
            Err(IngestValidationError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn rejects_oversized_author() {
        let config = AppConfig {
            max_field_bytes: 6,
            ..Default::default()
        };
        let result = validate_upload_fields(&config, "a.pdf", None, Some("Someone Long"));

        assert!(matches!(
            result,
            Err(IngestValidationError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn accepts_valid_fields() {
        let config = AppConfig::default();
        let result = validate_upload_fields(&config, "notes.pdf", Some("Notes"), Some("Me"));

        assert!(result.is_ok());
    }
}
