use std::path::Path;

use async_trait::async_trait;
use common::storage::types::extracted_metadata::ExtractedMetadata;

use crate::extraction::{self, ExtractionError};

/// Work the pipeline delegates, so tests can substitute canned results.
#[async_trait]
pub trait PipelineServices: Send + Sync {
    async fn extract_metadata(&self, path: &Path) -> Result<ExtractedMetadata, ExtractionError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPipelineServices;

#[async_trait]
impl PipelineServices for DefaultPipelineServices {
    async fn extract_metadata(&self, path: &Path) -> Result<ExtractedMetadata, ExtractionError> {
        extraction::extract_metadata(path).await
    }
}
