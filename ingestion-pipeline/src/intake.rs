use std::path::Path;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        store::ContentStore,
        types::{
            book::{Book, ProcessingStatus},
            extraction_job::{ExtractionJob, NewExtractionJob},
            stored_file::FileError,
        },
    },
    utils::{
        config::AppConfig,
        ingest_limits::{validate_upload_fields, IngestValidationError},
    },
};
use chrono::Utc;
use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::validation::{validate_upload, RejectionReason, ValidationLimits, ValidationResult};

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("{0}")]
    Rejected(RejectionReason),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    TooLarge(String),
    #[error(transparent)]
    App(#[from] AppError),
}

impl From<FileError> for UploadError {
    fn from(err: FileError) -> Self {
        UploadError::App(AppError::File(err))
    }
}

impl From<IngestValidationError> for UploadError {
    fn from(err: IngestValidationError) -> Self {
        match err {
            IngestValidationError::BadRequest(message) => UploadError::InvalidInput(message),
            IngestValidationError::PayloadTooLarge(message) => UploadError::TooLarge(message),
        }
    }
}

pub struct UploadRequest {
    pub user_id: String,
    pub file: NamedTempFile,
    pub file_name: String,
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
    pub job_id: String,
    pub book_id: String,
    pub file_name: String,
    pub stored_path: String,
    pub sha256: String,
    pub deduplicated: bool,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Validates, stores and enqueues one uploaded PDF.
///
/// Nothing is left under the store root when the upload is rejected. On
/// success the book exists in `processing` state with a queued job.
#[tracing::instrument(skip_all, fields(user_id = %request.user_id, file_name = %request.file_name))]
pub async fn accept_upload(
    db: &SurrealDbClient,
    store: &ContentStore,
    config: &AppConfig,
    request: UploadRequest,
) -> Result<UploadReceipt, UploadError> {
    let UploadRequest {
        user_id,
        file,
        file_name,
        title,
        author,
    } = request;
    let title = non_blank(title);
    let author = non_blank(author);

    validate_upload_fields(config, &file_name, title.as_deref(), author.as_deref())?;

    let staged = store.stage_upload(&user_id, file).await.map_err(|err| {
        error!(error = ?err, "failed to stage upload");
        err
    })?;

    let limits = ValidationLimits::from_config(config);
    match validate_upload(staged.clone(), limits).await {
        Ok(ValidationResult::Valid) => {}
        Ok(ValidationResult::Rejected(reason)) => {
            store.discard(&staged).await;
            return Err(UploadError::Rejected(reason));
        }
        Err(err) => {
            store.discard(&staged).await;
            return Err(err.into());
        }
    }

    let stored = match store.store(&staged, &user_id, &file_name).await {
        Ok(stored) => stored,
        Err(err) => {
            error!(error = ?err, staged = %staged.display(), "failed to store upload");
            store.discard(&staged).await;
            return Err(err.into());
        }
    };

    let book = Book::new(&user_id, &stored, title.as_deref(), author.as_deref());
    db.store_item(book.clone()).await.map_err(AppError::from)?;

    let job = match ExtractionJob::create_and_add_to_db(
        NewExtractionJob {
            book_id: book.id.clone(),
            user_id: user_id.clone(),
            file_path: stored.file.path.clone(),
            file_name: file_name.clone(),
            title_override: title,
            author_override: author,
        },
        db,
    )
    .await
    {
        Ok(job) => job,
        Err(err) => {
            if let Err(cleanup) = db.delete_item::<Book>(&book.id).await {
                warn!(book_id = %book.id, error = %cleanup, "could not roll back book record");
            }
            return Err(err.into());
        }
    };

    info!(
        book_id = %book.id,
        job_id = %job.id,
        sha256 = %stored.file.sha256,
        deduplicated = stored.deduplicated,
        "upload accepted"
    );

    Ok(UploadReceipt {
        job_id: job.id,
        book_id: book.id,
        file_name,
        stored_path: stored.file.path,
        sha256: stored.file.sha256,
        deduplicated: stored.deduplicated,
    })
}

/// Queues extraction again for a book. The latest job is reused when it has
/// finished or its worker lost the lease; a book without any job gets a
/// fresh one.
pub async fn reprocess_book(
    db: &SurrealDbClient,
    book_id: &str,
    user_id: &str,
) -> Result<ExtractionJob, AppError> {
    let book = Book::get_for_user(book_id, user_id, db).await?;

    let job = match ExtractionJob::latest_for_book(&book.id, db).await? {
        Some(job) if job.state.is_terminal() => job.requeue(db).await?,
        Some(job) if job.lease_expired(Utc::now()) => {
            warn!(job_id = %job.id, book_id = %book.id, "requeueing job with expired lease");
            job.expire_lease(Utc::now(), db).await?.requeue(db).await?
        }
        Some(job) => {
            return Err(AppError::Validation(format!(
                "Job {} is still {}",
                job.id,
                job.state.as_str()
            )))
        }
        None => {
            ExtractionJob::create_and_add_to_db(
                NewExtractionJob {
                    book_id: book.id.clone(),
                    user_id: book.user_id.clone(),
                    file_path: book.file_path.clone(),
                    file_name: book.file_name.clone(),
                    title_override: None,
                    author_override: None,
                },
                db,
            )
            .await?
        }
    };

    Book::set_status(&book.id, ProcessingStatus::Processing, db).await?;
    info!(book_id = %book.id, job_id = %job.id, "extraction requeued");
    Ok(job)
}

/// Deletes a book, its jobs, and the stored file once no other book of the
/// same user points at it.
pub async fn delete_book(
    db: &SurrealDbClient,
    store: &ContentStore,
    book_id: &str,
    user_id: &str,
) -> Result<Book, AppError> {
    let book = Book::delete_for_user(book_id, user_id, db).await?;
    ExtractionJob::delete_for_book(&book.id, db).await?;

    let remaining = Book::count_referencing_file(user_id, &book.file_path, db).await?;
    if remaining == 0 {
        if let Err(err) = store.remove(Path::new(&book.file_path)).await {
            warn!(book_id = %book.id, error = %err, "stored file could not be removed");
        }
    }

    info!(book_id = %book.id, shared_references = remaining, "book deleted");
    Ok(book)
}
