use std::path::Path;

use axum::{
    extract::{Path as UrlPath, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use chrono::{DateTime, Utc};
use common::{
    error::AppError,
    storage::types::{
        book::{Book, ProcessingStatus},
        extracted_metadata::ExtractedMetadata,
        stored_file::FileDescription,
    },
};
use ingestion_pipeline::intake::{self, UploadRequest};
use serde::Serialize;
use serde_json::json;
use tempfile::NamedTempFile;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError, middleware_api_auth::UserId};

#[derive(Debug, TryFromMultipart)]
pub struct UploadParams {
    #[form_data(limit = "unlimited")]
    pub file: FieldData<NamedTempFile>,
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Book record as returned to its owner.
#[derive(Debug, Serialize)]
pub struct BookView {
    pub id: String,
    pub title: String,
    pub author: String,
    pub file_name: String,
    pub file_path: String,
    pub sha256: String,
    pub file_size: u64,
    pub total_pages: u32,
    pub status: ProcessingStatus,
    pub metadata: Option<ExtractedMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Book> for BookView {
    fn from(book: Book) -> Self {
        Self {
            id: book.id,
            title: book.title,
            author: book.author,
            file_name: book.file_name,
            file_path: book.file_path,
            sha256: book.sha256,
            file_size: book.file_size,
            total_pages: book.total_pages,
            status: book.status,
            metadata: book.metadata,
            created_at: book.created_at,
            updated_at: book.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FileInfoView {
    pub book_id: String,
    pub file_name: String,
    pub file: FileDescription,
    pub metadata: Option<ExtractedMetadata>,
}

pub async fn upload_book(
    State(state): State<ApiState>,
    Extension(UserId(user_id)): Extension<UserId>,
    TypedMultipart(input): TypedMultipart<UploadParams>,
) -> Result<impl IntoResponse, ApiError> {
    let file_name = input.file.metadata.file_name.clone().unwrap_or_default();
    info!(
        user_id = %user_id,
        %file_name,
        has_title = input.title.is_some(),
        has_author = input.author.is_some(),
        "Received book upload"
    );

    let receipt = intake::accept_upload(
        &state.db,
        &state.store,
        &state.config,
        UploadRequest {
            user_id,
            file: input.file.contents,
            file_name,
            title: input.title,
            author: input.author,
        },
    )
    .await?;

    let status_url = format!("/api/v1/jobs/{}", receipt.job_id);
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "job_id": receipt.job_id,
            "book_id": receipt.book_id,
            "file_name": receipt.file_name,
            "stored_path": receipt.stored_path,
            "sha256": receipt.sha256,
            "deduplicated": receipt.deduplicated,
            "status": ProcessingStatus::Processing.as_str(),
            "status_url": status_url,
        })),
    ))
}

pub async fn get_book(
    State(state): State<ApiState>,
    Extension(UserId(user_id)): Extension<UserId>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let book = Book::get_for_user(&id, &user_id, &state.db).await?;

    Ok(Json(BookView::from(book)))
}

pub async fn delete_book(
    State(state): State<ApiState>,
    Extension(UserId(user_id)): Extension<UserId>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    intake::delete_book(&state.db, &state.store, &id, &user_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn file_info(
    State(state): State<ApiState>,
    Extension(UserId(user_id)): Extension<UserId>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let book = Book::get_for_user(&id, &user_id, &state.db).await?;
    let file = state
        .store
        .describe(Path::new(&book.file_path))
        .await
        .map_err(AppError::from)?;

    Ok(Json(FileInfoView {
        book_id: book.id,
        file_name: book.file_name,
        file,
        metadata: book.metadata,
    }))
}

pub async fn reprocess_book(
    State(state): State<ApiState>,
    Extension(UserId(user_id)): Extension<UserId>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = intake::reprocess_book(&state.db, &id, &user_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "job_id": job.id,
            "book_id": job.book_id,
            "status": job.state.status_label(),
            "status_url": format!("/api/v1/jobs/{}", job.id),
        })),
    ))
}
