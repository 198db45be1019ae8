use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use common::{
    error::AppError,
    storage::types::{book::Book, extraction_job::ExtractionJob},
};
use serde::Serialize;

use crate::{api_state::ApiState, error::ApiError, middleware_api_auth::UserId};

#[derive(Debug, Serialize)]
pub struct JobStatusView {
    pub job_id: String,
    pub book_id: String,
    pub status: &'static str,
    pub state: &'static str,
    pub progress: u8,
    pub errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub async fn get_job(
    State(state): State<ApiState>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = ExtractionJob::get_for_user(&job_id, &user_id, &state.db).await?;

    let mut errors: Vec<String> = job.error_message.iter().cloned().collect();
    let book = state
        .db
        .get_item::<Book>(&job.book_id)
        .await
        .map_err(AppError::from)?;
    if let Some(metadata) = book.and_then(|book| book.metadata) {
        errors.extend(metadata.extraction_errors);
    }

    Ok(Json(JobStatusView {
        job_id: job.id,
        book_id: job.book_id,
        status: job.state.status_label(),
        state: job.state.as_str(),
        progress: job.progress,
        errors,
        created_at: job.created_at,
        started_at: job.started_at,
        completed_at: job.completed_at,
    }))
}
