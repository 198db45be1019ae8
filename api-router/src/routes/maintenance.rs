use axum::{extract::State, response::IntoResponse, Extension, Json};
use ingestion_pipeline::maintenance::run_user_maintenance;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError, middleware_api_auth::UserId};

/// Clears the caller's stale staging files and old finished jobs now
/// instead of waiting for the worker's sweep.
pub async fn cleanup(
    State(state): State<ApiState>,
    Extension(UserId(user_id)): Extension<UserId>,
) -> Result<impl IntoResponse, ApiError> {
    let report = run_user_maintenance(
        &state.db,
        &state.store,
        &user_id,
        state.config.temp_retention(),
        state.config.job_retention(),
    )
    .await?;
    info!(
        %user_id,
        temp_files_removed = report.temp_files_removed,
        jobs_removed = report.jobs_removed,
        "manual maintenance sweep"
    );

    Ok(Json(report))
}
