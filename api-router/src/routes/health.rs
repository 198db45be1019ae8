use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tokio::fs;

use crate::api_state::ApiState;

/// Liveness probe: 200 whenever the process can answer.
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

/// Readiness probe: 200 when the database answers and the storage root is a
/// directory, else 503.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    let db = state.db.ping().await.err();
    let storage_ready = fs::metadata(state.store.root())
        .await
        .is_ok_and(|metadata| metadata.is_dir());

    if db.is_none() && storage_ready {
        return (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "checks": { "db": "ok", "storage": "ok" }
            })),
        );
    }

    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "status": "error",
            "checks": {
                "db": if db.is_none() { "ok" } else { "fail" },
                "storage": if storage_ready { "ok" } else { "fail" },
            },
            "reason": db.map(|e| e.to_string()),
        })),
    )
}
