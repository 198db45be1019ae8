use std::path::Path;

use axum::{
    extract::{Path as UrlPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use common::storage::types::book::Book;
use ingestion_pipeline::extraction::{extract_page_window, PageWindowError};
use serde::Deserialize;
use tracing::warn;

use crate::{api_state::ApiState, error::ApiError, middleware_api_auth::UserId};

pub const MAX_CONTEXT_LINES: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub context_lines: Option<usize>,
}

pub async fn get_page(
    State(state): State<ApiState>,
    Extension(UserId(user_id)): Extension<UserId>,
    UrlPath((id, page)): UrlPath<(String, u32)>,
    Query(query): Query<PageQuery>,
) -> Result<Response, ApiError> {
    let book = Book::get_for_user(&id, &user_id, &state.db).await?;
    let context_lines = query
        .context_lines
        .unwrap_or(state.config.page_context_lines)
        .min(MAX_CONTEXT_LINES);

    match extract_page_window(Path::new(&book.file_path), page, context_lines).await {
        Ok(window) => Ok(Json(window).into_response()),
        Err(err) => {
            let status = match err {
                PageWindowError::InvalidPage { .. } => StatusCode::BAD_REQUEST,
                PageWindowError::Extraction(_) => {
                    warn!(book_id = %book.id, page, error = %err, "page text extraction failed");
                    StatusCode::UNPROCESSABLE_ENTITY
                }
            };
            Ok((status, Json(err.to_payload())).into_response())
        }
    }
}
