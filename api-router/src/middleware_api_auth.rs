use axum::{extract::Request, middleware::Next, response::Response};

use common::storage::store::validate_namespace;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "X-User-Id";

/// Caller identity as asserted by the upstream auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

pub async fn api_auth(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let user_id = extract_user_id(&request)
        .ok_or_else(|| ApiError::Unauthorized("You have to be authenticated".to_string()))?;

    if validate_namespace(&user_id).is_err() {
        return Err(ApiError::Unauthorized("Invalid user identity".to_string()));
    }

    request.extensions_mut().insert(UserId(user_id));

    Ok(next.run(request).await)
}

fn extract_user_id(request: &Request) -> Option<String> {
    request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}
