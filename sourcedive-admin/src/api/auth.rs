//! Bearer token authentication
//!
//! Protected routes expect `Authorization: Bearer <token>`. The token's
//! SHA-256 hash is looked up in `users`; the matching user becomes the
//! [`Viewer`] for the request.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use sourcedive_common::db::users;
use sourcedive_common::Viewer;
use tracing::{debug, warn};

use crate::{ApiError, AppState};

/// Extract the token from an `Authorization: Bearer` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

/// Authentication middleware
///
/// Returns 401 for a missing or unknown token and 403 for non-staff users.
/// On success the [`Viewer`] is stored in the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

    let user = users::authenticate_token(&state.db, &token)
        .await?
        .ok_or_else(|| {
            warn!("Rejected request to {} with unknown token", request.uri().path());
            ApiError::Unauthorized("Invalid API token".to_string())
        })?;

    if !user.is_staff {
        return Err(ApiError::Forbidden(format!(
            "User '{}' is not staff",
            user.username
        )));
    }

    debug!("Authenticated '{}' for {}", user.username, request.uri().path());
    request
        .extensions_mut()
        .insert(Viewer::new(user.id, user.username));

    Ok(next.run(request).await)
}
