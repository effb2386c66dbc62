//! Dive endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use sourcedive_common::db::{dives, Dive};

use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct NewDive {
    pub name: String,
}

/// GET /api/dives
pub async fn list_dives(State(state): State<AppState>) -> ApiResult<Json<Vec<Dive>>> {
    Ok(Json(dives::list_dives(&state.db).await?))
}

/// POST /api/dives
pub async fn create_dive(
    State(state): State<AppState>,
    body: Result<Json<NewDive>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Dive>)> {
    let Json(dive) = body?;
    let created = dives::create_dive(&state.db, &dive.name).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// POST /api/dives/:id/members/:user_id
pub async fn add_dive_member(
    State(state): State<AppState>,
    Path((dive_id, user_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Dive>> {
    dives::add_member(&state.db, dive_id, user_id).await?;
    Ok(Json(dives::get_dive(&state.db, dive_id).await?))
}

/// DELETE /api/dives/:id/members/:user_id
pub async fn remove_dive_member(
    State(state): State<AppState>,
    Path((dive_id, user_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Dive>> {
    dives::remove_member(&state.db, dive_id, user_id).await?;
    Ok(Json(dives::get_dive(&state.db, dive_id).await?))
}
