//! User endpoints

use axum::{extract::State, Extension, Json};
use serde::Serialize;
use sourcedive_common::db::{users, NamedRef, User};
use sourcedive_common::Viewer;

use crate::{ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct CurrentUser {
    #[serde(flatten)]
    pub user: User,
    pub dives: Vec<NamedRef>,
}

/// GET /api/me
pub async fn current_user(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
) -> ApiResult<Json<CurrentUser>> {
    let user = users::get_user(&state.db, viewer.user_id).await?;
    let dives = sourcedive_common::db::dives::list_dives(&state.db)
        .await?
        .into_iter()
        .filter(|d| d.members.iter().any(|m| m.id == viewer.user_id))
        .map(|d| NamedRef { id: d.id, name: d.name })
        .collect();
    Ok(Json(CurrentUser { user, dives }))
}

/// GET /api/users
///
/// Usernames for the interviewer picker.
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<NamedRef>>> {
    let users = users::list_users(&state.db)
        .await?
        .into_iter()
        .map(|u| NamedRef {
            id: u.id,
            name: u.username,
        })
        .collect();
    Ok(Json(users))
}
