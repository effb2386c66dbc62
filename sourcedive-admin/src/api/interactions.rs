//! Interaction endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use sourcedive_common::db::{
    interactions, InteractionDetail, InteractionInput, InteractionQuery, InteractionSummary,
};
use sourcedive_common::Viewer;

use crate::pagination::{calculate_pagination, Page, PageParams, PAGE_SIZE};
use crate::{ApiResult, AppState};

/// GET /api/interactions
pub async fn list_interactions(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Query(page): Query<PageParams>,
    Query(query): Query<InteractionQuery>,
) -> ApiResult<Json<Page<InteractionSummary>>> {
    let total = interactions::count_interactions(&state.db, &viewer, &query).await?;
    let pagination = calculate_pagination(total, page.page);
    let results = interactions::list_interactions(
        &state.db,
        &viewer,
        &query,
        PAGE_SIZE,
        pagination.offset,
    )
    .await?;

    Ok(Json(Page::new(total, pagination, results)))
}

/// POST /api/interactions
pub async fn create_interaction(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    body: Result<Json<InteractionInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<InteractionDetail>)> {
    let Json(input) = body?;
    let id = interactions::create_interaction(&state.db, &viewer, input).await?;
    let detail = interactions::get_interaction(&state.db, &viewer, id).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// GET /api/interactions/:id
pub async fn get_interaction(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<i64>,
) -> ApiResult<Json<InteractionDetail>> {
    Ok(Json(interactions::get_interaction(&state.db, &viewer, id).await?))
}

/// PUT /api/interactions/:id
pub async fn update_interaction(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<i64>,
    body: Result<Json<InteractionInput>, JsonRejection>,
) -> ApiResult<Json<InteractionDetail>> {
    let Json(input) = body?;
    interactions::update_interaction(&state.db, &viewer, id, input).await?;
    Ok(Json(interactions::get_interaction(&state.db, &viewer, id).await?))
}

/// DELETE /api/interactions/:id
pub async fn delete_interaction(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    interactions::delete_interaction(&state.db, &viewer, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
