//! Source (people) endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use sourcedive_common::db::{
    people, FilterOptions, FormLayout, PersonDetail, PersonInput, PersonQuery, PersonSummary,
};
use sourcedive_common::Viewer;

use crate::pagination::{calculate_pagination, Page, PageParams, PAGE_SIZE};
use crate::{ApiResult, AppState};

/// GET /api/people
///
/// Visible sources, most recently updated first, 100 per page.
pub async fn list_people(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Query(page): Query<PageParams>,
    Query(query): Query<PersonQuery>,
) -> ApiResult<Json<Page<PersonSummary>>> {
    let total = people::count_people(&state.db, &viewer, &query).await?;
    let pagination = calculate_pagination(total, page.page);
    let results =
        people::list_people(&state.db, &viewer, &query, PAGE_SIZE, pagination.offset).await?;

    Ok(Json(Page::new(total, pagination, results)))
}

/// GET /api/people/filters
pub async fn people_filters(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
) -> ApiResult<Json<FilterOptions>> {
    Ok(Json(people::filter_options(&state.db, &viewer).await?))
}

/// POST /api/people
pub async fn create_person(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    body: Result<Json<PersonInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PersonDetail>)> {
    let Json(input) = body?;
    let id = people::create_person(&state.db, &viewer, input).await?;
    let detail = people::get_person(&state.db, &viewer, id).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// GET /api/people/:id
pub async fn get_person(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<i64>,
) -> ApiResult<Json<PersonDetail>> {
    Ok(Json(people::get_person(&state.db, &viewer, id).await?))
}

/// GET /api/people/:id/layout
pub async fn person_layout(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<i64>,
) -> ApiResult<Json<FormLayout>> {
    Ok(Json(people::person_layout(&state.db, &viewer, id).await?))
}

/// PUT /api/people/:id
pub async fn update_person(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<i64>,
    body: Result<Json<PersonInput>, JsonRejection>,
) -> ApiResult<Json<PersonDetail>> {
    let Json(input) = body?;
    people::update_person(&state.db, &viewer, id, input).await?;
    Ok(Json(people::get_person(&state.db, &viewer, id).await?))
}

/// DELETE /api/people/:id
pub async fn delete_person(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    people::delete_person(&state.db, &viewer, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
