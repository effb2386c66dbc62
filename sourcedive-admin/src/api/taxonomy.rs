//! Expertise, industry and organization endpoints
//!
//! The three share handlers; each gets `/api/<table>` and `/api/<table>/:id`.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;
use sourcedive_common::db::taxonomy::{self, Taxonomy};
use sourcedive_common::db::NamedRef;

use crate::{ApiResult, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct NameSearch {
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewEntry {
    pub name: String,
}

async fn list_entries(
    state: AppState,
    taxonomy: Taxonomy,
    search: NameSearch,
) -> ApiResult<Json<Vec<NamedRef>>> {
    let entries = taxonomy::list(&state.db, taxonomy, search.q.as_deref()).await?;
    Ok(Json(entries))
}

async fn create_entry(
    state: AppState,
    taxonomy: Taxonomy,
    body: Result<Json<NewEntry>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<NamedRef>)> {
    let Json(entry) = body?;
    let created = taxonomy::create(&state.db, taxonomy, &entry.name).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn delete_entry(state: AppState, taxonomy: Taxonomy, id: i64) -> ApiResult<StatusCode> {
    taxonomy::delete(&state.db, taxonomy, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Routes for all three taxonomies
pub fn taxonomy_routes() -> Router<AppState> {
    let mut router = Router::new();

    for taxonomy in Taxonomy::ALL {
        let collection = format!("/api/{}", taxonomy.table());
        let item = format!("{}/:id", collection);

        router = router
            .route(
                &collection,
                get(
                    move |State(state): State<AppState>, Query(search): Query<NameSearch>| {
                        list_entries(state, taxonomy, search)
                    },
                )
                .post(
                    move |State(state): State<AppState>,
                          body: Result<Json<NewEntry>, JsonRejection>| {
                        create_entry(state, taxonomy, body)
                    },
                ),
            )
            .route(
                &item,
                delete(move |State(state): State<AppState>, Path(id): Path<i64>| {
                    delete_entry(state, taxonomy, id)
                }),
            );
    }

    router
}
