//! sourcedive-admin library - admin API and UI for the SourceDive contact manager

use axum::extract::DefaultBodyLimit;
use axum::Router;
use sourcedive_common::config::AppConfig;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod pagination;

pub use error::{ApiError, ApiResult};

/// Largest accepted request body (CSV imports included)
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Resolved configuration
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: AppConfig) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }
}

/// Build application router
///
/// `/health`, `/api/buildinfo` and the UI assets are public; everything
/// else under `/api` requires a bearer token.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    // Protected routes (require authentication)
    let protected = Router::new()
        .route("/api/me", get(api::current_user))
        .route("/api/users", get(api::list_users))
        .route("/api/people", get(api::list_people).post(api::create_person))
        .route("/api/people/filters", get(api::people_filters))
        .route(
            "/api/people/:id",
            get(api::get_person)
                .put(api::update_person)
                .delete(api::delete_person),
        )
        .route("/api/people/:id/layout", get(api::person_layout))
        .route(
            "/api/interactions",
            get(api::list_interactions).post(api::create_interaction),
        )
        .route(
            "/api/interactions/:id",
            get(api::get_interaction)
                .put(api::update_interaction)
                .delete(api::delete_interaction),
        )
        .route("/api/dives", get(api::list_dives).post(api::create_dive))
        .route(
            "/api/dives/:id/members/:user_id",
            post(api::add_dive_member).delete(api::remove_dive_member),
        )
        .route("/api/export.csv", get(api::export_csv))
        .route("/api/import", post(api::import_csv))
        .merge(api::taxonomy_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    // Public routes (no authentication)
    let public = Router::new()
        .route("/", get(api::serve_index))
        .route("/static/app.js", get(api::serve_app_js))
        .route("/api/buildinfo", get(api::get_build_info))
        .merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
