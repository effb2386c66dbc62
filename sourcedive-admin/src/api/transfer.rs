//! CSV export and import endpoints

use axum::{
    body::Bytes,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use sourcedive_common::transfer::{self, ImportSummary};
use sourcedive_common::Viewer;
use tracing::info;

use crate::{ApiResult, AppState};

/// GET /api/export.csv
///
/// Sources the viewer created or may export through a dive.
pub async fn export_csv(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
) -> ApiResult<Response> {
    let mut buffer = Vec::new();
    transfer::export_sources(&state.db, &viewer, &mut buffer).await?;

    let filename = format!(
        "attachment; filename=\"sources-{}.csv\"",
        chrono::Utc::now().format("%Y-%m-%d")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        buffer,
    )
        .into_response())
}

/// POST /api/import
///
/// Body is the CSV file. Rows without `created_by` are attributed to the
/// viewer.
pub async fn import_csv(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    body: Bytes,
) -> ApiResult<Json<ImportSummary>> {
    info!(
        "User '{}' started an import of {} bytes",
        viewer.username,
        body.len()
    );
    let summary = transfer::import_sources(&state.db, body.as_ref(), Some(viewer.user_id)).await?;
    Ok(Json(summary))
}
