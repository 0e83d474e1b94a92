use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use notice_types::api::{Claims, ImportRequest};
use notice_types::models::{ImportMode, Role};

use crate::error::db_call;
use crate::middleware::require_role;
use crate::state::AppState;

/// POST /posts/import
///
/// 200 with the report when posts were created (lenient mode may still list
/// row errors); 422 with the report when strict mode rejected the batch.
pub async fn import_posts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ImportRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    require_role(&claims, Role::Admin)?;
    let (school, admin) = (claims.school_id, claims.sub);
    let mode = req.mode;

    let report = db_call(&state, move |db| db.import_posts(school, admin, &req.rows, mode)).await?;
    let status = if mode == ImportMode::Strict && !report.errors.is_empty() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::OK
    };
    Ok((status, Json(report)))
}
