use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use notice_types::api::{Claims, RetryResponse};
use notice_types::models::{GroupId, GuardianId, PostId, Role, StudentId};

use crate::error::db_call;
use crate::middleware::require_role;
use crate::state::AppState;

fn retried(what: &str, id: i64, updated: usize) -> Json<RetryResponse> {
    info!("Retry queued for {} {}: {} deliveries", what, id, updated);
    Json(RetryResponse {
        message: format!("{} deliveries queued for {} {}", updated, what, id),
        updated,
    })
}

/// POST /posts/{id}/retry/groups/{group_id}
pub async fn retry_group(
    State(state): State<AppState>,
    Path((post_id, group_id)): Path<(PostId, GroupId)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    require_role(&claims, Role::Admin)?;
    let school = claims.school_id;
    let n = db_call(&state, move |db| db.retry_group(school, post_id, group_id)).await?;
    Ok(retried("group", group_id, n))
}

/// POST /posts/{id}/retry/students/{student_id}
pub async fn retry_student(
    State(state): State<AppState>,
    Path((post_id, student_id)): Path<(PostId, StudentId)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    require_role(&claims, Role::Admin)?;
    let school = claims.school_id;
    let n = db_call(&state, move |db| db.retry_student(school, post_id, student_id)).await?;
    Ok(retried("student", student_id, n))
}

/// POST /posts/{id}/retry/guardians/{guardian_id}
pub async fn retry_guardian(
    State(state): State<AppState>,
    Path((post_id, guardian_id)): Path<(PostId, GuardianId)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    require_role(&claims, Role::Admin)?;
    let school = claims.school_id;
    let n = db_call(&state, move |db| db.retry_guardian(school, post_id, guardian_id)).await?;
    Ok(retried("guardian", guardian_id, n))
}
