use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use notice_db::models::Targeting;
use notice_types::api::{Claims, GroupStats, ResyncResponse, StudentStats, UpdateTargetingRequest};
use notice_types::models::{PostId, Role};

use crate::error::{db_call, status_for};
use crate::middleware::require_role;
use crate::state::AppState;

/// PUT /posts/{id}/targeting: diff the recipient set against the new targeting.
pub async fn update_targeting(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateTargetingRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    require_role(&claims, Role::Admin)?;
    let targeting = Targeting::new(req.student_ids, req.group_ids);
    targeting.validate().map_err(status_for)?;
    let school = claims.school_id;

    let outcome = db_call(&state, move |db| db.resync_post(school, post_id, &targeting)).await?;
    Ok(Json(ResyncResponse {
        recipients_added: outcome.recipients_added,
        recipients_removed: outcome.recipients_removed,
        deliveries_added: outcome.deliveries_added,
        deliveries_removed: outcome.deliveries_removed,
    }))
}

/// GET /posts/{id}/stats/groups
pub async fn group_stats(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    require_role(&claims, Role::Admin)?;
    let school = claims.school_id;

    let rows = db_call(&state, move |db| db.group_stats(school, post_id)).await?;
    let stats: Vec<GroupStats> = rows
        .into_iter()
        .map(|r| GroupStats {
            group_id: r.group_id,
            group_name: r.group_name,
            targeted_students: r.coverage.targeted_students,
            read_students: r.coverage.read_students,
            read_count: r.counts.read_count,
            unread_count: r.counts.unread_count,
            read_percent: r.coverage.read_percent(),
        })
        .collect();
    Ok(Json(stats))
}

/// GET /posts/{id}/stats/students
pub async fn student_stats(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    require_role(&claims, Role::Admin)?;
    let school = claims.school_id;

    let rows = db_call(&state, move |db| db.student_stats(school, post_id)).await?;
    let stats: Vec<StudentStats> = rows
        .into_iter()
        .map(|r| StudentStats {
            student_id: r.student_id,
            student_number: r.student_number,
            first_name: r.first_name,
            last_name: r.last_name,
            read_count: r.counts.read_count,
            unread_count: r.counts.unread_count,
        })
        .collect();
    Ok(Json(stats))
}
