//! Hand-off to the push worker: it polls for owed notifications and reports
//! back which ones went out.

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use notice_types::api::{Claims, MarkNotifiedRequest, MarkNotifiedResponse, PendingDelivery};
use notice_types::models::Role;

use crate::error::db_call;
use crate::middleware::require_role;
use crate::state::AppState;

const MAX_BATCH: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    100
}

/// GET /notifications/pending
pub async fn pending(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PendingQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    require_role(&claims, Role::Service)?;
    let limit = query.limit.clamp(1, MAX_BATCH);
    let school = claims.school_id;

    let rows = db_call(&state, move |db| db.pending_deliveries(school, limit)).await?;
    let items: Vec<PendingDelivery> = rows
        .into_iter()
        .map(|r| PendingDelivery {
            delivery_id: r.id,
            post_id: r.post_id,
            student_id: r.student_id,
            guardian_id: r.guardian_id,
            title: r.title,
            priority: r.priority,
        })
        .collect();
    Ok(Json(items))
}

/// POST /notifications/sent
pub async fn mark_sent(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkNotifiedRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    require_role(&claims, Role::Service)?;
    let school = claims.school_id;

    let updated = db_call(&state, move |db| db.mark_notified(school, &req.delivery_ids)).await?;
    Ok(Json(MarkNotifiedResponse { updated }))
}
