use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use notice_types::api::{Claims, InboxEntry, ViewRequest, ViewResponse};
use notice_types::models::{PostId, Role};

use crate::error::db_call;
use crate::middleware::require_role;
use crate::posts::image_url;
use crate::query::{PageQuery, page_of};
use crate::state::AppState;

/// GET /guardian/posts: the caller's inbox, newest first.
pub async fn inbox(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    require_role(&claims, Role::Guardian)?;
    let page = query.request();
    let (school, guardian) = (claims.school_id, claims.sub);

    let (rows, total) = db_call(&state, move |db| db.guardian_inbox(school, guardian, page)).await?;
    let items: Vec<InboxEntry> = rows
        .into_iter()
        .map(|r| InboxEntry {
            post_id: r.post.id,
            image_url: image_url(r.post.id, r.post.image_key.as_deref()),
            title: r.post.title,
            body: r.post.body,
            priority: r.post.priority,
            sent_at: r.post.sent_at,
            edited_at: r.post.edited_at,
            student_ids: r.student_ids,
            read: r.read,
        })
        .collect();
    Ok(Json(page_of(items, page, total)))
}

/// POST /guardian/posts/{id}/view
pub async fn view_post(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ViewRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    require_role(&claims, Role::Guardian)?;
    let (school, guardian) = (claims.school_id, claims.sub);

    let (updated, viewed_at) =
        db_call(&state, move |db| db.record_view(school, post_id, guardian, req.student_id)).await?;
    Ok(Json(ViewResponse { updated, viewed_at }))
}
