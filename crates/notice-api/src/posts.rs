use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::{debug, error, warn};

use notice_db::models::{PostDraft, PostWithStats, RecipientRow, Targeting};
use notice_types::api::{
    Claims, CreatePostRequest, CreatePostResponse, ImageUpload, PostSummary, RecipientEntry,
    UpdatePostRequest,
};
use notice_types::models::{PostId, Role};

use crate::error::{db_call, status_for};
use crate::middleware::require_role;
use crate::query::{PageQuery, RecipientQuery, page_of};
use crate::state::AppState;
use crate::storage::{ImageStore, mime_for_key};

pub(crate) fn image_url(post_id: PostId, image_key: Option<&str>) -> Option<String> {
    image_key.map(|_| format!("/posts/{}/image", post_id))
}

pub(crate) fn summary(p: PostWithStats) -> PostSummary {
    PostSummary {
        id: p.post.id,
        admin_id: p.post.admin_id,
        image_url: image_url(p.post.id, p.post.image_key.as_deref()),
        title: p.post.title,
        body: p.post.body,
        priority: p.post.priority,
        sent_at: p.post.sent_at,
        edited_at: p.post.edited_at,
        targeted_students: p.coverage.targeted_students,
        read_count: p.counts.read_count,
        unread_count: p.counts.unread_count,
        read_percent: p.coverage.read_percent(),
    }
}

fn draft_from(title: String, body: String, priority: &str) -> Result<PostDraft, StatusCode> {
    let priority = priority.parse().map_err(|e: String| {
        debug!("Rejected priority: {}", e);
        StatusCode::BAD_REQUEST
    })?;
    let draft = PostDraft {
        title,
        body,
        priority,
        image_key: None,
    };
    draft.validate().map_err(status_for)?;
    Ok(draft)
}

/// Decode, check and store an inline image. Returns the new key.
async fn store_image(
    state: &AppState,
    image: Option<&ImageUpload>,
) -> Result<Option<String>, StatusCode> {
    let Some(image) = image else {
        return Ok(None);
    };

    let data = B64.decode(image.data.trim()).map_err(|_| StatusCode::BAD_REQUEST)?;
    if data.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if data.len() > state.max_image_bytes {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }
    let key = ImageStore::key_for(&data, &image.mime_type)
        .ok_or(StatusCode::UNSUPPORTED_MEDIA_TYPE)?;

    state
        .images
        .upload_file(&data, &image.mime_type, &key)
        .await
        .map_err(|e| {
            error!("Failed to store image {}: {}", key, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Some(key))
}

async fn discard_image(state: &AppState, key: &str) {
    if let Err(e) = state.images.delete_file(key).await {
        warn!("Failed to delete image {}: {}", key, e);
    }
}

/// POST /posts
pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    require_role(&claims, Role::Admin)?;
    let mut draft = draft_from(req.title, req.body, &req.priority)?;
    let targeting = Targeting::new(req.student_ids, req.group_ids);
    targeting.validate().map_err(status_for)?;

    draft.image_key = store_image(&state, req.image.as_ref()).await?;
    let uploaded = draft.image_key.clone();

    let (school, admin) = (claims.school_id, claims.sub);
    let created =
        db_call(&state, move |db| db.create_post(school, admin, &draft, &targeting)).await;
    let (post, outcome) = match created {
        Ok(v) => v,
        Err(status) => {
            if let Some(key) = uploaded {
                discard_image(&state, &key).await;
            }
            return Err(status);
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(CreatePostResponse {
            post: summary(post),
            recipients: outcome.recipients,
            deliveries: outcome.deliveries,
        }),
    ))
}

/// GET /posts
pub async fn list_posts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    require_role(&claims, Role::Admin)?;
    let page = query.request();
    let school = claims.school_id;

    let (rows, total) = db_call(&state, move |db| db.list_posts(school, page)).await?;
    let items = rows.into_iter().map(summary).collect();
    Ok(Json(page_of(items, page, total)))
}

/// GET /posts/{id}
pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    require_role(&claims, Role::Admin)?;
    let school = claims.school_id;
    let post = db_call(&state, move |db| db.get_post(school, post_id)).await?;
    Ok(Json(summary(post)))
}

/// PUT /posts/{id}: content only; targeting has its own route.
pub async fn update_post(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdatePostRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    require_role(&claims, Role::Admin)?;
    let mut draft = draft_from(req.title, req.body, &req.priority)?;

    draft.image_key = store_image(&state, req.image.as_ref()).await?;
    let uploaded = draft.image_key.clone();

    let school = claims.school_id;
    let updated = db_call(&state, move |db| db.update_post_content(school, post_id, &draft)).await;
    let (post, replaced) = match updated {
        Ok(v) => v,
        Err(status) => {
            if let Some(key) = uploaded {
                discard_image(&state, &key).await;
            }
            return Err(status);
        }
    };
    if let Some(old) = replaced {
        discard_image(&state, &old).await;
    }

    Ok(Json(summary(post)))
}

/// DELETE /posts/{id}
pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    require_role(&claims, Role::Admin)?;
    let school = claims.school_id;

    let image_key = db_call(&state, move |db| db.delete_post(school, post_id)).await?;
    if let Some(key) = image_key {
        discard_image(&state, &key).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /posts/{id}/image: any principal of the post's school.
pub async fn get_post_image(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let school = claims.school_id;
    let key = db_call(&state, move |db| db.get_post_image_key(school, post_id))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    let bytes = state.images.read_file(&key).await.map_err(|e| {
        warn!("Image {} of post {} unreadable: {}", key, post_id, e);
        StatusCode::NOT_FOUND
    })?;

    Ok(([(header::CONTENT_TYPE, mime_for_key(&key))], bytes))
}

/// GET /posts/{id}/recipients
pub async fn list_recipients(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<RecipientQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    require_role(&claims, Role::Admin)?;
    let page = query.request();
    let filter = query.filter();
    let school = claims.school_id;

    let (rows, total) =
        db_call(&state, move |db| db.list_recipients(school, post_id, &filter, page)).await?;
    let items = rows.into_iter().map(recipient_entry).collect();
    Ok(Json(page_of(items, page, total)))
}

fn recipient_entry(r: RecipientRow) -> RecipientEntry {
    RecipientEntry {
        recipient_id: r.id,
        student_id: r.student_id,
        student_number: r.student_number,
        email: r.email,
        first_name: r.first_name,
        last_name: r.last_name,
        origin_group_id: r.origin_group_id,
        origin_group_name: r.origin_group_name,
        guardians_read: r.guardians_read,
        guardians_unread: r.guardians_unread,
    }
}
