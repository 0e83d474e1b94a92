pub mod delivery;
pub mod directory;
pub mod error;
pub mod guardian;
pub mod import;
pub mod middleware;
pub mod notifications;
pub mod posts;
pub mod query;
pub mod state;
pub mod storage;
pub mod targeting;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::require_auth;
use crate::state::AppState;

/// Room for JSON around a base64 image.
const BODY_OVERHEAD: usize = 256 * 1024;

/// Every route; all but `/health` sit behind the JWT middleware.
pub fn router(state: AppState) -> Router {
    // base64 inflates by 4/3
    let body_limit = state.max_image_bytes / 3 * 4 + BODY_OVERHEAD;

    let protected = Router::new()
        .route("/posts", post(posts::create_post).get(posts::list_posts))
        .route("/posts/import", post(import::import_posts))
        .route(
            "/posts/{id}",
            get(posts::get_post).put(posts::update_post).delete(posts::delete_post),
        )
        .route("/posts/{id}/targeting", put(targeting::update_targeting))
        .route("/posts/{id}/recipients", get(posts::list_recipients))
        .route("/posts/{id}/stats/groups", get(targeting::group_stats))
        .route("/posts/{id}/stats/students", get(targeting::student_stats))
        .route("/posts/{id}/image", get(posts::get_post_image))
        .route("/posts/{id}/retry/groups/{group_id}", post(delivery::retry_group))
        .route("/posts/{id}/retry/students/{student_id}", post(delivery::retry_student))
        .route("/posts/{id}/retry/guardians/{guardian_id}", post(delivery::retry_guardian))
        .route("/guardian/posts", get(guardian::inbox))
        .route("/guardian/posts/{id}/view", post(guardian::view_post))
        .route("/notifications/pending", get(notifications::pending))
        .route("/notifications/sent", post(notifications::mark_sent))
        .route("/directory/events", post(directory::apply_event))
        .layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn health() -> &'static str {
    "ok"
}
