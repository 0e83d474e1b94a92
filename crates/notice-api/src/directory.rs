use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use notice_types::api::{Claims, DirectoryEventResponse};
use notice_types::events::DirectoryEvent;
use notice_types::models::Role;

use crate::error::db_call;
use crate::middleware::require_role;
use crate::state::AppState;

/// POST /directory/events: applied synchronously, replays are harmless.
pub async fn apply_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(event): Json<DirectoryEvent>,
) -> Result<impl IntoResponse, StatusCode> {
    require_role(&claims, Role::Service)?;
    let school = claims.school_id;

    let deliveries_added =
        db_call(&state, move |db| db.apply_directory_event(school, &event)).await?;
    Ok(Json(DirectoryEventResponse { deliveries_added }))
}
