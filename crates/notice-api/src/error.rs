use axum::http::StatusCode;
use notice_db::{Database, NoticeError};
use tracing::{debug, error};

use crate::state::AppState;

/// Map an engine error to the response status. Cross-school lookups are
/// already reported as `NotFound` by the engine.
pub fn status_for(err: NoticeError) -> StatusCode {
    match err {
        NoticeError::NotFound(what) => {
            debug!("{} not found", what);
            StatusCode::NOT_FOUND
        }
        NoticeError::InvalidInput(msg) => {
            debug!("Rejected input: {}", msg);
            StatusCode::BAD_REQUEST
        }
        err @ (NoticeError::Storage(_) | NoticeError::LockPoisoned) => {
            error!("Storage error: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Run blocking database work off the async runtime.
pub async fn db_call<F, T>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> notice_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(status_for)
}
