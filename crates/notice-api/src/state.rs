use std::sync::Arc;

use notice_db::Database;

use crate::storage::ImageStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub images: ImageStore,
    pub jwt_secret: String,
    /// Largest decoded image accepted on create or edit.
    pub max_image_bytes: usize,
}
