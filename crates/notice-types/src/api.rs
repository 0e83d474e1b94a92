use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    AdminId, DeliveryId, GroupId, GuardianId, ImportMode, PostId, Priority, RecipientId, Role,
    SchoolId, StudentId,
};

// -- JWT Claims --

/// Bearer token claims. Tokens are issued by the identity provider; the
/// noticeboard only validates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Admin, guardian or service principal id, depending on `role`.
    pub sub: i64,
    pub school_id: SchoolId,
    pub role: Role,
    pub exp: usize,
}

// -- Posts --

/// Inline image payload, base64 encoded.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageUpload {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePostRequest {
    pub title: String,
    pub body: String,
    /// Parsed server-side so an unknown value is a 400, not a decode failure.
    pub priority: String,
    #[serde(default)]
    pub student_ids: Vec<StudentId>,
    #[serde(default)]
    pub group_ids: Vec<GroupId>,
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePostRequest {
    pub title: String,
    pub body: String,
    pub priority: String,
    /// Replaces the current image when present.
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateTargetingRequest {
    #[serde(default)]
    pub student_ids: Vec<StudentId>,
    #[serde(default)]
    pub group_ids: Vec<GroupId>,
}

#[derive(Debug, Serialize)]
pub struct PostSummary {
    pub id: PostId,
    pub admin_id: AdminId,
    pub title: String,
    pub body: String,
    pub priority: Priority,
    pub image_url: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub targeted_students: u64,
    pub read_count: u64,
    pub unread_count: u64,
    pub read_percent: f64,
}

#[derive(Debug, Serialize)]
pub struct CreatePostResponse {
    pub post: PostSummary,
    pub recipients: usize,
    pub deliveries: usize,
}

#[derive(Debug, Serialize)]
pub struct ResyncResponse {
    pub recipients_added: usize,
    pub recipients_removed: usize,
    pub deliveries_added: usize,
    pub deliveries_removed: usize,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

// -- Recipients & statistics --

#[derive(Debug, Serialize)]
pub struct RecipientEntry {
    pub recipient_id: RecipientId,
    pub student_id: StudentId,
    pub student_number: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    /// `None` when the student was targeted directly.
    pub origin_group_id: Option<GroupId>,
    pub origin_group_name: Option<String>,
    pub guardians_read: u64,
    pub guardians_unread: u64,
}

#[derive(Debug, Serialize)]
pub struct GroupStats {
    /// `None` for the directly targeted students.
    pub group_id: Option<GroupId>,
    pub group_name: Option<String>,
    pub targeted_students: u64,
    pub read_students: u64,
    pub read_count: u64,
    pub unread_count: u64,
    pub read_percent: f64,
}

#[derive(Debug, Serialize)]
pub struct StudentStats {
    pub student_id: StudentId,
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub read_count: u64,
    pub unread_count: u64,
}

// -- Delivery --

#[derive(Debug, Serialize)]
pub struct RetryResponse {
    pub message: String,
    pub updated: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViewRequest {
    /// Restrict the view to one child; all of the guardian's children otherwise.
    pub student_id: Option<StudentId>,
}

#[derive(Debug, Serialize)]
pub struct ViewResponse {
    pub updated: usize,
    pub viewed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct InboxEntry {
    pub post_id: PostId,
    pub title: String,
    pub body: String,
    pub priority: Priority,
    pub image_url: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub student_ids: Vec<StudentId>,
    pub read: bool,
}

#[derive(Debug, Serialize)]
pub struct PendingDelivery {
    pub delivery_id: DeliveryId,
    pub post_id: PostId,
    pub student_id: StudentId,
    pub guardian_id: GuardianId,
    pub title: String,
    pub priority: Priority,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkNotifiedRequest {
    pub delivery_ids: Vec<DeliveryId>,
}

#[derive(Debug, Serialize)]
pub struct MarkNotifiedResponse {
    pub updated: usize,
}

// -- Directory --

#[derive(Debug, Serialize)]
pub struct DirectoryEventResponse {
    pub deliveries_added: usize,
}

// -- Bulk import --

/// One already-parsed line of an import sheet.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportRow {
    pub line: usize,
    pub title: String,
    pub description: String,
    pub priority: String,
    pub group_name: Option<String>,
    pub student_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportRequest {
    #[serde(default)]
    pub mode: ImportMode,
    pub rows: Vec<ImportRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub created_post_ids: Vec<PostId>,
    pub errors: Vec<RowError>,
}
