//! Database row types and engine inputs/outputs.
//! Distinct from notice-types API models to keep the DB layer independent.

use chrono::{DateTime, Utc};
use notice_types::models::{
    AdminId, DeliveryId, DeliveryState, GroupId, GuardianId, PostId, Priority, RecipientId,
    SchoolId, StudentId,
};

use crate::{NoticeError, Result};

#[derive(Debug)]
pub struct PostRow {
    pub id: PostId,
    pub school_id: SchoolId,
    pub admin_id: AdminId,
    pub title: String,
    pub body: String,
    pub priority: Priority,
    pub image_key: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

/// Content of a post as submitted by an admin.
#[derive(Debug, Clone)]
pub struct PostDraft {
    pub title: String,
    pub body: String,
    pub priority: Priority,
    pub image_key: Option<String>,
}

impl PostDraft {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(NoticeError::InvalidInput("title must not be empty".into()));
        }
        if self.title.chars().count() > 200 {
            return Err(NoticeError::InvalidInput("title longer than 200 characters".into()));
        }
        if self.body.trim().is_empty() {
            return Err(NoticeError::InvalidInput("body must not be empty".into()));
        }
        Ok(())
    }
}

/// Who a post is addressed to: students directly, plus groups (expanded to
/// their descendants and members).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Targeting {
    pub student_ids: Vec<StudentId>,
    pub group_ids: Vec<GroupId>,
}

impl Targeting {
    pub fn new(student_ids: Vec<StudentId>, group_ids: Vec<GroupId>) -> Self {
        Self {
            student_ids,
            group_ids,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(bad) = self.student_ids.iter().find(|id| **id <= 0) {
            return Err(NoticeError::InvalidInput(format!("invalid student id {}", bad)));
        }
        if let Some(bad) = self.group_ids.iter().find(|id| **id <= 0) {
            return Err(NoticeError::InvalidInput(format!("invalid group id {}", bad)));
        }
        Ok(())
    }
}

/// Identity of a recipient row within a post. A student reached through two
/// groups has two keys; a directly targeted student has `origin_group_id: None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecipientKey {
    pub student_id: StudentId,
    pub origin_group_id: Option<GroupId>,
}

impl RecipientKey {
    pub fn direct(student_id: StudentId) -> Self {
        Self {
            student_id,
            origin_group_id: None,
        }
    }

    pub fn via_group(student_id: StudentId, group_id: GroupId) -> Self {
        Self {
            student_id,
            origin_group_id: Some(group_id),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaterializeOutcome {
    pub recipients: usize,
    pub deliveries: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResyncOutcome {
    pub recipients_added: usize,
    pub recipients_removed: usize,
    pub deliveries_added: usize,
    pub deliveries_removed: usize,
}

impl ResyncOutcome {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug)]
pub struct DeliveryRow {
    pub id: DeliveryId,
    pub recipient_id: RecipientId,
    pub guardian_id: GuardianId,
    pub push_pending: bool,
    pub viewed_at: Option<DateTime<Utc>>,
}

impl DeliveryRow {
    pub fn state(&self) -> DeliveryState {
        DeliveryState::from_flags(self.push_pending, self.viewed_at.is_some())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReadCounts {
    pub read_count: u64,
    pub unread_count: u64,
}

/// Student-level read coverage of one post.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StudentCoverage {
    pub targeted_students: u64,
    pub read_students: u64,
}

impl StudentCoverage {
    pub fn read_percent(&self) -> f64 {
        read_percent(self.read_students, self.targeted_students)
    }
}

/// `round(100 * read / targeted, 2)`, and 0 when nobody is targeted.
pub fn read_percent(read: u64, targeted: u64) -> f64 {
    if targeted == 0 {
        return 0.0;
    }
    (10_000.0 * read as f64 / targeted as f64).round() / 100.0
}

/// A post with its read counts, as listed to admins.
#[derive(Debug)]
pub struct PostWithStats {
    pub post: PostRow,
    pub counts: ReadCounts,
    pub coverage: StudentCoverage,
}

#[derive(Debug)]
pub struct RecipientRow {
    pub id: RecipientId,
    pub student_id: StudentId,
    pub student_number: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub origin_group_id: Option<GroupId>,
    pub origin_group_name: Option<String>,
    pub guardians_read: u64,
    pub guardians_unread: u64,
}

#[derive(Debug, Default, Clone)]
pub struct RecipientFilter {
    pub email: Option<String>,
    pub student_number: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub const MAX_PER_PAGE: u32 = 100;

    /// 1-based page, `per_page` clamped to `1..=MAX_PER_PAGE`.
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }
}

#[derive(Debug)]
pub struct GroupStatsRow {
    pub group_id: Option<GroupId>,
    pub group_name: Option<String>,
    pub coverage: StudentCoverage,
    pub counts: ReadCounts,
}

#[derive(Debug)]
pub struct StudentStatsRow {
    pub student_id: StudentId,
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub counts: ReadCounts,
}

#[derive(Debug)]
pub struct InboxRow {
    pub post: PostRow,
    pub student_ids: Vec<StudentId>,
    pub read: bool,
}

#[derive(Debug)]
pub struct PendingDeliveryRow {
    pub id: DeliveryId,
    pub post_id: PostId,
    pub student_id: StudentId,
    pub guardian_id: GuardianId,
    pub title: String,
    pub priority: Priority,
}

/// Read a `priority` text column.
pub(crate) fn priority_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Priority> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_percent_rounds_to_two_places() {
        assert_eq!(read_percent(0, 0), 0.0);
        assert_eq!(read_percent(1, 3), 33.33);
        assert_eq!(read_percent(2, 3), 66.67);
        assert_eq!(read_percent(4, 4), 100.0);
    }

    #[test]
    fn targeting_rejects_non_positive_ids() {
        assert!(Targeting::new(vec![1, 2], vec![3]).validate().is_ok());
        assert!(Targeting::new(vec![0], vec![]).validate().is_err());
        assert!(Targeting::new(vec![], vec![-4]).validate().is_err());
    }

    #[test]
    fn page_request_clamps() {
        let p = PageRequest::new(0, 1000);
        assert_eq!(p.page, 1);
        assert_eq!(p.per_page, PageRequest::MAX_PER_PAGE);
        assert_eq!(PageRequest::new(3, 20).offset(), 40);
    }
}
