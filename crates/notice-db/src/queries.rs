use chrono::{DateTime, Utc};
use notice_types::api::{ImportReport, ImportRow};
use notice_types::events::DirectoryEvent;
use notice_types::models::{
    AdminId, DeliveryId, GroupId, GuardianId, ImportMode, PostId, SchoolId, StudentId,
};
use rusqlite::Connection;

use crate::models::{
    GroupStatsRow, InboxRow, MaterializeOutcome, PageRequest, PendingDeliveryRow, PostDraft,
    PostRow, PostWithStats, RecipientFilter, RecipientRow, ResyncOutcome, StudentStatsRow,
    Targeting,
};
use crate::{Database, Result, delivery, directory, import, posts, recipients, resync, stats};

impl Database {
    // -- Posts --

    pub fn create_post(
        &self,
        school_id: SchoolId,
        admin_id: AdminId,
        draft: &PostDraft,
        targeting: &Targeting,
    ) -> Result<(PostWithStats, MaterializeOutcome)> {
        self.with_tx(|conn| {
            let (post_id, outcome) =
                posts::create_post(conn, school_id, admin_id, draft, targeting, Utc::now())?;
            Ok((query_post_with_stats(conn, school_id, post_id)?, outcome))
        })
    }

    pub fn get_post(&self, school_id: SchoolId, post_id: PostId) -> Result<PostWithStats> {
        self.with_conn(|conn| query_post_with_stats(conn, school_id, post_id))
    }

    /// Image key of a post, `None` when it has no image.
    pub fn get_post_image_key(
        &self,
        school_id: SchoolId,
        post_id: PostId,
    ) -> Result<Option<String>> {
        self.with_conn(|conn| Ok(posts::get_post(conn, school_id, post_id)?.image_key))
    }

    pub fn list_posts(
        &self,
        school_id: SchoolId,
        page: PageRequest,
    ) -> Result<(Vec<PostWithStats>, u64)> {
        self.with_conn(|conn| {
            let (rows, total) = posts::list_posts(conn, school_id, page)?;
            let ids: Vec<PostId> = rows.iter().map(|p| p.id).collect();
            let mut stats = stats::post_stats(conn, &ids)?;

            let items = rows
                .into_iter()
                .map(|post| {
                    let (counts, coverage) = stats.remove(&post.id).unwrap_or_default();
                    PostWithStats {
                        post,
                        counts,
                        coverage,
                    }
                })
                .collect();
            Ok((items, total))
        })
    }

    /// Edit content. Returns the updated post and the image key it replaced.
    pub fn update_post_content(
        &self,
        school_id: SchoolId,
        post_id: PostId,
        draft: &PostDraft,
    ) -> Result<(PostWithStats, Option<String>)> {
        self.with_tx(|conn| {
            let replaced = posts::update_content(conn, school_id, post_id, draft, Utc::now())?;
            Ok((query_post_with_stats(conn, school_id, post_id)?, replaced))
        })
    }

    pub fn delete_post(&self, school_id: SchoolId, post_id: PostId) -> Result<Option<String>> {
        self.with_tx(|conn| posts::delete_post(conn, school_id, post_id))
    }

    pub fn list_recipients(
        &self,
        school_id: SchoolId,
        post_id: PostId,
        filter: &RecipientFilter,
        page: PageRequest,
    ) -> Result<(Vec<RecipientRow>, u64)> {
        self.with_conn(|conn| posts::list_recipients(conn, school_id, post_id, filter, page))
    }

    // -- Targeting & statistics --

    pub fn resync_post(
        &self,
        school_id: SchoolId,
        post_id: PostId,
        targeting: &Targeting,
    ) -> Result<ResyncOutcome> {
        self.with_tx(|conn| resync::resync(conn, school_id, post_id, targeting, Utc::now()))
    }

    pub fn group_stats(&self, school_id: SchoolId, post_id: PostId) -> Result<Vec<GroupStatsRow>> {
        self.with_conn(|conn| stats::group_breakdown(conn, school_id, post_id))
    }

    pub fn student_stats(
        &self,
        school_id: SchoolId,
        post_id: PostId,
    ) -> Result<Vec<StudentStatsRow>> {
        self.with_conn(|conn| stats::student_breakdown(conn, school_id, post_id))
    }

    // -- Delivery --

    pub fn retry_group(
        &self,
        school_id: SchoolId,
        post_id: PostId,
        group_id: GroupId,
    ) -> Result<usize> {
        self.with_tx(|conn| delivery::retry_for_group(conn, school_id, post_id, group_id))
    }

    pub fn retry_student(
        &self,
        school_id: SchoolId,
        post_id: PostId,
        student_id: StudentId,
    ) -> Result<usize> {
        self.with_tx(|conn| delivery::retry_for_student(conn, school_id, post_id, student_id))
    }

    pub fn retry_guardian(
        &self,
        school_id: SchoolId,
        post_id: PostId,
        guardian_id: GuardianId,
    ) -> Result<usize> {
        self.with_tx(|conn| delivery::retry_for_guardian(conn, school_id, post_id, guardian_id))
    }

    pub fn record_view(
        &self,
        school_id: SchoolId,
        post_id: PostId,
        guardian_id: GuardianId,
        student_id: Option<StudentId>,
    ) -> Result<(usize, DateTime<Utc>)> {
        self.with_tx(|conn| {
            delivery::record_view(conn, school_id, post_id, guardian_id, student_id, Utc::now())
        })
    }

    pub fn guardian_inbox(
        &self,
        school_id: SchoolId,
        guardian_id: GuardianId,
        page: PageRequest,
    ) -> Result<(Vec<InboxRow>, u64)> {
        self.with_conn(|conn| posts::guardian_inbox(conn, school_id, guardian_id, page))
    }

    pub fn pending_deliveries(
        &self,
        school_id: SchoolId,
        limit: u32,
    ) -> Result<Vec<PendingDeliveryRow>> {
        self.with_conn(|conn| delivery::pending_deliveries(conn, school_id, limit))
    }

    pub fn mark_notified(&self, school_id: SchoolId, ids: &[DeliveryId]) -> Result<usize> {
        self.with_tx(|conn| delivery::mark_notified(conn, school_id, ids))
    }

    // -- Directory events --

    /// Apply a change published by the identity service. Returns the number
    /// of delivery rows written.
    pub fn apply_directory_event(
        &self,
        school_id: SchoolId,
        event: &DirectoryEvent,
    ) -> Result<usize> {
        self.with_tx(|conn| match event {
            DirectoryEvent::GuardianLinked {
                student_id,
                guardian_id,
            } => {
                directory::ensure_students(conn, school_id, &[*student_id])?;
                directory::ensure_guardian(conn, school_id, *guardian_id)?;
                recipients::backfill_guardian_link(conn, *student_id, *guardian_id)
            }
        })
    }

    // -- Bulk import --

    pub fn import_posts(
        &self,
        school_id: SchoolId,
        admin_id: AdminId,
        rows: &[ImportRow],
        mode: ImportMode,
    ) -> Result<ImportReport> {
        self.with_tx(|conn| import::run_import(conn, school_id, admin_id, rows, mode, Utc::now()))
    }
}

fn query_post_with_stats(
    conn: &Connection,
    school_id: SchoolId,
    post_id: PostId,
) -> Result<PostWithStats> {
    let post: PostRow = posts::get_post(conn, school_id, post_id)?;
    let (counts, coverage) = stats::post_summary(conn, post_id)?;
    Ok(PostWithStats {
        post,
        counts,
        coverage,
    })
}
