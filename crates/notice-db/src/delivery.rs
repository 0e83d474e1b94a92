//! Delivery record state: retries, views, and the hand-off to the
//! notification worker.
//!
//! Pending  = `push_pending = 1`, `viewed_at IS NULL`
//! Notified = `push_pending = 0`, `viewed_at IS NULL`
//! Read     = `viewed_at IS NOT NULL` (terminal)
//!
//! Every write below is conditioned on `viewed_at IS NULL`.

use chrono::{DateTime, Utc};
use notice_types::models::{DeliveryId, GroupId, GuardianId, PostId, SchoolId, StudentId};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::directory::{ensure_groups, ensure_guardian, ensure_students};
use crate::models::{DeliveryRow, PendingDeliveryRow, priority_column};
use crate::posts::ensure_post;
use crate::sql::{BIND_CHUNK, bind_list, placeholders};
use crate::{NoticeError, Result};

/// Re-arm unread deliveries of recipient rows that came from `group_id`.
pub fn retry_for_group(
    conn: &Connection,
    school_id: SchoolId,
    post_id: PostId,
    group_id: GroupId,
) -> Result<usize> {
    ensure_post(conn, school_id, post_id)?;
    ensure_groups(conn, school_id, &[group_id])?;

    let n = conn.execute(
        "UPDATE post_parents SET push_pending = 1
         WHERE viewed_at IS NULL
           AND post_student_id IN (
               SELECT id FROM post_students WHERE post_id = ?1 AND origin_group_id = ?2
           )",
        [post_id, group_id],
    )?;
    info!("Retry for group {} on post {}: {} deliveries re-armed", group_id, post_id, n);
    Ok(n)
}

/// Re-arm unread deliveries of every recipient row of `student_id`,
/// whatever its origin.
pub fn retry_for_student(
    conn: &Connection,
    school_id: SchoolId,
    post_id: PostId,
    student_id: StudentId,
) -> Result<usize> {
    ensure_post(conn, school_id, post_id)?;
    ensure_students(conn, school_id, &[student_id])?;

    let n = conn.execute(
        "UPDATE post_parents SET push_pending = 1
         WHERE viewed_at IS NULL
           AND post_student_id IN (
               SELECT id FROM post_students WHERE post_id = ?1 AND student_id = ?2
           )",
        [post_id, student_id],
    )?;
    info!("Retry for student {} on post {}: {} deliveries re-armed", student_id, post_id, n);
    Ok(n)
}

/// Re-arm the unread deliveries addressed to `guardian_id` on this post.
pub fn retry_for_guardian(
    conn: &Connection,
    school_id: SchoolId,
    post_id: PostId,
    guardian_id: GuardianId,
) -> Result<usize> {
    ensure_post(conn, school_id, post_id)?;
    ensure_guardian(conn, school_id, guardian_id)?;

    let n = conn.execute(
        "UPDATE post_parents SET push_pending = 1
         WHERE viewed_at IS NULL
           AND guardian_id = ?2
           AND post_student_id IN (SELECT id FROM post_students WHERE post_id = ?1)",
        [post_id, guardian_id],
    )?;
    info!("Retry for guardian {} on post {}: {} deliveries re-armed", guardian_id, post_id, n);
    Ok(n)
}

/// Re-arm every unread delivery of the post (content was edited).
pub fn reset_unread(conn: &Connection, post_id: PostId) -> Result<usize> {
    let n = conn.execute(
        "UPDATE post_parents SET push_pending = 1
         WHERE viewed_at IS NULL
           AND post_student_id IN (SELECT id FROM post_students WHERE post_id = ?1)",
        [post_id],
    )?;
    Ok(n)
}

/// Record that a guardian opened the post, optionally for one child only.
///
/// Sets `viewed_at` on the guardian's unread rows; rows that are already read
/// keep their first timestamp. Returns the number of rows newly marked read
/// and the earliest `viewed_at` now on record.
pub fn record_view(
    conn: &Connection,
    school_id: SchoolId,
    post_id: PostId,
    guardian_id: GuardianId,
    student_id: Option<StudentId>,
    now: DateTime<Utc>,
) -> Result<(usize, DateTime<Utc>)> {
    ensure_post(conn, school_id, post_id)?;

    const SCOPE: &str = "guardian_id = ?2
           AND post_student_id IN (
               SELECT id FROM post_students
               WHERE post_id = ?1 AND (?3 IS NULL OR student_id = ?3)
           )";

    let owned: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM post_parents WHERE {}", SCOPE),
        rusqlite::params![post_id, guardian_id, student_id],
        |r| r.get(0),
    )?;
    if owned == 0 {
        return Err(NoticeError::NotFound("delivery"));
    }

    let updated = conn.execute(
        &format!(
            "UPDATE post_parents SET viewed_at = ?4, push_pending = 0
             WHERE viewed_at IS NULL AND {}",
            SCOPE
        ),
        rusqlite::params![post_id, guardian_id, student_id, now],
    )?;

    let first_viewed: DateTime<Utc> = conn.query_row(
        &format!("SELECT MIN(viewed_at) FROM post_parents WHERE {}", SCOPE),
        rusqlite::params![post_id, guardian_id, student_id],
        |r| r.get(0),
    )?;

    debug!(
        "Guardian {} viewed post {}: {} rows newly read",
        guardian_id, post_id, updated
    );
    Ok((updated, first_viewed))
}

/// Deliveries owed a notification, oldest first.
pub fn pending_deliveries(
    conn: &Connection,
    school_id: SchoolId,
    limit: u32,
) -> Result<Vec<PendingDeliveryRow>> {
    let mut stmt = conn.prepare(
        "SELECT pp.id, ps.post_id, ps.student_id, pp.guardian_id, p.title, p.priority
         FROM post_parents pp
         JOIN post_students ps ON ps.id = pp.post_student_id
         JOIN posts p ON p.id = ps.post_id
         WHERE pp.push_pending = 1 AND pp.viewed_at IS NULL AND p.school_id = ?1
         ORDER BY pp.id
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![school_id, limit], |row| {
            Ok(PendingDeliveryRow {
                id: row.get(0)?,
                post_id: row.get(1)?,
                student_id: row.get(2)?,
                guardian_id: row.get(3)?,
                title: row.get(4)?,
                priority: priority_column(row, 5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Pending to Notified, for deliveries the worker has sent. Ids of other
/// schools, read rows and rows already notified are skipped.
pub fn mark_notified(conn: &Connection, school_id: SchoolId, ids: &[DeliveryId]) -> Result<usize> {
    let mut n = 0;
    for chunk in ids.chunks(BIND_CHUNK) {
        let sql = format!(
            "UPDATE post_parents SET push_pending = 0
             WHERE push_pending = 1 AND viewed_at IS NULL
               AND id IN ({})
               AND post_student_id IN (
                   SELECT ps.id FROM post_students ps
                   JOIN posts p ON p.id = ps.post_id
                   WHERE p.school_id = ?1
               )",
            placeholders(2, chunk.len())
        );
        n += conn.execute(&sql, bind_list(&[&school_id], chunk).as_slice())?;
    }
    debug!("{} deliveries marked notified", n);
    Ok(n)
}

/// Every delivery row of a post, ordered by id.
pub fn deliveries_for_post(conn: &Connection, post_id: PostId) -> Result<Vec<DeliveryRow>> {
    let mut stmt = conn.prepare(
        "SELECT pp.id, pp.post_student_id, pp.guardian_id, pp.push_pending, pp.viewed_at
         FROM post_parents pp
         JOIN post_students ps ON ps.id = pp.post_student_id
         WHERE ps.post_id = ?1
         ORDER BY pp.id",
    )?;
    let rows = stmt
        .query_map([post_id], |row| {
            Ok(DeliveryRow {
                id: row.get(0)?,
                recipient_id: row.get(1)?,
                guardian_id: row.get(2)?,
                push_pending: row.get(3)?,
                viewed_at: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
