//! Post rows: creation with fan-out, content edits, listing and deletion.

use chrono::{DateTime, Utc};
use notice_types::models::{AdminId, GuardianId, PostId, SchoolId, StudentId};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::delivery::reset_unread;
use crate::directory::{ensure_groups, ensure_students};
use crate::models::{
    InboxRow, MaterializeOutcome, PageRequest, PostDraft, PostRow, RecipientFilter, RecipientRow,
    Targeting, priority_column,
};
use crate::recipients::materialize;
use crate::{NoticeError, Result};

const POST_COLUMNS: &str =
    "p.id, p.school_id, p.admin_id, p.title, p.body, p.priority, p.image_key, \
     p.sent_at, p.edited_at";

fn post_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        school_id: row.get(1)?,
        admin_id: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        priority: priority_column(row, 5)?,
        image_key: row.get(6)?,
        sent_at: row.get(7)?,
        edited_at: row.get(8)?,
    })
}

/// Validate targeting ids against the school before anything is written.
pub fn check_targeting(
    conn: &Connection,
    school_id: SchoolId,
    targeting: &Targeting,
) -> Result<()> {
    targeting.validate()?;
    ensure_students(conn, school_id, &targeting.student_ids)?;
    ensure_groups(conn, school_id, &targeting.group_ids)?;
    Ok(())
}

/// Insert a post and materialize its recipients. Run inside a transaction.
pub fn create_post(
    conn: &Connection,
    school_id: SchoolId,
    admin_id: AdminId,
    draft: &PostDraft,
    targeting: &Targeting,
    now: DateTime<Utc>,
) -> Result<(PostId, MaterializeOutcome)> {
    draft.validate()?;
    check_targeting(conn, school_id, targeting)?;

    conn.execute(
        "INSERT INTO posts (school_id, admin_id, title, body, priority, image_key, sent_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            school_id,
            admin_id,
            draft.title.trim(),
            draft.body,
            draft.priority.as_str(),
            draft.image_key,
            now,
        ],
    )?;
    let post_id = conn.last_insert_rowid();

    let outcome = materialize(conn, post_id, targeting, school_id)?;
    info!("Admin {} created post {} in school {}", admin_id, post_id, school_id);
    Ok((post_id, outcome))
}

/// Fetch a post, treating posts of other schools as absent.
pub fn get_post(conn: &Connection, school_id: SchoolId, post_id: PostId) -> Result<PostRow> {
    let sql = format!(
        "SELECT {} FROM posts p WHERE p.id = ?1 AND p.school_id = ?2",
        POST_COLUMNS
    );
    conn.query_row(&sql, [post_id, school_id], post_from_row)
        .optional()?
        .ok_or(NoticeError::NotFound("post"))
}

/// `NotFound` unless the post exists in the school.
pub fn ensure_post(conn: &Connection, school_id: SchoolId, post_id: PostId) -> Result<()> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM posts WHERE id = ?1 AND school_id = ?2",
            [post_id, school_id],
            |row| row.get(0),
        )
        .optional()?;
    found.map(|_| ()).ok_or(NoticeError::NotFound("post"))
}

/// Newest first.
pub fn list_posts(
    conn: &Connection,
    school_id: SchoolId,
    page: PageRequest,
) -> Result<(Vec<PostRow>, u64)> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM posts WHERE school_id = ?1",
        [school_id],
        |r| r.get(0),
    )?;

    let sql = format!(
        "SELECT {} FROM posts p WHERE p.school_id = ?1
         ORDER BY p.sent_at DESC, p.id DESC
         LIMIT ?2 OFFSET ?3",
        POST_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params![school_id, page.limit(), page.offset()], post_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((rows, total as u64))
}

/// Replace title/body/priority (and the image key when `image_key` is
/// `Some`), stamp `edited_at`, and re-arm every unread delivery row.
/// Returns the previous image key when it was replaced. Run inside a
/// transaction.
pub fn update_content(
    conn: &Connection,
    school_id: SchoolId,
    post_id: PostId,
    draft: &PostDraft,
    now: DateTime<Utc>,
) -> Result<Option<String>> {
    draft.validate()?;
    let current = get_post(conn, school_id, post_id)?;

    let image_key = draft.image_key.clone().or_else(|| current.image_key.clone());
    let replaced = match &draft.image_key {
        Some(new_key) if current.image_key.as_deref() != Some(new_key.as_str()) => {
            current.image_key
        }
        _ => None,
    };

    conn.execute(
        "UPDATE posts SET title = ?1, body = ?2, priority = ?3, image_key = ?4, edited_at = ?5
         WHERE id = ?6",
        rusqlite::params![
            draft.title.trim(),
            draft.body,
            draft.priority.as_str(),
            image_key,
            now,
            post_id,
        ],
    )?;
    let rearmed = reset_unread(conn, post_id)?;

    info!("Post {} content edited, {} unread deliveries re-armed", post_id, rearmed);
    Ok(replaced)
}

/// Delete a post with its recipients and deliveries. Returns the image key
/// so the caller can drop the stored file.
pub fn delete_post(
    conn: &Connection,
    school_id: SchoolId,
    post_id: PostId,
) -> Result<Option<String>> {
    let post = get_post(conn, school_id, post_id)?;

    // Children first; the cascade would do it, this keeps the order explicit.
    conn.execute(
        "DELETE FROM post_parents
         WHERE post_student_id IN (SELECT id FROM post_students WHERE post_id = ?1)",
        [post_id],
    )?;
    conn.execute("DELETE FROM post_students WHERE post_id = ?1", [post_id])?;
    conn.execute("DELETE FROM posts WHERE id = ?1", [post_id])?;

    info!("Post {} deleted from school {}", post_id, school_id);
    Ok(post.image_key)
}

/// `%needle%` with LIKE metacharacters escaped; `None` for a blank filter.
fn contains_pattern(needle: Option<&str>) -> Option<String> {
    let needle = needle.map(str::trim).filter(|s| !s.is_empty())?;
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    Some(pattern)
}

/// Recipient rows of a post with student details, filtered by substring
/// matches on email and student number.
pub fn list_recipients(
    conn: &Connection,
    school_id: SchoolId,
    post_id: PostId,
    filter: &RecipientFilter,
    page: PageRequest,
) -> Result<(Vec<RecipientRow>, u64)> {
    ensure_post(conn, school_id, post_id)?;

    let email = contains_pattern(filter.email.as_deref());
    let number = contains_pattern(filter.student_number.as_deref());

    const FILTER: &str = "ps.post_id = ?1
         AND (?2 IS NULL OR s.email LIKE ?2 ESCAPE '\\')
         AND (?3 IS NULL OR s.student_number LIKE ?3 ESCAPE '\\')";

    let total: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM post_students ps
             JOIN students s ON s.id = ps.student_id
             WHERE {}",
            FILTER
        ),
        rusqlite::params![post_id, email, number],
        |r| r.get(0),
    )?;

    let sql = format!(
        "SELECT ps.id, ps.student_id, s.student_number, s.email, s.first_name, s.last_name,
                ps.origin_group_id, g.name,
                (SELECT COUNT(*) FROM post_parents pp
                 WHERE pp.post_student_id = ps.id AND pp.viewed_at IS NOT NULL),
                (SELECT COUNT(*) FROM post_parents pp
                 WHERE pp.post_student_id = ps.id AND pp.viewed_at IS NULL)
         FROM post_students ps
         JOIN students s ON s.id = ps.student_id
         LEFT JOIN student_groups g ON g.id = ps.origin_group_id
         WHERE {}
         ORDER BY s.last_name, s.first_name, ps.id
         LIMIT ?4 OFFSET ?5",
        FILTER
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            rusqlite::params![post_id, email, number, page.limit(), page.offset()],
            |row| {
                Ok(RecipientRow {
                    id: row.get(0)?,
                    student_id: row.get(1)?,
                    student_number: row.get(2)?,
                    email: row.get(3)?,
                    first_name: row.get(4)?,
                    last_name: row.get(5)?,
                    origin_group_id: row.get(6)?,
                    origin_group_name: row.get(7)?,
                    guardians_read: row.get::<_, i64>(8)? as u64,
                    guardians_unread: row.get::<_, i64>(9)? as u64,
                })
            },
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((rows, total as u64))
}

/// Posts addressed to a guardian, newest first. A post counts as read once
/// every one of the guardian's delivery rows for it is read.
pub fn guardian_inbox(
    conn: &Connection,
    school_id: SchoolId,
    guardian_id: GuardianId,
    page: PageRequest,
) -> Result<(Vec<InboxRow>, u64)> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT ps.post_id)
         FROM post_parents pp
         JOIN post_students ps ON ps.id = pp.post_student_id
         JOIN posts p ON p.id = ps.post_id
         WHERE pp.guardian_id = ?1 AND p.school_id = ?2",
        [guardian_id, school_id],
        |r| r.get(0),
    )?;

    let sql = format!(
        "SELECT {}, GROUP_CONCAT(DISTINCT ps.student_id), SUM(pp.viewed_at IS NULL) = 0
         FROM post_parents pp
         JOIN post_students ps ON ps.id = pp.post_student_id
         JOIN posts p ON p.id = ps.post_id
         WHERE pp.guardian_id = ?1 AND p.school_id = ?2
         GROUP BY p.id
         ORDER BY p.sent_at DESC, p.id DESC
         LIMIT ?3 OFFSET ?4",
        POST_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            rusqlite::params![guardian_id, school_id, page.limit(), page.offset()],
            |row| {
                let students: String = row.get(9)?;
                Ok(InboxRow {
                    post: post_from_row(row)?,
                    student_ids: parse_id_list(&students),
                    read: row.get(10)?,
                })
            },
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((rows, total as u64))
}

fn parse_id_list(raw: &str) -> Vec<StudentId> {
    let mut ids: Vec<StudentId> = raw.split(',').filter_map(|s| s.trim().parse().ok()).collect();
    ids.sort_unstable();
    ids
}
