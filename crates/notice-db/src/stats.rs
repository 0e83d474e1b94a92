//! Read/unread aggregates over delivery rows.
//!
//! Guardian counts are distinct per guardian: a guardian with two children on
//! one post is counted once among readers as soon as any of their rows is
//! read, and once among non-readers while any row is unread.

use std::collections::HashMap;

use notice_types::models::{PostId, SchoolId};
use rusqlite::Connection;

use crate::Result;
use crate::models::{GroupStatsRow, ReadCounts, StudentCoverage, StudentStatsRow};
use crate::posts::ensure_post;
use crate::sql::{BIND_CHUNK, placeholders};

/// Per-post guardian read counts and student coverage, for a page of posts.
/// Posts without recipients map to zeroes.
pub fn post_stats(
    conn: &Connection,
    post_ids: &[PostId],
) -> Result<HashMap<PostId, (ReadCounts, StudentCoverage)>> {
    let mut out: HashMap<PostId, (ReadCounts, StudentCoverage)> = post_ids
        .iter()
        .map(|id| (*id, Default::default()))
        .collect();

    for chunk in post_ids.chunks(BIND_CHUNK) {
        let sql = format!(
            "SELECT ps.post_id,
                    COUNT(DISTINCT CASE WHEN pp.viewed_at IS NOT NULL THEN pp.guardian_id END),
                    COUNT(DISTINCT CASE WHEN pp.id IS NOT NULL AND pp.viewed_at IS NULL
                                        THEN pp.guardian_id END),
                    COUNT(DISTINCT ps.student_id),
                    COUNT(DISTINCT CASE WHEN pp.viewed_at IS NOT NULL THEN ps.student_id END)
             FROM post_students ps
             LEFT JOIN post_parents pp ON pp.post_student_id = ps.id
             WHERE ps.post_id IN ({})
             GROUP BY ps.post_id",
            placeholders(1, chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(chunk), |row| {
            Ok((
                row.get::<_, PostId>(0)?,
                ReadCounts {
                    read_count: row.get::<_, i64>(1)? as u64,
                    unread_count: row.get::<_, i64>(2)? as u64,
                },
                StudentCoverage {
                    targeted_students: row.get::<_, i64>(3)? as u64,
                    read_students: row.get::<_, i64>(4)? as u64,
                },
            ))
        })?;
        for row in rows {
            let (post_id, counts, coverage) = row?;
            out.insert(post_id, (counts, coverage));
        }
    }

    Ok(out)
}

/// Guardian read counts and student coverage for one post.
pub fn post_summary(
    conn: &Connection,
    post_id: PostId,
) -> Result<(ReadCounts, StudentCoverage)> {
    Ok(post_stats(conn, &[post_id])?
        .remove(&post_id)
        .unwrap_or_default())
}

/// One row per origin group, plus one row with `group_id: None` for the
/// directly targeted students when there are any.
pub fn group_breakdown(
    conn: &Connection,
    school_id: SchoolId,
    post_id: PostId,
) -> Result<Vec<GroupStatsRow>> {
    ensure_post(conn, school_id, post_id)?;

    let mut stmt = conn.prepare(
        "SELECT ps.origin_group_id, g.name,
                COUNT(DISTINCT ps.student_id),
                COUNT(DISTINCT CASE WHEN pp.viewed_at IS NOT NULL THEN ps.student_id END),
                COUNT(DISTINCT CASE WHEN pp.viewed_at IS NOT NULL THEN pp.guardian_id END),
                COUNT(DISTINCT CASE WHEN pp.id IS NOT NULL AND pp.viewed_at IS NULL
                                    THEN pp.guardian_id END)
         FROM post_students ps
         LEFT JOIN post_parents pp ON pp.post_student_id = ps.id
         LEFT JOIN student_groups g ON g.id = ps.origin_group_id
         WHERE ps.post_id = ?1
         GROUP BY ps.origin_group_id
         ORDER BY ps.origin_group_id IS NOT NULL, g.name",
    )?;
    let rows = stmt
        .query_map([post_id], |row| {
            Ok(GroupStatsRow {
                group_id: row.get(0)?,
                group_name: row.get(1)?,
                coverage: StudentCoverage {
                    targeted_students: row.get::<_, i64>(2)? as u64,
                    read_students: row.get::<_, i64>(3)? as u64,
                },
                counts: ReadCounts {
                    read_count: row.get::<_, i64>(4)? as u64,
                    unread_count: row.get::<_, i64>(5)? as u64,
                },
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Guardian read counts per targeted student, across all origins.
pub fn student_breakdown(
    conn: &Connection,
    school_id: SchoolId,
    post_id: PostId,
) -> Result<Vec<StudentStatsRow>> {
    ensure_post(conn, school_id, post_id)?;

    let mut stmt = conn.prepare(
        "SELECT s.id, s.student_number, s.first_name, s.last_name,
                COUNT(DISTINCT CASE WHEN pp.viewed_at IS NOT NULL THEN pp.guardian_id END),
                COUNT(DISTINCT CASE WHEN pp.id IS NOT NULL AND pp.viewed_at IS NULL
                                    THEN pp.guardian_id END)
         FROM post_students ps
         JOIN students s ON s.id = ps.student_id
         LEFT JOIN post_parents pp ON pp.post_student_id = ps.id
         WHERE ps.post_id = ?1
         GROUP BY s.id
         ORDER BY s.last_name, s.first_name, s.id",
    )?;
    let rows = stmt
        .query_map([post_id], |row| {
            Ok(StudentStatsRow {
                student_id: row.get(0)?,
                student_number: row.get(1)?,
                first_name: row.get(2)?,
                last_name: row.get(3)?,
                counts: ReadCounts {
                    read_count: row.get::<_, i64>(4)? as u64,
                    unread_count: row.get::<_, i64>(5)? as u64,
                },
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
