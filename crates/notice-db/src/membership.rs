//! Batched joins against group membership and guardian links.

use std::collections::{BTreeSet, HashMap};

use notice_types::models::{GroupId, GuardianId, StudentId};
use rusqlite::Connection;

use crate::Result;
use crate::sql::{BIND_CHUNK, placeholders};

/// Distinct `(group_id, student_id)` pairs for members of any of `group_ids`.
///
/// Pairs rather than bare student ids so the originating group survives.
pub fn students_in_groups(
    conn: &Connection,
    group_ids: &[GroupId],
) -> Result<BTreeSet<(GroupId, StudentId)>> {
    let mut pairs = BTreeSet::new();

    for chunk in group_ids.chunks(BIND_CHUNK) {
        let sql = format!(
            "SELECT DISTINCT group_id, student_id FROM group_members WHERE group_id IN ({})",
            placeholders(1, chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(chunk), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
        for row in rows {
            pairs.insert(row?);
        }
    }

    Ok(pairs)
}

/// Guardians linked to each student. Students without guardians are absent
/// from the map.
pub fn guardians_of_students(
    conn: &Connection,
    student_ids: &[StudentId],
) -> Result<HashMap<StudentId, Vec<GuardianId>>> {
    let mut map: HashMap<StudentId, Vec<GuardianId>> = HashMap::new();

    for chunk in student_ids.chunks(BIND_CHUNK) {
        let sql = format!(
            "SELECT student_id, guardian_id FROM guardian_students
             WHERE student_id IN ({})
             ORDER BY student_id, guardian_id",
            placeholders(1, chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(chunk), |row| {
            Ok((row.get::<_, StudentId>(0)?, row.get::<_, GuardianId>(1)?))
        })?;
        for row in rows {
            let (student_id, guardian_id) = row?;
            map.entry(student_id).or_default().push(guardian_id);
        }
    }

    Ok(map)
}
