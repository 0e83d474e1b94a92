//! Transitive expansion of student groups along the parent-group link.

use std::collections::BTreeSet;

use notice_types::models::{GroupId, SchoolId};
use rusqlite::Connection;
use tracing::debug;

use crate::Result;
use crate::sql::{BIND_CHUNK, bind_list, placeholders};

/// All groups reachable downwards from `seeds`, seeds included.
///
/// Breadth-first over "is sub-group of". Only ids that are not yet in the
/// result enter the next frontier, so a cyclic parent chain terminates.
/// Seeds are taken as given; callers verify school ownership beforehand.
pub fn resolve_descendants(
    conn: &Connection,
    seeds: &[GroupId],
    school_id: SchoolId,
) -> Result<BTreeSet<GroupId>> {
    let mut result: BTreeSet<GroupId> = seeds.iter().copied().collect();
    let mut frontier: Vec<GroupId> = result.iter().copied().collect();
    let mut rounds = 0usize;

    while !frontier.is_empty() {
        rounds += 1;
        let children = child_groups(conn, &frontier, school_id)?;

        frontier = children
            .into_iter()
            .filter(|id| result.insert(*id))
            .collect();
    }

    debug!(
        "Resolved {} seed groups to {} groups in {} rounds",
        seeds.len(),
        result.len(),
        rounds
    );
    Ok(result)
}

/// Direct children of any group in `parents`, within the school.
fn child_groups(
    conn: &Connection,
    parents: &[GroupId],
    school_id: SchoolId,
) -> Result<Vec<GroupId>> {
    let mut out = Vec::new();

    for chunk in parents.chunks(BIND_CHUNK) {
        let sql = format!(
            "SELECT id FROM student_groups WHERE school_id = ?1 AND parent_group_id IN ({})",
            placeholders(2, chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(bind_list(&[&school_id], chunk).as_slice(), |row| row.get(0))?
            .collect::<std::result::Result<Vec<GroupId>, _>>()?;
        out.extend(ids);
    }

    Ok(out)
}
