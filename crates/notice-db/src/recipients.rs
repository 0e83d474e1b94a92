//! Fan-out of a post's targeting into recipient and delivery rows.

use std::collections::BTreeSet;

use notice_types::models::{GuardianId, PostId, RecipientId, SchoolId, StudentId};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::hierarchy::resolve_descendants;
use crate::membership::{guardians_of_students, students_in_groups};
use crate::models::{MaterializeOutcome, RecipientKey, Targeting};
use crate::Result;

/// The full recipient key set a targeting resolves to: one direct key per
/// targeted student plus one key per (descendant group, member) pair.
pub fn target_keys(
    conn: &Connection,
    targeting: &Targeting,
    school_id: SchoolId,
) -> Result<BTreeSet<RecipientKey>> {
    let mut keys: BTreeSet<RecipientKey> = targeting
        .student_ids
        .iter()
        .map(|id| RecipientKey::direct(*id))
        .collect();

    if !targeting.group_ids.is_empty() {
        let groups: Vec<_> = resolve_descendants(conn, &targeting.group_ids, school_id)?
            .into_iter()
            .collect();
        for (group_id, student_id) in students_in_groups(conn, &groups)? {
            keys.insert(RecipientKey::via_group(student_id, group_id));
        }
    }

    Ok(keys)
}

/// Materialize the recipients of a freshly created post.
///
/// Must run inside the transaction that created the post.
pub fn materialize(
    conn: &Connection,
    post_id: PostId,
    targeting: &Targeting,
    school_id: SchoolId,
) -> Result<MaterializeOutcome> {
    let keys = target_keys(conn, targeting, school_id)?;
    let outcome = insert_recipients(conn, post_id, &keys)?;

    info!(
        "Post {} materialized: {} recipients, {} deliveries",
        post_id, outcome.recipients, outcome.deliveries
    );
    Ok(outcome)
}

/// Insert recipient rows for `keys` and one pending delivery row per guardian
/// of each inserted student.
pub(crate) fn insert_recipients(
    conn: &Connection,
    post_id: PostId,
    keys: &BTreeSet<RecipientKey>,
) -> Result<MaterializeOutcome> {
    if keys.is_empty() {
        return Ok(MaterializeOutcome::default());
    }

    let mut inserted: Vec<(RecipientId, StudentId)> = Vec::with_capacity(keys.len());
    {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO post_students (post_id, student_id, origin_group_id) VALUES (?1, ?2, ?3)",
        )?;
        for key in keys {
            stmt.execute(rusqlite::params![post_id, key.student_id, key.origin_group_id])?;
            inserted.push((conn.last_insert_rowid(), key.student_id));
        }
    }

    let deliveries = insert_deliveries(conn, &inserted)?;
    Ok(MaterializeOutcome {
        recipients: inserted.len(),
        deliveries,
    })
}

/// One pending delivery row per guardian for each `(recipient, student)`.
fn insert_deliveries(conn: &Connection, recipients: &[(RecipientId, StudentId)]) -> Result<usize> {
    let students: Vec<StudentId> = recipients
        .iter()
        .map(|(_, s)| *s)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let guardians = guardians_of_students(conn, &students)?;

    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO post_parents (post_student_id, guardian_id, push_pending, viewed_at)
         VALUES (?1, ?2, 1, NULL)",
    )?;
    let mut count = 0;
    for (recipient_id, student_id) in recipients {
        for guardian_id in guardians.get(student_id).into_iter().flatten() {
            count += stmt.execute([*recipient_id, *guardian_id])?;
        }
    }

    debug!("Inserted {} delivery rows for {} recipients", count, recipients.len());
    Ok(count)
}

/// Add the missing delivery rows for every recipient row of `post_id` whose
/// student has a guardian without one. Returns the number of rows added.
pub(crate) fn repair_deliveries(conn: &Connection, post_id: PostId) -> Result<usize> {
    let added = conn.execute(
        "INSERT OR IGNORE INTO post_parents (post_student_id, guardian_id, push_pending, viewed_at)
         SELECT ps.id, gs.guardian_id, 1, NULL
         FROM post_students ps
         JOIN guardian_students gs ON gs.student_id = ps.student_id
         WHERE ps.post_id = ?1",
        [post_id],
    )?;
    Ok(added)
}

/// Handle a new guardian-student link: the guardian gets a pending delivery
/// row on every recipient row of the student. Rows that already exist are
/// left alone, so replaying the event is harmless.
pub fn backfill_guardian_link(
    conn: &Connection,
    student_id: StudentId,
    guardian_id: GuardianId,
) -> Result<usize> {
    let added = conn.execute(
        "INSERT OR IGNORE INTO post_parents (post_student_id, guardian_id, push_pending, viewed_at)
         SELECT ps.id, ?2, 1, NULL
         FROM post_students ps
         WHERE ps.student_id = ?1
           AND EXISTS (
               SELECT 1 FROM guardian_students gs
               WHERE gs.student_id = ?1 AND gs.guardian_id = ?2
           )",
        [student_id, guardian_id],
    )?;

    info!(
        "Guardian {} linked to student {}: {} delivery rows backfilled",
        guardian_id, student_id, added
    );
    Ok(added)
}
