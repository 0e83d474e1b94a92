//! Diff-based recomputation of a post's recipients after a targeting change.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use notice_types::models::{PostId, RecipientId, SchoolId};
use rusqlite::Connection;
use tracing::info;

use crate::models::{RecipientKey, ResyncOutcome, Targeting};
use crate::posts::{check_targeting, ensure_post};
use crate::recipients::{insert_recipients, repair_deliveries, target_keys};
use crate::sql::{BIND_CHUNK, placeholders};
use crate::Result;

/// Replace the targeting of `post_id`: rows no longer targeted are removed
/// (deliveries first), newly targeted rows are inserted with their
/// deliveries, rows present in both are kept untouched, `edited_at` is
/// stamped.
///
/// Must run inside one transaction; the caller commits or rolls back as a
/// whole.
pub fn resync(
    conn: &Connection,
    school_id: SchoolId,
    post_id: PostId,
    targeting: &Targeting,
    now: DateTime<Utc>,
) -> Result<ResyncOutcome> {
    ensure_post(conn, school_id, post_id)?;
    check_targeting(conn, school_id, targeting)?;

    let existing = existing_recipients(conn, post_id)?;
    let wanted = target_keys(conn, targeting, school_id)?;

    let to_remove: Vec<RecipientId> = existing
        .iter()
        .filter(|(key, _)| !wanted.contains(key))
        .map(|(_, id)| *id)
        .collect();
    let to_add: BTreeSet<RecipientKey> = wanted
        .into_iter()
        .filter(|key| !existing.contains_key(key))
        .collect();

    let (recipients_removed, deliveries_removed) = remove_recipients(conn, &to_remove)?;
    let added = insert_recipients(conn, post_id, &to_add)?;
    let repaired = repair_deliveries(conn, post_id)?;

    conn.execute("UPDATE posts SET edited_at = ?1 WHERE id = ?2", rusqlite::params![now, post_id])?;

    let outcome = ResyncOutcome {
        recipients_added: added.recipients,
        recipients_removed,
        deliveries_added: added.deliveries + repaired,
        deliveries_removed,
    };
    info!(
        "Post {} resynced: +{} / -{} recipients, +{} / -{} deliveries",
        post_id,
        outcome.recipients_added,
        outcome.recipients_removed,
        outcome.deliveries_added,
        outcome.deliveries_removed
    );
    Ok(outcome)
}

fn existing_recipients(
    conn: &Connection,
    post_id: PostId,
) -> Result<BTreeMap<RecipientKey, RecipientId>> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, origin_group_id FROM post_students WHERE post_id = ?1",
    )?;
    let rows = stmt.query_map([post_id], |row| {
        Ok((
            RecipientKey {
                student_id: row.get(1)?,
                origin_group_id: row.get(2)?,
            },
            row.get::<_, RecipientId>(0)?,
        ))
    })?;

    let mut map = BTreeMap::new();
    for row in rows {
        let (key, id) = row?;
        map.insert(key, id);
    }
    Ok(map)
}

/// Delete delivery rows, then the recipient rows they hang off.
/// Returns `(recipients, deliveries)` removed.
fn remove_recipients(conn: &Connection, ids: &[RecipientId]) -> Result<(usize, usize)> {
    let mut recipients = 0;
    let mut deliveries = 0;

    for chunk in ids.chunks(BIND_CHUNK) {
        let list = placeholders(1, chunk.len());
        deliveries += conn.execute(
            &format!("DELETE FROM post_parents WHERE post_student_id IN ({})", list),
            rusqlite::params_from_iter(chunk),
        )?;
        recipients += conn.execute(
            &format!("DELETE FROM post_students WHERE id IN ({})", list),
            rusqlite::params_from_iter(chunk),
        )?;
    }

    Ok((recipients, deliveries))
}
