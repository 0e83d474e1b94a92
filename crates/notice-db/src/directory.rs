//! Read access to the school directory: students, guardians and groups.
//!
//! The directory tables are maintained by the identity service. The insert
//! helpers at the bottom exist for seeding and tests.

use std::collections::{BTreeSet, HashMap};

use notice_types::models::{AdminId, GroupId, GuardianId, SchoolId, StudentId};
use rusqlite::Connection;

use crate::sql::{BIND_CHUNK, bind_list, placeholders};
use crate::{NoticeError, Result};

/// Fail with `NotFound` unless every id names a row of `table` in the school.
fn ensure_in_school(
    conn: &Connection,
    table: &str,
    what: &'static str,
    school_id: SchoolId,
    ids: &[i64],
) -> Result<()> {
    let wanted: BTreeSet<i64> = ids.iter().copied().collect();
    let wanted: Vec<i64> = wanted.into_iter().collect();
    let mut found = 0usize;

    for chunk in wanted.chunks(BIND_CHUNK) {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE school_id = ?1 AND id IN ({})",
            table,
            placeholders(2, chunk.len())
        );
        let n: i64 =
            conn.query_row(&sql, bind_list(&[&school_id], chunk).as_slice(), |r| r.get(0))?;
        found += n as usize;
    }

    if found != wanted.len() {
        return Err(NoticeError::NotFound(what));
    }
    Ok(())
}

pub fn ensure_students(conn: &Connection, school_id: SchoolId, ids: &[StudentId]) -> Result<()> {
    ensure_in_school(conn, "students", "student", school_id, ids)
}

pub fn ensure_groups(conn: &Connection, school_id: SchoolId, ids: &[GroupId]) -> Result<()> {
    ensure_in_school(conn, "student_groups", "group", school_id, ids)
}

pub fn ensure_guardian(conn: &Connection, school_id: SchoolId, id: GuardianId) -> Result<()> {
    ensure_in_school(conn, "guardians", "guardian", school_id, &[id])
}

/// Map group names to ids. Unknown names are simply absent.
pub fn group_ids_by_name(
    conn: &Connection,
    school_id: SchoolId,
    names: &[String],
) -> Result<HashMap<String, GroupId>> {
    lookup_by_text(conn, "student_groups", "name", school_id, names)
}

/// Map student numbers to ids. Unknown numbers are simply absent.
pub fn student_ids_by_number(
    conn: &Connection,
    school_id: SchoolId,
    numbers: &[String],
) -> Result<HashMap<String, StudentId>> {
    lookup_by_text(conn, "students", "student_number", school_id, numbers)
}

fn lookup_by_text(
    conn: &Connection,
    table: &str,
    column: &str,
    school_id: SchoolId,
    keys: &[String],
) -> Result<HashMap<String, i64>> {
    let mut map = HashMap::new();

    for chunk in keys.chunks(BIND_CHUNK) {
        let sql = format!(
            "SELECT {col}, id FROM {table} WHERE school_id = ?1 AND {col} IN ({})",
            placeholders(2, chunk.len()),
            col = column,
            table = table,
        );
        let mut params: Vec<&dyn rusqlite::types::ToSql> = vec![&school_id];
        params.extend(chunk.iter().map(|k| k as &dyn rusqlite::types::ToSql));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params.as_slice(), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (key, id) = row?;
            map.insert(key, id);
        }
    }

    Ok(map)
}

// -- Seeding --

pub fn insert_school(conn: &Connection, name: &str) -> Result<SchoolId> {
    conn.execute("INSERT INTO schools (name) VALUES (?1)", [name])?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_admin(
    conn: &Connection,
    school_id: SchoolId,
    email: &str,
    name: &str,
) -> Result<AdminId> {
    conn.execute(
        "INSERT INTO admins (school_id, email, name) VALUES (?1, ?2, ?3)",
        rusqlite::params![school_id, email, name],
    )?;
    Ok(conn.last_insert_rowid())
}

pub struct NewStudent<'a> {
    pub student_number: &'a str,
    pub email: Option<&'a str>,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

pub fn insert_student(
    conn: &Connection,
    school_id: SchoolId,
    s: &NewStudent<'_>,
) -> Result<StudentId> {
    conn.execute(
        "INSERT INTO students (school_id, student_number, email, first_name, last_name)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![school_id, s.student_number, s.email, s.first_name, s.last_name],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_guardian(
    conn: &Connection,
    school_id: SchoolId,
    email: &str,
    name: &str,
) -> Result<GuardianId> {
    conn.execute(
        "INSERT INTO guardians (school_id, email, name) VALUES (?1, ?2, ?3)",
        rusqlite::params![school_id, email, name],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn link_guardian(
    conn: &Connection,
    guardian_id: GuardianId,
    student_id: StudentId,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO guardian_students (guardian_id, student_id) VALUES (?1, ?2)",
        [guardian_id, student_id],
    )?;
    Ok(())
}

pub fn insert_group(
    conn: &Connection,
    school_id: SchoolId,
    name: &str,
    parent_group_id: Option<GroupId>,
) -> Result<GroupId> {
    conn.execute(
        "INSERT INTO student_groups (school_id, name, parent_group_id) VALUES (?1, ?2, ?3)",
        rusqlite::params![school_id, name, parent_group_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn add_group_member(conn: &Connection, group_id: GroupId, student_id: StudentId) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO group_members (group_id, student_id) VALUES (?1, ?2)",
        [group_id, student_id],
    )?;
    Ok(())
}
