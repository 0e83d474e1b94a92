//! Bulk creation of posts from already-parsed sheet rows.
//!
//! Rows sharing (title, description, priority) become one post whose
//! targeting accumulates every row's group name and student number.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use notice_types::api::{ImportReport, ImportRow, RowError};
use notice_types::models::{AdminId, GroupId, ImportMode, Priority, SchoolId, StudentId};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::{NoticeError, Result};
use crate::directory::{group_ids_by_name, student_ids_by_number};
use crate::models::{PostDraft, Targeting};
use crate::posts::create_post;

/// A post assembled from one or more import rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedPost {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub group_ids: BTreeSet<GroupId>,
    pub student_ids: BTreeSet<StudentId>,
    pub lines: Vec<usize>,
}

struct CheckedRow<'a> {
    line: usize,
    title: &'a str,
    description: &'a str,
    priority: Priority,
    group_name: Option<&'a str>,
    student_number: Option<&'a str>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn check_row(row: &ImportRow) -> std::result::Result<CheckedRow<'_>, RowError> {
    let fail = |message: String| RowError {
        line: row.line,
        message,
    };

    let title = row.title.trim();
    if title.is_empty() {
        return Err(fail("title is required".into()));
    }
    let description = row.description.trim();
    if description.is_empty() {
        return Err(fail("description is required".into()));
    }
    let priority: Priority = row.priority.parse().map_err(fail)?;

    // Same rules create_post applies, so a row that plans also creates.
    let draft = PostDraft {
        title: title.to_string(),
        body: description.to_string(),
        priority,
        image_key: None,
    };
    draft.validate().map_err(|e| match e {
        NoticeError::InvalidInput(message) => fail(message),
        other => fail(other.to_string()),
    })?;

    let group_name = non_empty(&row.group_name);
    let student_number = non_empty(&row.student_number);
    if group_name.is_none() && student_number.is_none() {
        return Err(fail("either a group name or a student number is required".into()));
    }

    Ok(CheckedRow {
        line: row.line,
        title,
        description,
        priority,
        group_name,
        student_number,
    })
}

/// Validate rows, resolve names to ids and merge. Rows with any error are
/// reported and left out of the merge.
pub fn plan_import(
    conn: &Connection,
    school_id: SchoolId,
    rows: &[ImportRow],
) -> Result<(Vec<MergedPost>, Vec<RowError>)> {
    let mut errors = Vec::new();
    let mut checked = Vec::with_capacity(rows.len());
    for row in rows {
        match check_row(row) {
            Ok(c) => checked.push(c),
            Err(e) => errors.push(e),
        }
    }

    let names: Vec<String> = checked
        .iter()
        .filter_map(|r| r.group_name.map(str::to_string))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let numbers: Vec<String> = checked
        .iter()
        .filter_map(|r| r.student_number.map(str::to_string))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let groups = group_ids_by_name(conn, school_id, &names)?;
    let students = student_ids_by_number(conn, school_id, &numbers)?;

    let mut merged: Vec<MergedPost> = Vec::new();
    let mut index: HashMap<(String, String, Priority), usize> = HashMap::new();

    for row in checked {
        let group_id = match row.group_name {
            Some(name) => match groups.get(name) {
                Some(id) => Some(*id),
                None => {
                    errors.push(RowError {
                        line: row.line,
                        message: format!("unknown group '{}'", name),
                    });
                    continue;
                }
            },
            None => None,
        };
        let student_id = match row.student_number {
            Some(number) => match students.get(number) {
                Some(id) => Some(*id),
                None => {
                    errors.push(RowError {
                        line: row.line,
                        message: format!("unknown student number '{}'", number),
                    });
                    continue;
                }
            },
            None => None,
        };

        let key = (row.title.to_string(), row.description.to_string(), row.priority);
        let slot = *index.entry(key).or_insert_with(|| {
            merged.push(MergedPost {
                title: row.title.to_string(),
                description: row.description.to_string(),
                priority: row.priority,
                group_ids: BTreeSet::new(),
                student_ids: BTreeSet::new(),
                lines: Vec::new(),
            });
            merged.len() - 1
        });

        let post = &mut merged[slot];
        post.group_ids.extend(group_id);
        post.student_ids.extend(student_id);
        post.lines.push(row.line);
    }

    errors.sort_by_key(|e| e.line);
    Ok((merged, errors))
}

/// Plan and create. In strict mode any row error means nothing is created.
/// Run inside a transaction so a storage failure undoes every post.
pub fn run_import(
    conn: &Connection,
    school_id: SchoolId,
    admin_id: AdminId,
    rows: &[ImportRow],
    mode: ImportMode,
    now: DateTime<Utc>,
) -> Result<ImportReport> {
    let (merged, errors) = plan_import(conn, school_id, rows)?;

    if mode == ImportMode::Strict && !errors.is_empty() {
        warn!("Strict import rejected: {} row errors", errors.len());
        return Ok(ImportReport {
            created_post_ids: Vec::new(),
            errors,
        });
    }

    let mut created = Vec::with_capacity(merged.len());
    for post in &merged {
        let draft = PostDraft {
            title: post.title.clone(),
            body: post.description.clone(),
            priority: post.priority,
            image_key: None,
        };
        let targeting = Targeting::new(
            post.student_ids.iter().copied().collect(),
            post.group_ids.iter().copied().collect(),
        );
        let (post_id, _) = create_post(conn, school_id, admin_id, &draft, &targeting, now)?;
        created.push(post_id);
    }

    info!(
        "Import created {} posts from {} rows ({} row errors)",
        created.len(),
        rows.len(),
        errors.len()
    );
    Ok(ImportReport {
        created_post_ids: created,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Fixture;

    fn row(
        line: usize,
        title: &str,
        priority: &str,
        group: Option<&str>,
        student: Option<&str>,
    ) -> ImportRow {
        ImportRow {
            line,
            title: title.into(),
            description: "Details inside".into(),
            priority: priority.into(),
            group_name: group.map(Into::into),
            student_number: student.map(Into::into),
        }
    }

    #[test]
    fn repeated_keys_merge_into_one_post() {
        let fx = Fixture::new();
        let g7a = fx.group("7A", None);
        let g7b = fx.group("7B", None);
        let s1 = fx.student("2024-001");

        let rows = vec![
            row(2, "Trip", "high", Some("7A"), None),
            row(3, "Trip", "High", Some("7B"), Some("2024-001")),
            row(4, "Trip", "low", Some("7A"), None),
        ];
        let (merged, errors) = fx.db.with_conn(|c| plan_import(c, fx.school, &rows)).unwrap();
        assert!(errors.is_empty());
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].group_ids, BTreeSet::from([g7a, g7b]));
        assert_eq!(merged[0].student_ids, BTreeSet::from([s1]));
        assert_eq!(merged[0].lines, vec![2, 3]);
        assert_eq!(merged[1].priority, Priority::Low);
    }

    #[test]
    fn row_errors_carry_line_numbers() {
        let fx = Fixture::new();
        fx.group("7A", None);

        let rows = vec![
            row(2, "", "high", Some("7A"), None),
            row(3, "Trip", "urgent", Some("7A"), None),
            row(4, "Trip", "high", None, None),
            row(5, "Trip", "high", Some("9Z"), None),
            row(6, "Trip", "high", None, Some("nobody")),
            row(7, "Trip", "high", Some("7A"), None),
        ];
        let (merged, errors) = fx.db.with_conn(|c| plan_import(c, fx.school, &rows)).unwrap();
        let lines: Vec<usize> = errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![2, 3, 4, 5, 6]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].lines, vec![7]);
    }

    #[test]
    fn strict_mode_writes_nothing_on_error() {
        let fx = Fixture::new();
        fx.group("7A", None);
        let rows = vec![
            row(2, "Trip", "high", Some("7A"), None),
            row(3, "Trip", "high", Some("missing"), None),
        ];

        let report = fx
            .db
            .with_tx(|c| {
                run_import(c, fx.school, fx.admin, &rows, ImportMode::Strict, Utc::now())
            })
            .unwrap();
        assert!(report.created_post_ids.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(fx.post_count(), 0);
    }

    #[test]
    fn lenient_mode_imports_the_good_rows() {
        let fx = Fixture::new();
        let g = fx.group("7A", None);
        let a = fx.student("2024-001");
        fx.add_member(g, a);
        let rows = vec![
            row(2, "Trip", "high", Some("7A"), None),
            row(3, "Trip", "high", Some("missing"), None),
            row(4, "Exam", "medium", None, Some("2024-001")),
        ];

        let report = fx
            .db
            .with_tx(|c| {
                run_import(c, fx.school, fx.admin, &rows, ImportMode::Lenient, Utc::now())
            })
            .unwrap();
        assert_eq!(report.created_post_ids.len(), 2);
        assert_eq!(
            report.errors,
            vec![RowError {
                line: 3,
                message: "unknown group 'missing'".into()
            }]
        );
        assert_eq!(fx.post_count(), 2);
        assert_eq!(fx.recipient_keys(report.created_post_ids[0]).len(), 1);
    }

    #[test]
    fn overlong_title_is_a_row_error_not_an_abort() {
        let fx = Fixture::new();
        let g = fx.group("7A", None);
        let a = fx.student("2024-001");
        fx.add_member(g, a);
        let long_title = "x".repeat(201);
        let rows = vec![
            row(2, "Trip", "high", Some("7A"), None),
            row(3, &long_title, "high", Some("7A"), None),
        ];

        let (merged, errors) = fx.db.with_conn(|c| plan_import(c, fx.school, &rows)).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 3);
        assert!(errors[0].message.contains("200"));

        let report = fx
            .db
            .with_tx(|c| {
                run_import(c, fx.school, fx.admin, &rows, ImportMode::Lenient, Utc::now())
            })
            .unwrap();
        assert_eq!(report.created_post_ids.len(), 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(fx.post_count(), 1);

        let strict = fx
            .db
            .with_tx(|c| {
                run_import(c, fx.school, fx.admin, &rows, ImportMode::Strict, Utc::now())
            })
            .unwrap();
        assert!(strict.created_post_ids.is_empty());
        assert_eq!(strict.errors[0].line, 3);
        assert_eq!(fx.post_count(), 1);
    }
}
