//! Helpers for `IN (...)` lists bound as numbered parameters.

use rusqlite::types::ToSql;

/// Ids bound into a single statement. Keeps every statement well below
/// SQLite's host parameter limit.
pub(crate) const BIND_CHUNK: usize = 500;

/// `?{first}, ?{first + 1}, ...` for `count` parameters.
pub(crate) fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Leading scalar parameters followed by an id list, in binding order.
pub(crate) fn bind_list<'a>(leading: &[&'a dyn ToSql], ids: &'a [i64]) -> Vec<&'a dyn ToSql> {
    let mut params: Vec<&dyn ToSql> = Vec::with_capacity(leading.len() + ids.len());
    params.extend_from_slice(leading);
    params.extend(ids.iter().map(|id| id as &dyn ToSql));
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_numbered_from_offset() {
        assert_eq!(placeholders(2, 3), "?2, ?3, ?4");
        assert_eq!(placeholders(1, 1), "?1");
    }
}
