use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (directory and posts)");
        conn.execute_batch(
            "
            CREATE TABLE schools (
                id          INTEGER PRIMARY KEY,
                name        TEXT NOT NULL
            );

            CREATE TABLE admins (
                id          INTEGER PRIMARY KEY,
                school_id   INTEGER NOT NULL REFERENCES schools(id),
                email       TEXT NOT NULL,
                name        TEXT NOT NULL
            );

            CREATE TABLE students (
                id              INTEGER PRIMARY KEY,
                school_id       INTEGER NOT NULL REFERENCES schools(id),
                student_number  TEXT NOT NULL,
                email           TEXT,
                first_name      TEXT NOT NULL,
                last_name       TEXT NOT NULL,
                UNIQUE(school_id, student_number)
            );

            CREATE TABLE guardians (
                id          INTEGER PRIMARY KEY,
                school_id   INTEGER NOT NULL REFERENCES schools(id),
                email       TEXT NOT NULL,
                name        TEXT NOT NULL
            );

            CREATE TABLE guardian_students (
                guardian_id INTEGER NOT NULL REFERENCES guardians(id) ON DELETE CASCADE,
                student_id  INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
                PRIMARY KEY (guardian_id, student_id)
            );

            CREATE INDEX idx_guardian_students_student
                ON guardian_students(student_id);

            -- parent_group_id is not guaranteed acyclic
            CREATE TABLE student_groups (
                id              INTEGER PRIMARY KEY,
                school_id       INTEGER NOT NULL REFERENCES schools(id),
                name            TEXT NOT NULL,
                parent_group_id INTEGER REFERENCES student_groups(id) ON DELETE SET NULL,
                UNIQUE(school_id, name)
            );

            CREATE INDEX idx_student_groups_parent
                ON student_groups(parent_group_id, school_id);

            CREATE TABLE group_members (
                group_id    INTEGER NOT NULL REFERENCES student_groups(id) ON DELETE CASCADE,
                student_id  INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
                PRIMARY KEY (group_id, student_id)
            );

            CREATE TABLE posts (
                id          INTEGER PRIMARY KEY,
                school_id   INTEGER NOT NULL REFERENCES schools(id),
                admin_id    INTEGER NOT NULL REFERENCES admins(id),
                title       TEXT NOT NULL,
                body        TEXT NOT NULL,
                priority    TEXT NOT NULL CHECK (priority IN ('low', 'medium', 'high')),
                image_key   TEXT,
                sent_at     TEXT NOT NULL,
                edited_at   TEXT
            );

            CREATE INDEX idx_posts_school
                ON posts(school_id, sent_at);

            CREATE TABLE post_students (
                id              INTEGER PRIMARY KEY,
                post_id         INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                student_id      INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
                origin_group_id INTEGER REFERENCES student_groups(id) ON DELETE CASCADE
            );

            -- NULL origin (direct targeting) must collide with itself
            CREATE UNIQUE INDEX idx_post_students_key
                ON post_students(post_id, student_id, COALESCE(origin_group_id, 0));

            CREATE INDEX idx_post_students_student
                ON post_students(student_id);

            CREATE TABLE post_parents (
                id              INTEGER PRIMARY KEY,
                post_student_id INTEGER NOT NULL REFERENCES post_students(id) ON DELETE CASCADE,
                guardian_id     INTEGER NOT NULL REFERENCES guardians(id) ON DELETE CASCADE,
                push_pending    INTEGER NOT NULL DEFAULT 1,
                viewed_at       TEXT,
                UNIQUE(post_student_id, guardian_id)
            );

            CREATE INDEX idx_post_parents_guardian
                ON post_parents(guardian_id);

            CREATE INDEX idx_post_parents_pending
                ON post_parents(push_pending) WHERE viewed_at IS NULL;

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
