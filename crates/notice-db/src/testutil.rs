use std::cell::Cell;
use std::collections::BTreeSet;

use chrono::Utc;
use notice_types::models::{
    AdminId, GroupId, GuardianId, PostId, Priority, RecipientId, SchoolId, StudentId,
};

use crate::Database;
use crate::delivery::{deliveries_for_post, record_view};
use crate::directory::{
    NewStudent, add_group_member, insert_admin, insert_group, insert_guardian, insert_school,
    insert_student, link_guardian,
};
use crate::models::{DeliveryRow, MaterializeOutcome, PostDraft, RecipientKey, Targeting};
use crate::posts::create_post;

/// An in-memory database with one school and one admin.
pub struct Fixture {
    pub db: Database,
    pub school: SchoolId,
    pub admin: AdminId,
    schools: Cell<u32>,
}

impl Fixture {
    pub fn new() -> Self {
        let db = Database::open_in_memory().unwrap();
        let (school, admin) = db
            .with_conn(|c| {
                let school = insert_school(c, "Riverside Primary")?;
                let admin = insert_admin(c, school, "office@riverside.test", "Office")?;
                Ok((school, admin))
            })
            .unwrap();
        Self {
            db,
            school,
            admin,
            schools: Cell::new(1),
        }
    }

    // -- Directory --

    pub fn other_school(&self) -> SchoolId {
        let n = self.schools.get() + 1;
        self.schools.set(n);
        self.db
            .with_conn(|c| insert_school(c, &format!("School {}", n)))
            .unwrap()
    }

    pub fn group(&self, name: &str, parent: Option<GroupId>) -> GroupId {
        self.foreign_group(self.school, name, parent)
    }

    pub fn foreign_group(&self, school: SchoolId, name: &str, parent: Option<GroupId>) -> GroupId {
        self.db
            .with_conn(|c| insert_group(c, school, name, parent))
            .unwrap()
    }

    pub fn set_parent(&self, group: GroupId, parent: Option<GroupId>) {
        self.db
            .with_conn(|c| {
                c.execute(
                    "UPDATE student_groups SET parent_group_id = ?1 WHERE id = ?2",
                    rusqlite::params![parent, group],
                )?;
                Ok(())
            })
            .unwrap();
    }

    pub fn student(&self, number: &str) -> StudentId {
        self.insert_student(self.school, number, None)
    }

    pub fn student_with_email(&self, number: &str, email: &str) -> StudentId {
        self.insert_student(self.school, number, Some(email))
    }

    pub fn foreign_student(&self, school: SchoolId, number: &str) -> StudentId {
        self.insert_student(school, number, None)
    }

    fn insert_student(&self, school: SchoolId, number: &str, email: Option<&str>) -> StudentId {
        let student = NewStudent {
            student_number: number,
            email,
            first_name: "Kid",
            last_name: number,
        };
        self.db
            .with_conn(|c| insert_student(c, school, &student))
            .unwrap()
    }

    pub fn guardian(&self, email: &str) -> GuardianId {
        self.foreign_guardian(self.school, email)
    }

    pub fn foreign_guardian(&self, school: SchoolId, email: &str) -> GuardianId {
        self.db
            .with_conn(|c| insert_guardian(c, school, email, email))
            .unwrap()
    }

    pub fn link(&self, guardian: GuardianId, student: StudentId) {
        self.db
            .with_conn(|c| link_guardian(c, guardian, student))
            .unwrap();
    }

    pub fn add_member(&self, group: GroupId, student: StudentId) {
        self.db
            .with_conn(|c| add_group_member(c, group, student))
            .unwrap();
    }

    // -- Posts --

    pub fn post(&self, targeting: Targeting) -> (PostId, MaterializeOutcome) {
        let draft = PostDraft {
            title: "Sports day".into(),
            body: "Sports day is on Friday.".into(),
            priority: Priority::Medium,
            image_key: None,
        };
        self.db
            .with_tx(|c| create_post(c, self.school, self.admin, &draft, &targeting, Utc::now()))
            .unwrap()
    }

    pub fn post_count(&self) -> i64 {
        self.db
            .with_conn(|c| Ok(c.query_row("SELECT COUNT(*) FROM posts", [], |r| r.get(0))?))
            .unwrap()
    }

    pub fn recipient_keys(&self, post: PostId) -> BTreeSet<RecipientKey> {
        self.db
            .with_conn(|c| {
                let mut stmt = c.prepare(
                    "SELECT student_id, origin_group_id FROM post_students WHERE post_id = ?1",
                )?;
                let keys = stmt
                    .query_map([post], |row| {
                        Ok(RecipientKey {
                            student_id: row.get(0)?,
                            origin_group_id: row.get(1)?,
                        })
                    })?
                    .collect::<std::result::Result<BTreeSet<_>, _>>()?;
                Ok(keys)
            })
            .unwrap()
    }

    pub fn recipient_id(
        &self,
        post: PostId,
        student: StudentId,
        group: Option<GroupId>,
    ) -> RecipientId {
        self.db
            .with_conn(|c| {
                Ok(c.query_row(
                    "SELECT id FROM post_students
                     WHERE post_id = ?1 AND student_id = ?2 AND origin_group_id IS ?3",
                    rusqlite::params![post, student, group],
                    |r| r.get(0),
                )?)
            })
            .unwrap()
    }

    pub fn deliveries(&self, post: PostId) -> Vec<DeliveryRow> {
        self.db.with_conn(|c| deliveries_for_post(c, post)).unwrap()
    }

    /// `(recipient key, guardian)` for every delivery row of the post.
    pub fn delivery_pairs(&self, post: PostId) -> BTreeSet<(RecipientKey, GuardianId)> {
        self.db
            .with_conn(|c| {
                let mut stmt = c.prepare(
                    "SELECT ps.student_id, ps.origin_group_id, pp.guardian_id
                     FROM post_parents pp
                     JOIN post_students ps ON ps.id = pp.post_student_id
                     WHERE ps.post_id = ?1",
                )?;
                let pairs = stmt
                    .query_map([post], |row| {
                        Ok((
                            RecipientKey {
                                student_id: row.get(0)?,
                                origin_group_id: row.get(1)?,
                            },
                            row.get(2)?,
                        ))
                    })?
                    .collect::<std::result::Result<BTreeSet<_>, _>>()?;
                Ok(pairs)
            })
            .unwrap()
    }

    pub fn mark_all_notified(&self, post: PostId) {
        self.db
            .with_conn(|c| {
                c.execute(
                    "UPDATE post_parents SET push_pending = 0
                     WHERE post_student_id IN (SELECT id FROM post_students WHERE post_id = ?1)",
                    [post],
                )?;
                Ok(())
            })
            .unwrap();
    }

    /// The guardian opens the post for all of their children.
    pub fn view(&self, post: PostId, guardian: GuardianId) {
        self.db
            .with_tx(|c| record_view(c, self.school, post, guardian, None, Utc::now()))
            .unwrap();
    }
}
