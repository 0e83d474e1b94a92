use serde::{Deserialize, Serialize};

use crate::models::{GuardianId, StudentId};

/// Events published by the guardian directory when its link table changes.
///
/// The directory owns guardians and their student links; the noticeboard only
/// reacts so that delivery records follow the links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DirectoryEvent {
    /// A guardian was linked to a student. Every post already targeting the
    /// student owes this guardian a delivery record.
    GuardianLinked {
        student_id: StudentId,
        guardian_id: GuardianId,
    },
}
