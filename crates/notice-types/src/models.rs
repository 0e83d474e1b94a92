use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub type SchoolId = i64;
pub type AdminId = i64;
pub type PostId = i64;
pub type StudentId = i64;
pub type GuardianId = i64;
pub type GroupId = i64;
/// Row id of a `post_students` record.
pub type RecipientId = i64;
/// Row id of a `post_parents` record.
pub type DeliveryId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    /// Case-insensitive, surrounding whitespace ignored (import rows are hand-typed).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

/// Who a bearer token speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Guardian,
    /// Internal callers: the notification worker and the guardian directory.
    Service,
}

/// Lifecycle of a single guardian delivery record.
///
/// `Read` is terminal: once `viewed_at` is set nothing moves the record again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Pending,
    Notified,
    Read,
}

impl DeliveryState {
    pub fn from_flags(push_pending: bool, viewed: bool) -> Self {
        match (viewed, push_pending) {
            (true, _) => Self::Read,
            (false, true) => Self::Pending,
            (false, false) => Self::Notified,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Any row error aborts the whole import.
    #[default]
    Strict,
    /// Bad rows are reported, good rows are imported.
    Lenient,
}
