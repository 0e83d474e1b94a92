use thiserror::Error;

/// Error type for every noticeboard storage operation.
#[derive(Debug, Error)]
pub enum NoticeError {
    /// The entity is absent or belongs to another school. The two cases are
    /// indistinguishable to the caller.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// Rejected before any write happened.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("database lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, NoticeError>;
