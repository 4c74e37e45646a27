use parlor_common::ErrorCode;
use thiserror::Error;

/// A well-formed request refused by naming, authorization or membership
/// rules. State is never modified when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("register first")]
    NotRegistered,

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("message text is empty")]
    EmptyMessage,

    #[error("session is registered as '{registered}', request claims '{claimed}'")]
    IdentityMismatch { registered: String, claimed: String },

    #[error("group '{0}' does not exist")]
    GroupNotFound(String),

    #[error("group '{0}' already exists")]
    GroupExists(String),

    #[error("only the creator can change group '{0}'")]
    NotCreator(String),

    #[error("not a member of group '{0}'")]
    NotMember(String),

    #[error("already a member of group '{0}'")]
    AlreadyMember(String),

    #[error("the creator cannot leave group '{0}'; delete it instead")]
    CreatorCannotLeave(String),
}

impl PolicyViolation {
    pub fn code(&self) -> ErrorCode {
        match self {
            PolicyViolation::NotRegistered => ErrorCode::NotRegistered,
            PolicyViolation::InvalidName(_) => ErrorCode::InvalidName,
            PolicyViolation::EmptyMessage => ErrorCode::EmptyMessage,
            PolicyViolation::IdentityMismatch { .. } => ErrorCode::IdentityMismatch,
            PolicyViolation::GroupNotFound(_) => ErrorCode::GroupNotFound,
            PolicyViolation::GroupExists(_) => ErrorCode::GroupExists,
            PolicyViolation::NotCreator(_) => ErrorCode::NotCreator,
            PolicyViolation::NotMember(_) => ErrorCode::NotMember,
            PolicyViolation::AlreadyMember(_) => ErrorCode::AlreadyMember,
            PolicyViolation::CreatorCannotLeave(_) => ErrorCode::CreatorCannotLeave,
        }
    }
}

/// Snapshot read/write failures. In-memory state stays authoritative.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PersistenceError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
