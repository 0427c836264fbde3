//! Error taxonomy for the approval workflow
use super::report::ReportStatus;
use super::workflow::TransitionEvent;
use sled::transaction::TransactionError;

#[derive(thiserror::Error, Debug)]
pub enum ApprovalError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Report cannot be {event}. Current status: {current}")]
    InvalidStateTransition {
        current: ReportStatus,
        event: TransitionEvent,
    },
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Authentication required: {0}")]
    Unauthenticated(String),
    #[error("Storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("Encoding failure: {0}")]
    Encoding(String),
    #[error("Attachment I/O failure: {0}")]
    Attachment(#[from] std::io::Error),
    #[error("Internal failure: {0}")]
    Internal(String),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Rejection reason must be between {min} and {max} characters, got {len}")]
    RejectionReasonLength { len: usize, min: usize, max: usize },
    #[error("Comments must be at most {max} characters, got {len}")]
    CommentsTooLong { len: usize, max: usize },
    #[error("A progress report must reference an activity or an indicator")]
    MissingSubject,
    #[error("A progress report cannot reference both an activity and an indicator")]
    AmbiguousSubject,
    #[error("Period type is not set")]
    MissingPeriodType,
    #[error("Period label must not be empty")]
    EmptyPeriod,
    #[error("{0} must be a finite, non-negative number")]
    InvalidValue(&'static str),
    #[error("Unknown report status: {0}")]
    UnknownStatus(String),
    #[error("Status {0:?} belongs to the legacy vocabulary and must be migrated explicitly")]
    LegacyStatus(String),
    #[error("Invalid page request: page {page}, limit {limit}")]
    InvalidPage { page: usize, limit: usize },
    #[error("Attachment filename must not be empty")]
    EmptyFilename,
    #[error("Malformed request body: {0}")]
    MalformedBody(String),
    #[error("Unknown permission {kind}: {value}")]
    UnknownPermission { kind: &'static str, value: String },
}

impl ApprovalError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn encoding(err: impl std::fmt::Display) -> Self {
        Self::Encoding(err.to_string())
    }

    /// HTTP status the web layer answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::InvalidStateTransition { .. } | Self::Validation(_) => 400,
            Self::Forbidden(_) => 403,
            Self::Unauthenticated(_) => 401,
            Self::Storage(_) | Self::Encoding(_) | Self::Attachment(_) | Self::Internal(_) => 500,
        }
    }
}

impl From<TransactionError<ApprovalError>> for ApprovalError {
    fn from(value: TransactionError<ApprovalError>) -> Self {
        match value {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => Self::Storage(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(ApprovalError::not_found("progress report", "r1").status_code(), 404);
        assert_eq!(ApprovalError::forbidden("nope").status_code(), 403);
        assert_eq!(
            ApprovalError::from(ValidationError::EmptyPeriod).status_code(),
            400
        );
        let err = ApprovalError::InvalidStateTransition {
            current: ReportStatus::Approved,
            event: TransitionEvent::Reject,
        };
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("APPROVED"));
    }
}
