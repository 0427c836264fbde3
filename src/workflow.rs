//! Approval state machine for progress reports
//!
//! ```text
//! DRAFT --submit--> SUBMITTED --approve--> APPROVED
//!   |                    \-----reject----> REJECTED
//!   \--withdraw--> WITHDRAWN
//! ```
//!
//! DRAFT is the only editable state. APPROVED, REJECTED and WITHDRAWN are
//! terminal: no event leads out of them.
use super::auth::{Actor, ReviewScope};
use super::config::ApprovalConfig;
use super::error::{ApprovalError, ValidationError};
use super::history::HistoryAction;
use super::report::{ProgressReport, ReportChanges, ReportStatus, check_comments};
use super::types::TimeStamp;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionEvent {
    Submit,
    Approve,
    Reject,
    Withdraw,
    Modify,
}

impl TransitionEvent {
    pub fn history_action(self) -> HistoryAction {
        match self {
            Self::Submit => HistoryAction::Submitted,
            Self::Approve => HistoryAction::Approved,
            Self::Reject => HistoryAction::Rejected,
            Self::Withdraw => HistoryAction::Withdrawn,
            Self::Modify => HistoryAction::Modified,
        }
    }
}

impl fmt::Display for TransitionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Self::Submit => "submitted",
            Self::Approve => "approved",
            Self::Reject => "rejected",
            Self::Withdraw => "withdrawn",
            Self::Modify => "modified",
        };
        f.write_str(verb)
    }
}

/// A reviewer's decision on a SUBMITTED report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve {
        comments: Option<String>,
    },
    Reject {
        rejection_reason: String,
        comments: Option<String>,
    },
}

impl ReviewDecision {
    pub fn event(&self) -> TransitionEvent {
        match self {
            Self::Approve { .. } => TransitionEvent::Approve,
            Self::Reject { .. } => TransitionEvent::Reject,
        }
    }

    pub fn comments(&self) -> Option<&str> {
        match self {
            Self::Approve { comments } | Self::Reject { comments, .. } => comments.as_deref(),
        }
    }

    pub fn validate(&self, config: &ApprovalConfig) -> Result<(), ValidationError> {
        if let Self::Reject {
            rejection_reason, ..
        } = self
        {
            let len = rejection_reason.trim().chars().count();
            if len < config.rejection_reason_min || len > config.rejection_reason_max {
                return Err(ValidationError::RejectionReasonLength {
                    len,
                    min: config.rejection_reason_min,
                    max: config.rejection_reason_max,
                });
            }
        }
        check_comments(self.comments(), config.comments_max)
    }
}

pub struct ApprovalStateMachine;

impl ApprovalStateMachine {
    pub fn next_status(
        current: ReportStatus,
        event: TransitionEvent,
    ) -> Result<ReportStatus, ApprovalError> {
        use ReportStatus::*;
        use TransitionEvent::*;

        match (current, event) {
            (Draft, Submit) => Ok(Submitted),
            (Draft, Withdraw) => Ok(Withdrawn),
            (Draft, Modify) => Ok(Draft),
            (Submitted, Approve) => Ok(Approved),
            (Submitted, Reject) => Ok(Rejected),
            (current, event) => Err(ApprovalError::InvalidStateTransition { current, event }),
        }
    }

    pub fn ensure_owner(report: &ProgressReport, actor: &Actor) -> Result<(), ApprovalError> {
        if report.is_owned_by(&actor.user_id) {
            return Ok(());
        }
        Err(ApprovalError::forbidden(format!(
            "only the reporting user may change report {}",
            report.id
        )))
    }

    pub fn ensure_in_scope(
        report: &ProgressReport,
        scope: &ReviewScope,
    ) -> Result<(), ApprovalError> {
        if scope.covers(&report.department_id) {
            return Ok(());
        }
        Err(ApprovalError::forbidden(format!(
            "report {} belongs to another department",
            report.id
        )))
    }

    /// Owner moves a DRAFT report to SUBMITTED or WITHDRAWN.
    pub fn apply_owner_event(
        report: &ProgressReport,
        actor: &Actor,
        event: TransitionEvent,
        at: TimeStamp,
    ) -> Result<ProgressReport, ApprovalError> {
        Self::ensure_owner(report, actor)?;
        let status = Self::next_status(report.status, event)?;

        let mut next = report.clone();
        next.status = status;
        next.updated_at = at;
        Ok(next)
    }

    pub fn apply_changes(
        report: &ProgressReport,
        actor: &Actor,
        changes: &ReportChanges,
        at: TimeStamp,
    ) -> Result<ProgressReport, ApprovalError> {
        Self::ensure_owner(report, actor)?;
        Self::next_status(report.status, TransitionEvent::Modify)?;

        let mut next = report.clone();
        changes.apply_to(&mut next);
        next.updated_at = at;
        Ok(next)
    }

    /// Department scope is checked before status, so out-of-scope reviewers
    /// learn nothing about the report's progress.
    pub fn apply_review(
        report: &ProgressReport,
        reviewer: &Actor,
        scope: &ReviewScope,
        decision: &ReviewDecision,
        at: TimeStamp,
    ) -> Result<ProgressReport, ApprovalError> {
        Self::ensure_in_scope(report, scope)?;
        let status = Self::next_status(report.status, decision.event())?;

        let mut next = report.clone();
        next.status = status;
        next.reviewed_by_id = Some(reviewer.user_id.clone());
        next.reviewed_at = Some(at.clone());
        next.review_comments = decision.comments().map(str::to_string);
        next.rejection_reason = match decision {
            ReviewDecision::Reject {
                rejection_reason, ..
            } => Some(rejection_reason.trim().to_string()),
            ReviewDecision::Approve { .. } => None,
        };
        next.updated_at = at;
        Ok(next)
    }
}
