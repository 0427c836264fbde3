//! Service layer API for progress report workflow operations
use super::attachments::AttachmentStore;
use super::auth::{Action, Actor, AuthorizationGate, Resource, ReviewScope};
use super::config::ApprovalConfig;
use super::error::{ApprovalError, ValidationError};
use super::history::{HistoryAction, HistoryEntry};
use super::outbox::{DefaultEffectHandler, EffectHandler, OutboxRelay, RelayReport, SideEffect};
use super::planning::PlanningDirectory;
use super::report::{ProgressReport, ProgressReportDraft, ReportChanges, ReportStatus};
use super::store::{Page, Paginated, ReportFilter, ReportStore, StagedTransition};
use super::types::TimeStamp;
use super::utils::new_uuid_to_bech32;
use super::workflow::{ApprovalStateMachine, ReviewDecision, TransitionEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStats {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub total: usize,
    pub approval_rate: f64, // percent of total, two decimals
}

impl ApprovalStats {
    pub fn from_counts(pending: usize, approved: usize, rejected: usize) -> Self {
        let total = pending + approved + rejected;
        let approval_rate = if total == 0 {
            0.0
        } else {
            ((approved as f64 / total as f64) * 100.0 * 100.0).round() / 100.0
        };
        Self {
            pending,
            approved,
            rejected,
            total,
            approval_rate,
        }
    }
}

pub struct ApprovalService<S> {
    store: Arc<S>,
    gate: AuthorizationGate,
    config: ApprovalConfig,
    attachments: AttachmentStore,
}

impl<S: ReportStore + PlanningDirectory> ApprovalService<S> {
    pub fn new(store: Arc<S>, config: ApprovalConfig) -> Self {
        let attachments = AttachmentStore::new(config.attachment_dir.clone());
        Self {
            store,
            gate: AuthorizationGate::new(),
            config,
            attachments,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ApprovalConfig {
        &self.config
    }

    pub fn effect_handler(&self) -> DefaultEffectHandler {
        DefaultEffectHandler::new(self.attachments.clone())
    }

    /// Resolve a user id into an actor with its permission set attached.
    pub fn actor(&self, user_id: &str) -> Result<Actor, ApprovalError> {
        let user = self
            .store
            .find_user(user_id)?
            .filter(|user| user.active)
            .ok_or_else(|| {
                ApprovalError::Unauthenticated(format!("unknown or inactive user {user_id}"))
            })?;
        Ok(Actor::from_user(&user, &self.config.roles))
    }

    /// Create a DRAFT report for an activity or indicator the actor is assigned to
    pub fn create_report(
        &self,
        actor: &Actor,
        draft: ProgressReportDraft,
    ) -> Result<ProgressReport, ApprovalError> {
        self.gate
            .require(actor, Action::Create, Resource::ProgressReport)?;
        let subject = draft.validate(self.config.comments_max)?;

        let scope = self.store.subject_scope(&subject)?;
        if !actor.is_administrator() && !scope.assignees.contains(&actor.user_id) {
            return Err(ApprovalError::forbidden(format!(
                "user {} is not assigned to {subject:?}",
                actor.user_id
            )));
        }

        let report = draft.into_report(
            new_uuid_to_bech32("report_")?,
            subject,
            scope.department_id,
            actor.user_id.clone(),
            TimeStamp::new(),
        )?;
        self.store.insert(&report, actor)?;

        tracing::info!(
            report = %report.id,
            user = %actor.user_id,
            department = %report.department_id,
            "progress report created"
        );
        Ok(report)
    }

    /// Owner edits while the report is still a DRAFT
    pub fn modify_report(
        &self,
        actor: &Actor,
        report_id: &str,
        changes: &ReportChanges,
    ) -> Result<ProgressReport, ApprovalError> {
        changes.validate(self.config.comments_max)?;

        let (report, _) = self.store.transition(report_id, actor, &|current| {
            Ok(StagedTransition {
                report: ApprovalStateMachine::apply_changes(
                    current,
                    actor,
                    changes,
                    TimeStamp::new(),
                )?,
                action: HistoryAction::Modified,
                comments: None,
                effects: vec![],
            })
        })?;

        tracing::debug!(report = %report.id, user = %actor.user_id, "progress report modified");
        Ok(report)
    }

    pub fn submit(&self, actor: &Actor, report_id: &str) -> Result<ProgressReport, ApprovalError> {
        self.owner_event(actor, report_id, TransitionEvent::Submit)
    }

    pub fn withdraw(
        &self,
        actor: &Actor,
        report_id: &str,
    ) -> Result<ProgressReport, ApprovalError> {
        self.owner_event(actor, report_id, TransitionEvent::Withdraw)
    }

    fn owner_event(
        &self,
        actor: &Actor,
        report_id: &str,
        event: TransitionEvent,
    ) -> Result<ProgressReport, ApprovalError> {
        let (report, _) = self.store.transition(report_id, actor, &|current| {
            Ok(StagedTransition {
                report: ApprovalStateMachine::apply_owner_event(
                    current,
                    actor,
                    event,
                    TimeStamp::new(),
                )?,
                action: event.history_action(),
                comments: None,
                effects: vec![],
            })
        })?;

        tracing::info!(
            report = %report.id,
            user = %actor.user_id,
            status = %report.status,
            "progress report {event}"
        );
        Ok(report)
    }

    /// Approve or reject a SUBMITTED report
    pub fn review(
        &self,
        actor: &Actor,
        report_id: &str,
        decision: ReviewDecision,
    ) -> Result<ProgressReport, ApprovalError> {
        self.gate
            .require(actor, Action::Approve, Resource::ProgressReport)?;
        decision.validate(&self.config)?;
        let scope = self.gate.review_scope(actor);

        let comments = match &decision {
            ReviewDecision::Reject {
                rejection_reason,
                comments: None,
            } => Some(rejection_reason.trim().to_string()),
            other => other.comments().map(str::to_string),
        };

        let (report, entry) = self.store.transition(report_id, actor, &|current| {
            let report = ApprovalStateMachine::apply_review(
                current,
                actor,
                &scope,
                &decision,
                TimeStamp::new(),
            )?;
            let effects = vec![SideEffect::NotifyReviewed {
                report_id: report.id.clone(),
                recipient_id: report.reported_by_id.clone(),
                status: report.status,
            }];
            Ok(StagedTransition {
                report,
                action: decision.event().history_action(),
                comments: comments.clone(),
                effects,
            })
        })?;

        tracing::info!(
            report = %report.id,
            reviewer = %actor.user_id,
            status = %report.status,
            entry = %entry.id,
            "progress report reviewed"
        );
        Ok(report)
    }

    pub fn approve(
        &self,
        actor: &Actor,
        report_id: &str,
        comments: Option<String>,
    ) -> Result<ProgressReport, ApprovalError> {
        self.review(actor, report_id, ReviewDecision::Approve { comments })
    }

    pub fn reject(
        &self,
        actor: &Actor,
        report_id: &str,
        rejection_reason: String,
        comments: Option<String>,
    ) -> Result<ProgressReport, ApprovalError> {
        self.review(
            actor,
            report_id,
            ReviewDecision::Reject {
                rejection_reason,
                comments,
            },
        )
    }

    /// Store a file and record it on a DRAFT report. The file is removed
    /// again if the report cannot take it.
    pub fn add_attachment(
        &self,
        actor: &Actor,
        report_id: &str,
        filename: &str,
        mimetype: &str,
        contents: &[u8],
    ) -> Result<ProgressReport, ApprovalError> {
        let current = self
            .store
            .find_by_id(report_id)?
            .ok_or_else(|| ApprovalError::not_found("progress report", report_id))?;
        ApprovalStateMachine::ensure_owner(&current, actor)?;

        let attachment = self
            .attachments
            .save(report_id, filename, mimetype, contents)?;

        let result = self.store.transition(report_id, actor, &|current| {
            let mut report = ApprovalStateMachine::apply_changes(
                current,
                actor,
                &ReportChanges::default(),
                TimeStamp::new(),
            )?;
            report.attachments.push(attachment.clone());
            Ok(StagedTransition {
                report,
                action: HistoryAction::Modified,
                comments: Some(format!("attachment added: {}", attachment.filename)),
                effects: vec![],
            })
        });

        match result {
            Ok((report, _)) => Ok(report),
            Err(err) => {
                self.attachments.remove_best_effort(&attachment.path);
                Err(err)
            }
        }
    }

    /// Owners may delete their own DRAFT reports, administrators any report.
    /// Attachment files are cleaned up through the outbox.
    pub fn delete_report(
        &self,
        actor: &Actor,
        report_id: &str,
    ) -> Result<ProgressReport, ApprovalError> {
        let removed = self.store.delete(report_id, &|current| {
            let allowed = actor.is_administrator()
                || (current.is_owned_by(&actor.user_id) && current.status == ReportStatus::Draft);
            if !allowed {
                return Err(ApprovalError::forbidden(format!(
                    "report {} in status {} can only be deleted by an administrator",
                    current.id, current.status
                )));
            }
            Ok(current
                .attachments
                .iter()
                .map(|a| SideEffect::RemoveAttachment {
                    path: a.path.clone(),
                })
                .collect())
        })?;

        tracing::info!(
            report = %removed.id,
            user = %actor.user_id,
            status = %removed.status,
            "progress report deleted"
        );
        Ok(removed)
    }

    fn ensure_can_read(&self, actor: &Actor, report: &ProgressReport) -> Result<(), ApprovalError> {
        if report.is_owned_by(&actor.user_id) {
            return Ok(());
        }
        self.gate
            .require(actor, Action::Read, Resource::ProgressReport)?;
        ApprovalStateMachine::ensure_in_scope(report, &self.gate.review_scope(actor))
    }

    pub fn get_report(
        &self,
        actor: &Actor,
        report_id: &str,
    ) -> Result<ProgressReport, ApprovalError> {
        let report = self
            .store
            .find_by_id(report_id)?
            .ok_or_else(|| ApprovalError::not_found("progress report", report_id))?;
        self.ensure_can_read(actor, &report)?;
        Ok(report)
    }

    /// Approval history of a report, oldest first. Administrators can still
    /// read it after the report has been deleted.
    pub fn history(
        &self,
        actor: &Actor,
        report_id: &str,
    ) -> Result<Vec<HistoryEntry>, ApprovalError> {
        let not_found = || ApprovalError::not_found("progress report", report_id);
        match self.store.find_by_id(report_id)? {
            Some(report) => self.ensure_can_read(actor, &report)?,
            None if actor.is_administrator() => {}
            None => return Err(not_found()),
        }

        let entries = self.store.history(report_id)?;
        if entries.is_empty() {
            return Err(not_found());
        }
        Ok(entries)
    }

    fn resolve_page(&self, request: PageRequest) -> Result<Page, ValidationError> {
        let page = request.page.unwrap_or(1);
        let limit = request.limit.unwrap_or(self.config.default_page_size);
        let resolved = Page { page, limit };
        if limit == 0 || limit > self.config.max_page_size || resolved.offset().is_none() {
            return Err(ValidationError::InvalidPage { page, limit });
        }
        Ok(resolved)
    }

    /// SUBMITTED reports awaiting review, limited to the actor's department
    /// for area directors.
    pub fn pending(
        &self,
        actor: &Actor,
        request: PageRequest,
    ) -> Result<Paginated<ProgressReport>, ApprovalError> {
        self.gate
            .require(actor, Action::Approve, Resource::ProgressReport)?;
        let page = self.resolve_page(request)?;

        let scope = self.gate.review_scope(actor);
        if scope == ReviewScope::Nothing {
            return Ok(Paginated::new(vec![], 0, page));
        }

        let filter = ReportFilter::default()
            .with_status(ReportStatus::Submitted)
            .in_department(scope.department());
        let total = self.store.count(&filter)?;
        let items = self.store.list(&filter, Some(page))?;
        Ok(Paginated::new(items, total, page))
    }

    /// Review counts; directors always see their own department only.
    pub fn stats(
        &self,
        actor: &Actor,
        department_id: Option<&str>,
    ) -> Result<ApprovalStats, ApprovalError> {
        self.gate
            .require(actor, Action::Read, Resource::ProgressReport)?;

        let department = match self.gate.review_scope(actor) {
            ReviewScope::Unrestricted => department_id.map(str::to_string),
            ReviewScope::Department(own) => Some(own),
            ReviewScope::Nothing => {
                return Err(ApprovalError::forbidden(
                    "area director has no department on record",
                ));
            }
        };

        let scoped = ReportFilter::default().in_department(department.as_deref());
        let count = |status| self.store.count(&scoped.clone().with_status(status));
        Ok(ApprovalStats::from_counts(
            count(ReportStatus::Submitted)?,
            count(ReportStatus::Approved)?,
            count(ReportStatus::Rejected)?,
        ))
    }

    pub fn relay_outbox(
        &self,
        handler: &dyn EffectHandler,
        batch: usize,
    ) -> Result<RelayReport, ApprovalError> {
        OutboxRelay::drain(self.store.as_ref(), handler, batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_rate_is_share_of_total() {
        let stats = ApprovalStats::from_counts(1, 2, 0);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.approval_rate, 66.67);
        assert_eq!(ApprovalStats::from_counts(0, 0, 0).approval_rate, 0.0);
    }
}
