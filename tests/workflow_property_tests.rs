//! Property-based tests for the approval state machine and the audit trail
//!
//! The pure properties run against `ApprovalStateMachine` directly. The last
//! property drives random operation sequences through the service and checks
//! that the persisted history always explains the stored status.

mod common;

use poa_approvals::{
    ApprovalError, ReportStore,
    auth::{Actor, ReviewScope},
    config::{ApprovalConfig, RoleNames},
    history::AuditTrail,
    planning::UserRecord,
    report::{PeriodType, ProgressReport, ReportStatus, ReportSubject},
    types::TimeStamp,
    workflow::{ApprovalStateMachine, ReviewDecision, TransitionEvent},
};
use proptest::prelude::*;

fn status_strategy() -> impl Strategy<Value = ReportStatus> {
    prop_oneof![
        Just(ReportStatus::Draft),
        Just(ReportStatus::Submitted),
        Just(ReportStatus::Approved),
        Just(ReportStatus::Rejected),
        Just(ReportStatus::Withdrawn),
    ]
}

fn event_strategy() -> impl Strategy<Value = TransitionEvent> {
    prop_oneof![
        Just(TransitionEvent::Submit),
        Just(TransitionEvent::Approve),
        Just(TransitionEvent::Reject),
        Just(TransitionEvent::Withdraw),
        Just(TransitionEvent::Modify),
    ]
}

// position along the workflow; terminal states share the last rank
fn rank(status: ReportStatus) -> u8 {
    match status {
        ReportStatus::Draft => 0,
        ReportStatus::Submitted => 1,
        ReportStatus::Approved | ReportStatus::Rejected | ReportStatus::Withdrawn => 2,
    }
}

fn reviewer() -> Actor {
    let user = UserRecord {
        id: "admin".into(),
        name: "Carla".into(),
        role_name: "Administrador".into(),
        department_id: None,
        permissions: vec![],
        active: true,
    };
    Actor::from_user(&user, &RoleNames::default())
}

fn report_in(status: ReportStatus) -> ProgressReport {
    ProgressReport {
        id: "report_1test".into(),
        subject: ReportSubject::Activity("act_1".into()),
        department_id: "dep_1".into(),
        period_type: PeriodType::Trimestral,
        period: "2024-Q1".into(),
        current_value: 10.0,
        target_value: 20.0,
        execution_percentage: 50.0,
        comments: None,
        status,
        reported_by_id: "tech_1".into(),
        reviewed_by_id: None,
        reviewed_at: None,
        review_comments: None,
        rejection_reason: None,
        attachments: vec![],
        created_at: TimeStamp::new(),
        updated_at: TimeStamp::new(),
    }
}

#[derive(Debug, Clone)]
enum Op {
    Submit,
    Withdraw,
    Approve,
    Reject,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Submit),
        Just(Op::Withdraw),
        Just(Op::Approve),
        Just(Op::Reject),
    ]
}

proptest! {
    /// Property: no event ever moves a report backwards along the workflow
    #[test]
    fn prop_transitions_only_move_forward(
        current in status_strategy(),
        event in event_strategy(),
    ) {
        if let Ok(next) = ApprovalStateMachine::next_status(current, event) {
            prop_assert!(rank(next) >= rank(current));
            prop_assert_eq!(next.is_terminal(), rank(next) == 2);
        }
    }

    /// Property: terminal statuses accept no event at all
    #[test]
    fn prop_terminal_statuses_are_stable(
        current in status_strategy(),
        events in prop::collection::vec(event_strategy(), 1..=8),
    ) {
        prop_assume!(current.is_terminal());
        for event in events {
            let outcome = ApprovalStateMachine::next_status(current, event);
            let is_invalid_transition =
                matches!(outcome, Err(ApprovalError::InvalidStateTransition { .. }));
            prop_assert!(is_invalid_transition);
        }
    }

    /// Property: review decisions apply to SUBMITTED reports only
    #[test]
    fn prop_reviews_require_submitted(current in status_strategy(), approve in any::<bool>()) {
        let decision = if approve {
            ReviewDecision::Approve { comments: None }
        } else {
            ReviewDecision::Reject {
                rejection_reason: "Falta evidencia".into(),
                comments: None,
            }
        };
        let report = report_in(current);
        let outcome = ApprovalStateMachine::apply_review(
            &report,
            &reviewer(),
            &ReviewScope::Unrestricted,
            &decision,
            TimeStamp::new(),
        );

        prop_assert_eq!(outcome.is_ok(), current == ReportStatus::Submitted);
        if let Ok(reviewed) = outcome {
            prop_assert_eq!(reviewed.reviewed_by_id.as_deref(), Some("admin"));
            prop_assert_eq!(reviewed.rejection_reason.is_some(), !approve);
        }
    }

    /// Property: rejection reasons are accepted exactly inside the configured bounds
    #[test]
    fn prop_rejection_reason_length_is_bounded(reason in "[a-zA-Záéíóúñ ]{0,40}") {
        let config = ApprovalConfig {
            rejection_reason_max: 30,
            ..ApprovalConfig::default()
        };
        let len = reason.trim().chars().count();
        let decision = ReviewDecision::Reject {
            rejection_reason: reason,
            comments: None,
        };
        let accepted = decision.validate(&config).is_ok();
        prop_assert_eq!(
            accepted,
            (config.rejection_reason_min..=config.rejection_reason_max).contains(&len)
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: after any sequence of operations the history replays to the
    /// stored status, its chain verifies, and it grows by one entry per
    /// successful operation
    #[test]
    fn prop_history_explains_stored_status(
        ops in prop::collection::vec(op_strategy(), 1..=6)
    ) {
        let h = common::harness().unwrap();
        let owner = h.actor("tech_1");
        let director = h.actor("dir_1");
        let report = h.draft_report("tech_1", "act_1");

        let mut committed = 1;
        for op in ops {
            let outcome = match op {
                Op::Submit => h.service.submit(&owner, &report.id),
                Op::Withdraw => h.service.withdraw(&owner, &report.id),
                Op::Approve => h.service.approve(&director, &report.id, None),
                Op::Reject => h.service.reject(
                    &director,
                    &report.id,
                    "Valores inconsistentes".into(),
                    None,
                ),
            };
            match outcome {
                Ok(_) => committed += 1,
                Err(err) => {
                    let is_invalid_transition =
                        matches!(err, ApprovalError::InvalidStateTransition { .. });
                    prop_assert!(is_invalid_transition);
                }
            }
        }

        let stored = h.service.store().find_by_id(&report.id).unwrap().unwrap();
        let history = h.service.store().history(&report.id).unwrap();
        prop_assert_eq!(history.len(), committed);
        prop_assert_eq!(AuditTrail::replay_status(&history), Some(stored.status));
        prop_assert!(AuditTrail::verify_chain(&history).is_ok());
    }
}
