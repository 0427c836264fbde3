//! Append-only approval history
//!
//! Every entry is sealed with a sha256 digest over its CBOR encoding, chained
//! to the digest of the previous entry of the same report.
use super::auth::Actor;
use super::error::ApprovalError;
use super::report::ReportStatus;
use super::types::TimeStamp;
use super::utils::{encode_record, new_sequence_id};
use serde::Serialize;

#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryAction {
    #[n(0)]
    Created,
    #[n(1)]
    Submitted,
    #[n(2)]
    Approved,
    #[n(3)]
    Rejected,
    #[n(4)]
    Withdrawn,
    #[n(5)]
    Modified,
}

impl HistoryAction {
    /// Status a report holds after this action, `None` when it keeps its status.
    pub fn resulting_status(&self) -> Option<ReportStatus> {
        match self {
            Self::Created => Some(ReportStatus::Draft),
            Self::Submitted => Some(ReportStatus::Submitted),
            Self::Approved => Some(ReportStatus::Approved),
            Self::Rejected => Some(ReportStatus::Rejected),
            Self::Withdrawn => Some(ReportStatus::Withdrawn),
            Self::Modified => None,
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[n(0)]
    pub id: String, // hyphenated uuid7, sorts by creation
    #[n(1)]
    pub report_id: String,
    #[n(2)]
    pub action: HistoryAction,
    #[n(3)]
    pub comments: Option<String>,
    #[n(4)]
    pub action_by_id: String,
    #[n(5)]
    pub action_by_name: String,
    #[n(6)]
    pub action_by_role: String,
    #[n(7)]
    pub timestamp: TimeStamp,
    #[n(8)]
    pub prev_digest: Option<String>,
    #[n(9)]
    pub digest: String,
}

impl HistoryEntry {
    pub fn seal(
        report_id: &str,
        action: HistoryAction,
        comments: Option<String>,
        actor: &Actor,
        timestamp: TimeStamp,
        prev_digest: Option<String>,
    ) -> Result<Self, ApprovalError> {
        let mut entry = Self {
            id: new_sequence_id(),
            report_id: report_id.to_string(),
            action,
            comments,
            action_by_id: actor.user_id.clone(),
            action_by_name: actor.name.clone(),
            action_by_role: actor.role_name.clone(),
            timestamp,
            prev_digest,
            digest: String::new(),
        };
        entry.digest = entry.compute_digest()?;
        Ok(entry)
    }

    /// Digest of the entry with its own `digest` field blanked.
    pub fn compute_digest(&self) -> Result<String, ApprovalError> {
        let unsealed = Self {
            digest: String::new(),
            ..self.clone()
        };
        let cbor = encode_record(&unsealed)?;
        Ok(sha256::digest(&cbor))
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ChainError {
    #[error("entry {0} does not match its digest")]
    TamperedEntry(String),
    #[error("entry {0} does not link to its predecessor")]
    BrokenLink(String),
    #[error("entry {0} belongs to another report")]
    ForeignEntry(String),
}

pub struct AuditTrail;

impl AuditTrail {
    /// Status implied by replaying a history in order.
    pub fn replay_status(entries: &[HistoryEntry]) -> Option<ReportStatus> {
        entries
            .iter()
            .fold(None, |status, entry| entry.action.resulting_status().or(status))
    }

    pub fn verify_chain(entries: &[HistoryEntry]) -> Result<(), ChainError> {
        let mut prev: Option<&HistoryEntry> = None;
        for entry in entries {
            if prev.is_some_and(|p| p.report_id != entry.report_id) {
                return Err(ChainError::ForeignEntry(entry.id.clone()));
            }
            let expected = prev.map(|p| p.digest.as_str());
            if entry.prev_digest.as_deref() != expected {
                return Err(ChainError::BrokenLink(entry.id.clone()));
            }
            match entry.compute_digest() {
                Ok(digest) if digest == entry.digest => {}
                _ => return Err(ChainError::TamperedEntry(entry.id.clone())),
            }
            prev = Some(entry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use std::collections::BTreeSet;

    fn actor() -> Actor {
        Actor {
            user_id: "user_1".into(),
            name: "Ana".into(),
            role: Role::AreaDirector,
            role_name: "Director de Área".into(),
            department_id: Some("dep_1".into()),
            permissions: BTreeSet::new(),
        }
    }

    fn chain(actions: &[HistoryAction]) -> Vec<HistoryEntry> {
        let mut entries: Vec<HistoryEntry> = vec![];
        for action in actions {
            let prev = entries.last().map(|e| e.digest.clone());
            let entry =
                HistoryEntry::seal("report_1", *action, None, &actor(), TimeStamp::new(), prev)
                    .unwrap();
            entries.push(entry);
        }
        entries
    }

    #[test]
    fn sealed_chain_verifies() {
        let entries = chain(&[
            HistoryAction::Created,
            HistoryAction::Modified,
            HistoryAction::Submitted,
            HistoryAction::Approved,
        ]);
        assert_eq!(AuditTrail::verify_chain(&entries), Ok(()));
        assert_eq!(
            AuditTrail::replay_status(&entries),
            Some(ReportStatus::Approved)
        );
        assert_eq!(entries[3].action_by_role, "Director de Área");
    }

    #[test]
    fn tampering_is_detected() {
        let mut entries = chain(&[HistoryAction::Created, HistoryAction::Submitted]);
        entries[1].comments = Some("edited later".into());
        assert_eq!(
            AuditTrail::verify_chain(&entries),
            Err(ChainError::TamperedEntry(entries[1].id.clone()))
        );
    }

    #[test]
    fn removed_entries_break_the_chain() {
        let entries = chain(&[
            HistoryAction::Created,
            HistoryAction::Submitted,
            HistoryAction::Rejected,
        ]);
        let gapped = vec![entries[0].clone(), entries[2].clone()];
        assert_eq!(
            AuditTrail::verify_chain(&gapped),
            Err(ChainError::BrokenLink(entries[2].id.clone()))
        );
    }

    #[test]
    fn modifications_keep_status() {
        let entries = chain(&[HistoryAction::Created, HistoryAction::Modified]);
        assert_eq!(AuditTrail::replay_status(&entries), Some(ReportStatus::Draft));
        assert_eq!(AuditTrail::replay_status(&[]), None);
    }
}
