//! Best-effort side effects
//!
//! Effects are written to the outbox tree inside the same transaction as the
//! report change, then delivered by [`OutboxRelay`]. A failed delivery is
//! logged and dropped; it never reaches back into the report.
use super::attachments::AttachmentStore;
use super::error::ApprovalError;
use super::report::ReportStatus;
use super::store::ReportStore;
use super::types::TimeStamp;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    #[n(0)]
    NotifyReviewed {
        #[n(0)]
        report_id: String,
        #[n(1)]
        recipient_id: String,
        #[n(2)]
        status: ReportStatus,
    },
    #[n(1)]
    RemoveAttachment {
        #[n(0)]
        path: String,
    },
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct OutboxRecord {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub effect: SideEffect,
    #[n(2)]
    pub enqueued_at: TimeStamp,
}

pub trait EffectHandler {
    fn handle(&self, effect: &SideEffect) -> anyhow::Result<()>;
}

/// Logs review notifications and deletes attachment files.
#[derive(Debug, Clone)]
pub struct DefaultEffectHandler {
    attachments: AttachmentStore,
}

impl DefaultEffectHandler {
    pub fn new(attachments: AttachmentStore) -> Self {
        Self { attachments }
    }
}

impl EffectHandler for DefaultEffectHandler {
    fn handle(&self, effect: &SideEffect) -> anyhow::Result<()> {
        match effect {
            SideEffect::NotifyReviewed {
                report_id,
                recipient_id,
                status,
            } => {
                tracing::info!(
                    report = %report_id,
                    recipient = %recipient_id,
                    %status,
                    "report reviewed"
                );
                Ok(())
            }
            SideEffect::RemoveAttachment { path } => Ok(self.attachments.remove(path)?),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct OutboxRelay;

impl OutboxRelay {
    /// Delivers up to `batch` pending effects, oldest first.
    pub fn drain<S: ReportStore + ?Sized>(
        store: &S,
        handler: &dyn EffectHandler,
        batch: usize,
    ) -> Result<RelayReport, ApprovalError> {
        let mut report = RelayReport::default();
        for record in store.pending_effects(batch)? {
            match handler.handle(&record.effect) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(
                        effect = ?record.effect,
                        error = %err,
                        "side effect failed, dropping"
                    );
                }
            }
            store.ack_effect(&record.id)?;
        }
        if report.delivered + report.failed > 0 {
            tracing::debug!(delivered = report.delivered, failed = report.failed, "outbox drained");
        }
        Ok(report)
    }
}
