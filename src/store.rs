//! Persistence boundary for reports, history and the outbox
use super::auth::Actor;
use super::error::ApprovalError;
use super::history::{HistoryAction, HistoryEntry};
use super::outbox::{OutboxRecord, SideEffect};
use super::planning::{
    Activity, Department, Indicator, Objective, PlanningDirectory, PlanningFixture, Product,
    StrategicAxis, SubjectScope, UserRecord,
};
use super::report::{ProgressReport, ReportStatus, ReportSubject};
use super::types::TimeStamp;
use super::utils::{decode_record, encode_record, new_sequence_id};
use serde::Serialize;
use sled::Transactional;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree, abort,
};
use std::path::Path;
use std::sync::Arc;

/// Report state to persist together with its history entry and effects.
#[derive(Debug, Clone)]
pub struct StagedTransition {
    pub report: ProgressReport,
    pub action: HistoryAction,
    pub comments: Option<String>,
    pub effects: Vec<SideEffect>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub department_id: Option<String>,
    pub reported_by_id: Option<String>,
}

impl ReportFilter {
    pub fn with_status(mut self, status: ReportStatus) -> Self {
        self.status = Some(status);
        self
    }
    pub fn in_department(mut self, department_id: Option<&str>) -> Self {
        self.department_id = department_id.map(str::to_string);
        self
    }
    pub fn reported_by(mut self, user_id: &str) -> Self {
        self.reported_by_id = Some(user_id.to_string());
        self
    }

    pub fn matches(&self, report: &ProgressReport) -> bool {
        self.status.is_none_or(|s| s == report.status)
            && self
                .department_id
                .as_deref()
                .is_none_or(|d| d == report.department_id)
            && self
                .reported_by_id
                .as_deref()
                .is_none_or(|u| u == report.reported_by_id)
    }
}

/// One-based page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: usize,
    pub limit: usize,
}

impl Page {
    /// Index of the first item, `None` when it does not fit in `usize`.
    pub fn offset(&self) -> Option<usize> {
        self.page.checked_sub(1)?.checked_mul(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: usize, page: Page) -> Self {
        Self {
            items,
            total,
            page: page.page,
            limit: page.limit,
            total_pages: total.div_ceil(page.limit),
        }
    }
}

pub trait ReportStore {
    fn find_by_id(&self, id: &str) -> Result<Option<ProgressReport>, ApprovalError>;

    /// Stores a new report together with its CREATED entry.
    fn insert(&self, report: &ProgressReport, actor: &Actor) -> Result<HistoryEntry, ApprovalError>;

    /// Loads the report, lets `apply` decide the change, and commits report,
    /// history entry and effects in one transaction. `apply` may run more than
    /// once under contention and always sees the latest committed report.
    fn transition(
        &self,
        id: &str,
        actor: &Actor,
        apply: &dyn Fn(&ProgressReport) -> Result<StagedTransition, ApprovalError>,
    ) -> Result<(ProgressReport, HistoryEntry), ApprovalError>;

    /// Removes the report after `guard` approves; history is retained.
    fn delete(
        &self,
        id: &str,
        guard: &dyn Fn(&ProgressReport) -> Result<Vec<SideEffect>, ApprovalError>,
    ) -> Result<ProgressReport, ApprovalError>;

    fn append_history(
        &self,
        report_id: &str,
        action: HistoryAction,
        comments: Option<String>,
        actor: &Actor,
    ) -> Result<HistoryEntry, ApprovalError>;

    /// Entries of a report, oldest first.
    fn history(&self, report_id: &str) -> Result<Vec<HistoryEntry>, ApprovalError>;

    /// Matching reports, newest first.
    fn list(
        &self,
        filter: &ReportFilter,
        page: Option<Page>,
    ) -> Result<Vec<ProgressReport>, ApprovalError>;

    fn count(&self, filter: &ReportFilter) -> Result<usize, ApprovalError>;

    fn pending_effects(&self, limit: usize) -> Result<Vec<OutboxRecord>, ApprovalError>;

    fn ack_effect(&self, id: &str) -> Result<(), ApprovalError>;
}

fn aborted(err: ApprovalError) -> ConflictableTransactionError<ApprovalError> {
    ConflictableTransactionError::Abort(err)
}

fn entry_key(report_id: &str, entry_id: &str) -> String {
    format!("{report_id}/{entry_id}")
}

// holds the digest of the newest entry; outside the `{report_id}/` scan prefix
fn head_key(report_id: &str) -> String {
    format!("{report_id}#head")
}

fn stage_history(
    history: &TransactionalTree,
    report_id: &str,
    action: HistoryAction,
    comments: Option<String>,
    actor: &Actor,
) -> ConflictableTransactionResult<HistoryEntry, ApprovalError> {
    let head = head_key(report_id);
    let prev_digest = history
        .get(head.as_bytes())?
        .map(|raw| String::from_utf8_lossy(&raw).into_owned());

    let entry = HistoryEntry::seal(
        report_id,
        action,
        comments,
        actor,
        TimeStamp::new(),
        prev_digest,
    )
    .map_err(aborted)?;
    let encoded = encode_record(&entry).map_err(aborted)?;

    history.insert(entry_key(report_id, &entry.id).as_bytes(), encoded)?;
    history.insert(head.as_bytes(), entry.digest.as_bytes())?;
    Ok(entry)
}

fn stage_effect(
    outbox: &TransactionalTree,
    effect: &SideEffect,
) -> ConflictableTransactionResult<(), ApprovalError> {
    let record = OutboxRecord {
        id: new_sequence_id(),
        effect: effect.clone(),
        enqueued_at: TimeStamp::new(),
    };
    let encoded = encode_record(&record).map_err(aborted)?;
    outbox.insert(record.id.as_bytes(), encoded)?;
    Ok(())
}

fn load_report(
    reports: &TransactionalTree,
    id: &str,
) -> ConflictableTransactionResult<ProgressReport, ApprovalError> {
    match reports.get(id.as_bytes())? {
        Some(raw) => decode_record(&raw).map_err(aborted),
        None => abort(ApprovalError::not_found("progress report", id)),
    }
}

/// sled-backed store. Reports, history and outbox live in their own trees,
/// the planning hierarchy and users in one tree each per entity.
#[derive(Debug, Clone)]
pub struct SledReportStore {
    reports: sled::Tree,
    history: sled::Tree,
    outbox: sled::Tree,
    departments: sled::Tree,
    axes: sled::Tree,
    objectives: sled::Tree,
    products: sled::Tree,
    activities: sled::Tree,
    indicators: sled::Tree,
    users: sled::Tree,
}

impl SledReportStore {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self, ApprovalError> {
        Ok(Self {
            reports: instance.open_tree("progress_reports")?,
            history: instance.open_tree("approval_history")?,
            outbox: instance.open_tree("outbox")?,
            departments: instance.open_tree("departments")?,
            axes: instance.open_tree("strategic_axes")?,
            objectives: instance.open_tree("objectives")?,
            products: instance.open_tree("products")?,
            activities: instance.open_tree("activities")?,
            indicators: instance.open_tree("indicators")?,
            users: instance.open_tree("users")?,
        })
    }

    pub fn open(path: &Path) -> Result<Self, ApprovalError> {
        Self::new(Arc::new(sled::open(path)?))
    }

    fn put<T: minicbor::Encode<()>>(
        tree: &sled::Tree,
        id: &str,
        value: &T,
    ) -> Result<(), ApprovalError> {
        tree.insert(id.as_bytes(), encode_record(value)?)?;
        Ok(())
    }

    fn get<T>(tree: &sled::Tree, entity: &'static str, id: &str) -> Result<T, ApprovalError>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        match tree.get(id.as_bytes())? {
            Some(raw) => decode_record(&raw),
            None => Err(ApprovalError::not_found(entity, id)),
        }
    }

    pub fn put_department(&self, department: &Department) -> Result<(), ApprovalError> {
        Self::put(&self.departments, &department.id, department)
    }
    pub fn put_axis(&self, axis: &StrategicAxis) -> Result<(), ApprovalError> {
        Self::put(&self.axes, &axis.id, axis)
    }
    pub fn put_objective(&self, objective: &Objective) -> Result<(), ApprovalError> {
        Self::put(&self.objectives, &objective.id, objective)
    }
    pub fn put_product(&self, product: &Product) -> Result<(), ApprovalError> {
        Self::put(&self.products, &product.id, product)
    }
    pub fn put_activity(&self, activity: &Activity) -> Result<(), ApprovalError> {
        Self::put(&self.activities, &activity.id, activity)
    }
    pub fn put_indicator(&self, indicator: &Indicator) -> Result<(), ApprovalError> {
        Self::put(&self.indicators, &indicator.id, indicator)
    }
    pub fn put_user(&self, user: &UserRecord) -> Result<(), ApprovalError> {
        Self::put(&self.users, &user.id, user)
    }

    /// Upserts every record of the fixture, returns how many were written.
    pub fn import(&self, fixture: &PlanningFixture) -> Result<usize, ApprovalError> {
        fixture.departments.iter().try_for_each(|d| self.put_department(d))?;
        fixture.axes.iter().try_for_each(|a| self.put_axis(a))?;
        fixture.objectives.iter().try_for_each(|o| self.put_objective(o))?;
        fixture.products.iter().try_for_each(|p| self.put_product(p))?;
        fixture.activities.iter().try_for_each(|a| self.put_activity(a))?;
        fixture.indicators.iter().try_for_each(|i| self.put_indicator(i))?;
        fixture.users.iter().try_for_each(|u| self.put_user(u))?;
        Ok(fixture.len())
    }

    fn axis_department(&self, axis_id: &str) -> Result<String, ApprovalError> {
        let axis: StrategicAxis = Self::get(&self.axes, "strategic axis", axis_id)?;
        let department: Department =
            Self::get(&self.departments, "department", &axis.department_id)?;
        Ok(department.id)
    }

    fn scan_reports(&self) -> impl Iterator<Item = Result<ProgressReport, ApprovalError>> + '_ {
        self.reports.iter().map(|item| {
            let (_, raw) = item?;
            decode_record::<ProgressReport>(&raw)
        })
    }
}

impl PlanningDirectory for SledReportStore {
    fn subject_scope(&self, subject: &ReportSubject) -> Result<SubjectScope, ApprovalError> {
        match subject {
            ReportSubject::Activity(id) => {
                let activity: Activity = Self::get(&self.activities, "activity", id)?;
                let product: Product = Self::get(&self.products, "product", &activity.product_id)?;
                let objective: Objective =
                    Self::get(&self.objectives, "objective", &product.objective_id)?;
                Ok(SubjectScope {
                    department_id: self.axis_department(&objective.axis_id)?,
                    assignees: activity.assignees,
                })
            }
            ReportSubject::Indicator(id) => {
                let indicator: Indicator = Self::get(&self.indicators, "indicator", id)?;
                Ok(SubjectScope {
                    department_id: self.axis_department(&indicator.axis_id)?,
                    assignees: indicator.assignees,
                })
            }
        }
    }

    fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>, ApprovalError> {
        self.users
            .get(user_id.as_bytes())?
            .map(|raw| decode_record(&raw))
            .transpose()
    }
}

impl ReportStore for SledReportStore {
    fn find_by_id(&self, id: &str) -> Result<Option<ProgressReport>, ApprovalError> {
        self.reports
            .get(id.as_bytes())?
            .map(|raw| decode_record(&raw))
            .transpose()
    }

    fn insert(
        &self,
        report: &ProgressReport,
        actor: &Actor,
    ) -> Result<HistoryEntry, ApprovalError> {
        let encoded = encode_record(report)?;
        let entry = (&self.reports, &self.history).transaction(|(reports, history)| {
            reports.insert(report.id.as_bytes(), encoded.clone())?;
            stage_history(
                history,
                &report.id,
                HistoryAction::Created,
                report.comments.clone(),
                actor,
            )
        })?;
        Ok(entry)
    }

    fn transition(
        &self,
        id: &str,
        actor: &Actor,
        apply: &dyn Fn(&ProgressReport) -> Result<StagedTransition, ApprovalError>,
    ) -> Result<(ProgressReport, HistoryEntry), ApprovalError> {
        let outcome = (&self.reports, &self.history, &self.outbox).transaction(
            |(reports, history, outbox)| {
                let current = load_report(reports, id)?;
                let staged = apply(&current).map_err(aborted)?;

                let encoded = encode_record(&staged.report).map_err(aborted)?;
                reports.insert(id.as_bytes(), encoded)?;
                let entry = stage_history(history, id, staged.action, staged.comments, actor)?;
                for effect in &staged.effects {
                    stage_effect(outbox, effect)?;
                }
                Ok((staged.report, entry))
            },
        )?;
        Ok(outcome)
    }

    fn delete(
        &self,
        id: &str,
        guard: &dyn Fn(&ProgressReport) -> Result<Vec<SideEffect>, ApprovalError>,
    ) -> Result<ProgressReport, ApprovalError> {
        let removed = (&self.reports, &self.outbox).transaction(|(reports, outbox)| {
            let current = load_report(reports, id)?;
            let effects = guard(&current).map_err(aborted)?;
            reports.remove(id.as_bytes())?;
            for effect in &effects {
                stage_effect(outbox, effect)?;
            }
            Ok(current)
        })?;
        Ok(removed)
    }

    fn append_history(
        &self,
        report_id: &str,
        action: HistoryAction,
        comments: Option<String>,
        actor: &Actor,
    ) -> Result<HistoryEntry, ApprovalError> {
        let entry = (&self.reports, &self.history).transaction(|(reports, history)| {
            if reports.get(report_id.as_bytes())?.is_none() {
                return abort(ApprovalError::not_found("progress report", report_id));
            }
            stage_history(history, report_id, action, comments.clone(), actor)
        })?;
        Ok(entry)
    }

    fn history(&self, report_id: &str) -> Result<Vec<HistoryEntry>, ApprovalError> {
        self.history
            .scan_prefix(format!("{report_id}/"))
            .map(|item| {
                let (_, raw) = item?;
                decode_record(&raw)
            })
            .collect()
    }

    fn list(
        &self,
        filter: &ReportFilter,
        page: Option<Page>,
    ) -> Result<Vec<ProgressReport>, ApprovalError> {
        let mut matching = Vec::new();
        for report in self.scan_reports() {
            let report = report?;
            if filter.matches(&report) {
                matching.push(report);
            }
        }
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(match page {
            Some(page) => match page.offset() {
                Some(offset) => matching.into_iter().skip(offset).take(page.limit).collect(),
                None => vec![],
            },
            None => matching,
        })
    }

    fn count(&self, filter: &ReportFilter) -> Result<usize, ApprovalError> {
        let mut total = 0;
        for report in self.scan_reports() {
            if filter.matches(&report?) {
                total += 1;
            }
        }
        Ok(total)
    }

    fn pending_effects(&self, limit: usize) -> Result<Vec<OutboxRecord>, ApprovalError> {
        self.outbox
            .iter()
            .take(limit)
            .map(|item| {
                let (_, raw) = item?;
                decode_record(&raw)
            })
            .collect()
    }

    fn ack_effect(&self, id: &str) -> Result<(), ApprovalError> {
        self.outbox.remove(id.as_bytes())?;
        Ok(())
    }
}
