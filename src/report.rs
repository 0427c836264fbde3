//! Progress reports and their draft builder
use super::error::ValidationError;
use super::types::TimeStamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical status vocabulary of a progress report.
#[derive(
    minicbor::Encode,
    minicbor::Decode,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    Submitted,
    #[n(2)]
    Approved,
    #[n(3)]
    Rejected,
    #[n(4)]
    Withdrawn,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Submitted => "SUBMITTED",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Withdrawn => "WITHDRAWN",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Withdrawn)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "SUBMITTED" => Ok(Self::Submitted),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            "WITHDRAWN" => Ok(Self::Withdrawn),
            other if LegacyStatus::parse(other).is_some() => {
                Err(ValidationError::LegacyStatus(other.to_string()))
            }
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

/// Lowercase status vocabulary used by older progress-report records.
///
/// Never accepted by [`ReportStatus::from_str`]; callers importing old data
/// convert with [`LegacyStatus::migrate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyStatus {
    Pendiente,
    Aprobado,
    Rechazado,
}

impl LegacyStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pendiente" => Some(Self::Pendiente),
            "aprobado" => Some(Self::Aprobado),
            "rechazado" => Some(Self::Rechazado),
            _ => None,
        }
    }

    /// A pending legacy report was awaiting review, so it lands in SUBMITTED.
    pub fn migrate(self) -> ReportStatus {
        match self {
            Self::Pendiente => ReportStatus::Submitted,
            Self::Aprobado => ReportStatus::Approved,
            Self::Rechazado => ReportStatus::Rejected,
        }
    }
}

#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    #[n(0)]
    Trimestral,
    #[n(1)]
    Mensual,
    #[n(2)]
    Semanal,
}

/// What a report measures: an activity or an indicator, never both.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReportSubject {
    #[n(0)]
    #[serde(rename = "activityId")]
    Activity(#[n(0)] String),
    #[n(1)]
    #[serde(rename = "indicatorId")]
    Indicator(#[n(0)] String),
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub filename: String,
    #[n(2)]
    pub path: String,
    #[n(3)]
    pub size: u64,
    #[n(4)]
    pub mimetype: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded
    #[n(1)]
    #[serde(flatten)]
    pub subject: ReportSubject,
    #[n(2)]
    pub department_id: String, // resolved from the planning hierarchy at creation
    #[n(3)]
    pub period_type: PeriodType,
    #[n(4)]
    pub period: String,
    #[n(5)]
    pub current_value: f64,
    #[n(6)]
    pub target_value: f64,
    #[n(7)]
    pub execution_percentage: f64,
    #[n(8)]
    pub comments: Option<String>,
    #[n(9)]
    pub status: ReportStatus,
    #[n(10)]
    pub reported_by_id: String,
    #[n(11)]
    pub reviewed_by_id: Option<String>,
    #[n(12)]
    pub reviewed_at: Option<TimeStamp>,
    #[n(13)]
    pub review_comments: Option<String>,
    #[n(14)]
    pub rejection_reason: Option<String>,
    #[n(15)]
    pub attachments: Vec<Attachment>,
    #[n(16)]
    pub created_at: TimeStamp,
    #[n(17)]
    pub updated_at: TimeStamp,
}

impl ProgressReport {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.reported_by_id == user_id
    }
}

/// Execution as a percentage of target, two decimals. Zero when there is no target.
pub fn derive_execution_percentage(current: f64, target: f64) -> f64 {
    if target > 0.0 {
        ((current / target) * 100.0 * 100.0).round() / 100.0
    } else {
        0.0
    }
}

fn check_value(name: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue(name))
    }
}

pub(crate) fn check_comments(comments: Option<&str>, max: usize) -> Result<(), ValidationError> {
    if let Some(comments) = comments {
        let len = comments.chars().count();
        if len > max {
            return Err(ValidationError::CommentsTooLong { len, max });
        }
    }
    Ok(())
}

// Used for constructing new reports; the id, department and owner are assigned on creation
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProgressReportDraft {
    pub activity_id: Option<String>,
    pub indicator_id: Option<String>,
    pub period_type: Option<PeriodType>,
    pub period: Option<String>,
    pub current_value: f64,
    pub target_value: f64,
    pub execution_percentage: Option<f64>,
    pub comments: Option<String>,
}

impl ProgressReportDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn for_activity(mut self, activity_id: &str) -> Self {
        self.activity_id = Some(activity_id.to_string());
        self
    }
    pub fn for_indicator(mut self, indicator_id: &str) -> Self {
        self.indicator_id = Some(indicator_id.to_string());
        self
    }
    pub fn set_period(mut self, period_type: PeriodType, period: &str) -> Self {
        self.period_type = Some(period_type);
        self.period = Some(period.to_string());
        self
    }
    pub fn set_current_value(mut self, value: f64) -> Self {
        self.current_value = value;
        self
    }
    pub fn set_target_value(mut self, value: f64) -> Self {
        self.target_value = value;
        self
    }
    pub fn set_execution_percentage(mut self, value: f64) -> Self {
        self.execution_percentage = Some(value);
        self
    }
    pub fn set_comments(mut self, comments: &str) -> Self {
        self.comments = Some(comments.to_string());
        self
    }

    /// Exactly one of activity and indicator must be present.
    pub fn subject(&self) -> Result<ReportSubject, ValidationError> {
        match (&self.activity_id, &self.indicator_id) {
            (Some(_), Some(_)) => Err(ValidationError::AmbiguousSubject),
            (Some(activity), None) => Ok(ReportSubject::Activity(activity.clone())),
            (None, Some(indicator)) => Ok(ReportSubject::Indicator(indicator.clone())),
            (None, None) => Err(ValidationError::MissingSubject),
        }
    }

    pub fn validate(&self, comments_max: usize) -> Result<ReportSubject, ValidationError> {
        let subject = self.subject()?;
        if self.period_type.is_none() {
            return Err(ValidationError::MissingPeriodType);
        }
        if self.period.as_deref().is_none_or(|p| p.trim().is_empty()) {
            return Err(ValidationError::EmptyPeriod);
        }
        check_value("currentValue", self.current_value)?;
        check_value("targetValue", self.target_value)?;
        if let Some(pct) = self.execution_percentage {
            check_value("executionPercentage", pct)?;
        }
        check_comments(self.comments.as_deref(), comments_max)?;
        Ok(subject)
    }

    /// Consumes a validated draft into a DRAFT report.
    pub fn into_report(
        self,
        id: String,
        subject: ReportSubject,
        department_id: String,
        reported_by_id: String,
        now: TimeStamp,
    ) -> Result<ProgressReport, ValidationError> {
        let period_type = self.period_type.ok_or(ValidationError::MissingPeriodType)?;
        let period = self.period.ok_or(ValidationError::EmptyPeriod)?;
        let execution_percentage = self
            .execution_percentage
            .unwrap_or_else(|| derive_execution_percentage(self.current_value, self.target_value));

        Ok(ProgressReport {
            id,
            subject,
            department_id,
            period_type,
            period: period.trim().to_string(),
            current_value: self.current_value,
            target_value: self.target_value,
            execution_percentage,
            comments: self.comments,
            status: ReportStatus::Draft,
            reported_by_id,
            reviewed_by_id: None,
            reviewed_at: None,
            review_comments: None,
            rejection_reason: None,
            attachments: vec![],
            created_at: now.clone(),
            updated_at: now,
        })
    }
}

/// Owner edits to a DRAFT report. Absent fields are left untouched.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReportChanges {
    pub period_type: Option<PeriodType>,
    pub period: Option<String>,
    pub current_value: Option<f64>,
    pub target_value: Option<f64>,
    pub execution_percentage: Option<f64>,
    pub comments: Option<String>,
}

impl ReportChanges {
    pub fn validate(&self, comments_max: usize) -> Result<(), ValidationError> {
        if self.period.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(ValidationError::EmptyPeriod);
        }
        if let Some(value) = self.current_value {
            check_value("currentValue", value)?;
        }
        if let Some(value) = self.target_value {
            check_value("targetValue", value)?;
        }
        if let Some(value) = self.execution_percentage {
            check_value("executionPercentage", value)?;
        }
        check_comments(self.comments.as_deref(), comments_max)
    }

    pub fn apply_to(&self, report: &mut ProgressReport) {
        if let Some(period_type) = self.period_type {
            report.period_type = period_type;
        }
        if let Some(period) = &self.period {
            report.period = period.trim().to_string();
        }
        if let Some(value) = self.current_value {
            report.current_value = value;
        }
        if let Some(value) = self.target_value {
            report.target_value = value;
        }
        if let Some(comments) = &self.comments {
            report.comments = Some(comments.clone());
        }
        report.execution_percentage = match self.execution_percentage {
            Some(pct) => pct,
            None if self.current_value.is_some() || self.target_value.is_some() => {
                derive_execution_percentage(report.current_value, report.target_value)
            }
            None => report.execution_percentage,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ProgressReportDraft {
        ProgressReportDraft::new()
            .for_activity("activity_1")
            .set_period(PeriodType::Trimestral, "2024-Q1")
            .set_current_value(45.0)
            .set_target_value(60.0)
    }

    #[test]
    fn status_parses_canonical_vocabulary_only() {
        assert_eq!("SUBMITTED".parse::<ReportStatus>(), Ok(ReportStatus::Submitted));
        assert_eq!(
            "pendiente".parse::<ReportStatus>(),
            Err(ValidationError::LegacyStatus("pendiente".into()))
        );
        assert_eq!(
            "submitted".parse::<ReportStatus>(),
            Err(ValidationError::UnknownStatus("submitted".into()))
        );
    }

    #[test]
    fn legacy_statuses_migrate_explicitly() {
        assert_eq!(LegacyStatus::Pendiente.migrate(), ReportStatus::Submitted);
        assert_eq!(
            LegacyStatus::parse("aprobado").map(LegacyStatus::migrate),
            Some(ReportStatus::Approved)
        );
        assert_eq!(
            LegacyStatus::parse("rechazado").map(LegacyStatus::migrate),
            Some(ReportStatus::Rejected)
        );
    }

    #[test]
    fn draft_requires_exactly_one_subject() {
        assert_eq!(
            draft().for_indicator("indicator_1").subject(),
            Err(ValidationError::AmbiguousSubject)
        );
        let mut missing = draft();
        missing.activity_id = None;
        assert_eq!(missing.subject(), Err(ValidationError::MissingSubject));
    }

    #[test]
    fn draft_rejects_blank_period_and_negative_values() {
        let blank = draft().set_period(PeriodType::Mensual, "   ");
        assert_eq!(blank.validate(1000), Err(ValidationError::EmptyPeriod));

        let negative = draft().set_current_value(-1.0);
        assert_eq!(
            negative.validate(1000),
            Err(ValidationError::InvalidValue("currentValue"))
        );
    }

    #[test]
    fn execution_percentage_is_derived_when_absent() {
        let d = draft();
        let subject = d.validate(1000).unwrap();
        let report = d
            .into_report("r".into(), subject, "dep".into(), "u".into(), TimeStamp::new())
            .unwrap();
        assert_eq!(report.execution_percentage, 75.0);
        assert_eq!(report.status, ReportStatus::Draft);
        assert_eq!(derive_execution_percentage(1.0, 3.0), 33.33);
        assert_eq!(derive_execution_percentage(5.0, 0.0), 0.0);
    }

    #[test]
    fn changes_recompute_execution() {
        let d = draft();
        let subject = d.validate(1000).unwrap();
        let mut report = d
            .into_report("r".into(), subject, "dep".into(), "u".into(), TimeStamp::new())
            .unwrap();
        let changes = ReportChanges {
            current_value: Some(60.0),
            ..Default::default()
        };
        changes.apply_to(&mut report);
        assert_eq!(report.execution_percentage, 100.0);
    }

    #[test]
    fn report_cbor_roundtrip() {
        let d = draft();
        let subject = d.validate(1000).unwrap();
        let report = d
            .into_report("r".into(), subject, "dep".into(), "u".into(), TimeStamp::new())
            .unwrap();
        let encoded = minicbor::to_vec(&report).unwrap();
        let decoded: ProgressReport = minicbor::decode(&encoded).unwrap();
        assert_eq!(report, decoded);
    }
}
