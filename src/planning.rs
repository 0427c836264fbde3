//! Planning hierarchy and user directory records
//!
//! Reports attach to activities or indicators; their owning department is
//! reached through activity → product → objective → strategic axis, or
//! directly from an indicator's strategic axis.
use super::auth::Permission;
use super::error::ApprovalError;
use super::report::ReportSubject;
use serde::Deserialize;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Department {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StrategicAxis {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub department_id: String,
    #[n(2)]
    #[serde(default)]
    pub name: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Objective {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub axis_id: String,
    #[n(2)]
    #[serde(default)]
    pub name: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Product {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub objective_id: String,
    #[n(2)]
    #[serde(default)]
    pub name: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Activity {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub product_id: String,
    #[n(2)]
    #[serde(default)]
    pub name: String,
    #[n(3)]
    #[serde(default)]
    pub assignees: Vec<String>, // user ids allowed to report on it
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Indicator {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub axis_id: String,
    #[n(2)]
    #[serde(default)]
    pub name: String,
    #[n(3)]
    #[serde(default)]
    pub assignees: Vec<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserRecord {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub role_name: String,
    #[n(3)]
    #[serde(default)]
    pub department_id: Option<String>,
    #[n(4)]
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[n(5)]
    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool {
    true
}

/// Department and assignees resolved for a report subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectScope {
    pub department_id: String,
    pub assignees: Vec<String>,
}

/// Read access to the planning hierarchy and the user directory.
pub trait PlanningDirectory {
    fn subject_scope(&self, subject: &ReportSubject) -> Result<SubjectScope, ApprovalError>;
    fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>, ApprovalError>;
}

/// Bulk load format for `poa-approvals import`.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct PlanningFixture {
    pub departments: Vec<Department>,
    pub axes: Vec<StrategicAxis>,
    pub objectives: Vec<Objective>,
    pub products: Vec<Product>,
    pub activities: Vec<Activity>,
    pub indicators: Vec<Indicator>,
    pub users: Vec<UserRecord>,
}

impl PlanningFixture {
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn len(&self) -> usize {
        self.departments.len()
            + self.axes.len()
            + self.objectives.len()
            + self.products.len()
            + self.activities.len()
            + self.indicators.len()
            + self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
