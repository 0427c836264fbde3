#![allow(dead_code)]

use poa_approvals::{
    ApprovalService, SledReportStore,
    auth::Actor,
    config::ApprovalConfig,
    planning::PlanningFixture,
    report::{PeriodType, ProgressReport, ProgressReportDraft},
};
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

pub type Service = ApprovalService<SledReportStore>;

// Two departments, each with one activity chain; dep_1 also owns an indicator.
const FIXTURE: &str = r#"
[[departments]]
id = "dep_1"
name = "Planificación"

[[departments]]
id = "dep_2"
name = "Finanzas"

[[axes]]
id = "axis_1"
department_id = "dep_1"

[[axes]]
id = "axis_2"
department_id = "dep_2"

[[objectives]]
id = "obj_1"
axis_id = "axis_1"

[[objectives]]
id = "obj_2"
axis_id = "axis_2"

[[products]]
id = "prod_1"
objective_id = "obj_1"

[[products]]
id = "prod_2"
objective_id = "obj_2"

[[activities]]
id = "act_1"
product_id = "prod_1"
assignees = ["tech_1"]

[[activities]]
id = "act_2"
product_id = "prod_2"
assignees = ["tech_2"]

[[indicators]]
id = "ind_1"
axis_id = "axis_1"
assignees = ["tech_1"]

[[users]]
id = "admin"
name = "Carla"
role_name = "Administrador"

[[users]]
id = "dir_1"
name = "Ana"
role_name = "Director de Área"
department_id = "dep_1"
permissions = [
    { action = "approve", resource = "progress-report" },
    { action = "read", resource = "progress-report" },
]

[[users]]
id = "dir_2"
name = "Bruno"
role_name = "Director de Área"
department_id = "dep_2"
permissions = [
    { action = "approve", resource = "progress-report" },
    { action = "read", resource = "progress-report" },
]

[[users]]
id = "dir_none"
name = "Diego"
role_name = "Director de Área"
permissions = [
    { action = "approve", resource = "progress-report" },
    { action = "read", resource = "progress-report" },
]

[[users]]
id = "tech_1"
name = "Elena"
role_name = "Técnico"
department_id = "dep_1"
permissions = [{ action = "create", resource = "progress-report" }]

[[users]]
id = "tech_2"
name = "Fabio"
role_name = "Técnico"
department_id = "dep_2"
permissions = [{ action = "create", resource = "progress-report" }]

[[users]]
id = "retired"
name = "Gloria"
role_name = "Técnico"
active = false
"#;

// fields drop in order, so the database closes before its directory goes
pub struct Harness {
    pub service: Arc<Service>,
    pub dir: TempDir,
}

impl Harness {
    pub fn actor(&self, user_id: &str) -> Actor {
        self.service.actor(user_id).expect("fixture user")
    }

    pub fn draft(&self, activity_id: &str) -> ProgressReportDraft {
        ProgressReportDraft::new()
            .for_activity(activity_id)
            .set_period(PeriodType::Trimestral, "2024-Q1")
            .set_current_value(45.0)
            .set_target_value(60.0)
    }

    /// DRAFT report created by `owner` for `activity_id`
    pub fn draft_report(&self, owner: &str, activity_id: &str) -> ProgressReport {
        self.service
            .create_report(&self.actor(owner), self.draft(activity_id))
            .expect("create report")
    }

    /// Report created and submitted by `owner`
    pub fn submitted_report(&self, owner: &str, activity_id: &str) -> ProgressReport {
        let report = self.draft_report(owner, activity_id);
        self.service
            .submit(&self.actor(owner), &report.id)
            .expect("submit report")
    }
}

// Sled locks its directory, so every test gets its own temporary database.
pub fn harness() -> anyhow::Result<Harness> {
    let dir = tempdir()?;
    let db = Arc::new(sled::open(dir.path().join("poa.db"))?);
    let store = SledReportStore::new(db)?;
    store.import(&PlanningFixture::from_toml_str(FIXTURE)?)?;

    let config = ApprovalConfig {
        attachment_dir: dir.path().join("uploads"),
        ..ApprovalConfig::default()
    };
    let service = Arc::new(ApprovalService::new(Arc::new(store), config));
    Ok(Harness { service, dir })
}
