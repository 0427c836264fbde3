//! Authorization gate: role override plus (action, resource) permission tuples
use super::config::RoleNames;
use super::error::{ApprovalError, ValidationError};
use super::planning::UserRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(
    minicbor::Encode,
    minicbor::Decode,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[n(0)]
    Create,
    #[n(1)]
    Read,
    #[n(2)]
    Update,
    #[n(3)]
    Delete,
    #[n(4)]
    Approve,
}

#[derive(
    minicbor::Encode,
    minicbor::Decode,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Resource {
    #[n(0)]
    ProgressReport,
    #[n(1)]
    Activity,
    #[n(2)]
    Indicator,
    #[n(3)]
    StrategicAxis,
    #[n(4)]
    Department,
    #[n(5)]
    User,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Approve => "approve",
        }
    }
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProgressReport => "progress-report",
            Self::Activity => "activity",
            Self::Indicator => "indicator",
            Self::StrategicAxis => "strategic-axis",
            Self::Department => "department",
            Self::User => "user",
        }
    }
}

impl FromStr for Action {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Create, Self::Read, Self::Update, Self::Delete, Self::Approve]
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownPermission {
                kind: "action",
                value: s.to_string(),
            })
    }
}

impl FromStr for Resource {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::ProgressReport,
            Self::Activity,
            Self::Indicator,
            Self::StrategicAxis,
            Self::Department,
            Self::User,
        ]
        .into_iter()
        .find(|r| r.as_str() == s)
        .ok_or_else(|| ValidationError::UnknownPermission {
            kind: "resource",
            value: s.to_string(),
        })
    }
}

#[derive(
    minicbor::Encode,
    minicbor::Decode,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct Permission {
    #[n(0)]
    pub action: Action,
    #[n(1)]
    pub resource: Resource,
}

impl Permission {
    pub fn new(action: Action, resource: Resource) -> Self {
        Self { action, resource }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.action.as_str(), self.resource.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Administrator,
    AreaDirector,
    Custom(String),
}

impl Role {
    pub fn from_name(name: &str, roles: &RoleNames) -> Self {
        if name == roles.administrator {
            Self::Administrator
        } else if name == roles.area_director {
            Self::AreaDirector
        } else {
            Self::Custom(name.to_string())
        }
    }
}

/// The authenticated user, with the permission set loaded once per request.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: String,
    pub name: String,
    pub role: Role,
    pub role_name: String,
    pub department_id: Option<String>,
    pub permissions: BTreeSet<Permission>,
}

impl Actor {
    pub fn from_user(user: &UserRecord, roles: &RoleNames) -> Self {
        Self {
            user_id: user.id.clone(),
            name: user.name.clone(),
            role: Role::from_name(&user.role_name, roles),
            role_name: user.role_name.clone(),
            department_id: user.department_id.clone(),
            permissions: user.permissions.iter().copied().collect(),
        }
    }

    pub fn is_administrator(&self) -> bool {
        self.role == Role::Administrator
    }
}

/// Which reports an actor may review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewScope {
    Unrestricted,
    Department(String),
    // area director with no department on record
    Nothing,
}

impl ReviewScope {
    pub fn covers(&self, department_id: &str) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Department(own) => own == department_id,
            Self::Nothing => false,
        }
    }

    pub fn department(&self) -> Option<&str> {
        match self {
            Self::Department(own) => Some(own),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuthorizationGate;

impl AuthorizationGate {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, actor: &Actor, action: Action, resource: Resource) -> bool {
        actor.is_administrator() || actor.permissions.contains(&Permission::new(action, resource))
    }

    pub fn require(
        &self,
        actor: &Actor,
        action: Action,
        resource: Resource,
    ) -> Result<(), ApprovalError> {
        if self.check(actor, action, resource) {
            return Ok(());
        }
        tracing::debug!(
            user = %actor.user_id,
            role = %actor.role_name,
            permission = %Permission::new(action, resource),
            "permission denied"
        );
        Err(ApprovalError::forbidden(format!(
            "role {} lacks permission {}",
            actor.role_name,
            Permission::new(action, resource)
        )))
    }

    pub fn review_scope(&self, actor: &Actor) -> ReviewScope {
        match (&actor.role, &actor.department_id) {
            (Role::AreaDirector, Some(department)) => ReviewScope::Department(department.clone()),
            (Role::AreaDirector, None) => ReviewScope::Nothing,
            _ => ReviewScope::Unrestricted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role_name: &str, department: Option<&str>, permissions: &[Permission]) -> Actor {
        let user = UserRecord {
            id: "user_1".into(),
            name: "Ana".into(),
            role_name: role_name.into(),
            department_id: department.map(str::to_string),
            permissions: permissions.to_vec(),
            active: true,
        };
        Actor::from_user(&user, &RoleNames::default())
    }

    #[test]
    fn administrator_passes_without_permissions() {
        let admin = actor("Administrador", None, &[]);
        let gate = AuthorizationGate::new();
        assert!(gate.check(&admin, Action::Approve, Resource::ProgressReport));
        assert!(gate.check(&admin, Action::Delete, Resource::User));
        assert_eq!(gate.review_scope(&admin), ReviewScope::Unrestricted);
    }

    #[test]
    fn role_name_must_match_exactly() {
        let lookalike = actor("administrador", None, &[]);
        assert_eq!(lookalike.role, Role::Custom("administrador".into()));
        assert!(!AuthorizationGate::new().check(
            &lookalike,
            Action::Read,
            Resource::ProgressReport
        ));
    }

    #[test]
    fn permission_tuples_are_matched_pairwise() {
        let tech = actor(
            "Técnico",
            Some("dep_1"),
            &[
                Permission::new(Action::Create, Resource::ProgressReport),
                Permission::new(Action::Approve, Resource::Activity),
            ],
        );
        let gate = AuthorizationGate::new();
        assert!(gate.check(&tech, Action::Create, Resource::ProgressReport));
        assert!(!gate.check(&tech, Action::Approve, Resource::ProgressReport));
        assert!(matches!(
            gate.require(&tech, Action::Approve, Resource::ProgressReport),
            Err(ApprovalError::Forbidden(_))
        ));
    }

    #[test]
    fn directors_are_department_scoped() {
        let gate = AuthorizationGate::new();
        let director = actor("Director de Área", Some("dep_1"), &[]);
        let scope = gate.review_scope(&director);
        assert!(scope.covers("dep_1"));
        assert!(!scope.covers("dep_2"));

        let homeless = actor("Director de Área", None, &[]);
        assert!(!gate.review_scope(&homeless).covers("dep_1"));
    }

    #[test]
    fn permission_names_parse() {
        assert_eq!("approve".parse::<Action>(), Ok(Action::Approve));
        assert_eq!("progress-report".parse::<Resource>(), Ok(Resource::ProgressReport));
        assert!("publish".parse::<Action>().is_err());
    }
}
