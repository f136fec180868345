use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Raised when a status, role, or urgency string from the database or the
/// CLI does not name a known variant.
#[derive(Debug, Error)]
#[error("unknown {kind}: {value}")]
pub struct DomainParseError {
    pub kind: &'static str,
    pub value: String,
}

impl DomainParseError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Organizational role of an actor. The approval chain is keyed on these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Staff,
    DepartmentHead,
    Dean,
    Storekeeper,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Staff => "staff",
            Role::DepartmentHead => "department_head",
            Role::Dean => "dean",
            Role::Storekeeper => "storekeeper",
            Role::Admin => "admin",
        }
    }

    /// Roles allowed to mutate inventory outside the approval chain.
    pub fn manages_inventory(&self) -> bool {
        matches!(self, Role::Storekeeper | Role::Admin)
    }
}

impl FromStr for Role {
    type Err = DomainParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staff" => Ok(Role::Staff),
            "department_head" => Ok(Role::DepartmentHead),
            "dean" => Ok(Role::Dean),
            "storekeeper" => Ok(Role::Storekeeper),
            "admin" => Ok(Role::Admin),
            other => Err(DomainParseError::new("role", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency of a request, carried through for display and triage only; the
/// approval chain does not branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        }
    }
}

impl FromStr for Urgency {
    type Err = DomainParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Urgency::Low),
            "medium" => Ok(Urgency::Medium),
            "high" => Ok(Urgency::High),
            "critical" => Ok(Urgency::Critical),
            other => Err(DomainParseError::new("urgency", other)),
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The acting identity on a decision. Authentication lives outside this
/// service; callers supply the actor on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub department_id: Option<Uuid>,
}

impl Actor {
    pub fn new(id: Uuid, name: impl Into<String>, role: Role, department_id: Option<Uuid>) -> Self {
        Self {
            id,
            name: name.into(),
            role,
            department_id,
        }
    }
}
