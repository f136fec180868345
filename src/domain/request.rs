use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::role::{Actor, DomainParseError, Role, Urgency};

/// Approval stage of an item request.
///
/// The pending stages form a fixed forward-only order; `Rejected` is
/// terminal and reachable from every pending stage, `Approved` only from
/// `PendingStorekeeper`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    PendingDeptHead,
    PendingDean,
    PendingStorekeeper,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::PendingDeptHead => "pending_dept_head",
            RequestStatus::PendingDean => "pending_dean",
            RequestStatus::PendingStorekeeper => "pending_storekeeper",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Approved | RequestStatus::Rejected)
    }

    /// The role whose decision the request is waiting on, if any.
    pub fn pending_role(&self) -> Option<Role> {
        match self {
            RequestStatus::PendingDeptHead => Some(Role::DepartmentHead),
            RequestStatus::PendingDean => Some(Role::Dean),
            RequestStatus::PendingStorekeeper => Some(Role::Storekeeper),
            RequestStatus::Approved | RequestStatus::Rejected => None,
        }
    }

    /// Position along the stage order, used by tests asserting the status
    /// never moves backward.
    pub fn stage_index(&self) -> usize {
        match self {
            RequestStatus::PendingDeptHead => 0,
            RequestStatus::PendingDean => 1,
            RequestStatus::PendingStorekeeper => 2,
            RequestStatus::Approved | RequestStatus::Rejected => 3,
        }
    }
}

impl FromStr for RequestStatus {
    type Err = DomainParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_dept_head" => Ok(RequestStatus::PendingDeptHead),
            "pending_dean" => Ok(RequestStatus::PendingDean),
            "pending_storekeeper" => Ok(RequestStatus::PendingStorekeeper),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(DomainParseError::new("request status", other)),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An item demand moving through the approval chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub requester_role: Role,
    pub department_id: Uuid,
    pub item_description: String,
    pub quantity: i64,
    pub urgency: Urgency,
    pub justification: String,
    pub status: RequestStatus,
    pub dept_head_approver_id: Option<Uuid>,
    pub dean_approver_id: Option<Uuid>,
    pub storekeeper_approver_id: Option<Uuid>,
    pub rejection_reason: Option<String>,
    pub allocated_item_id: Option<Uuid>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for submitting a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRequest {
    pub item_description: String,
    pub quantity: i64,
    pub urgency: Urgency,
    pub justification: String,
}

impl Request {
    /// Builds the initial row for a requester.
    ///
    /// A department head submitting for themselves skips their own stage:
    /// the request enters at `PendingDean` with the dept-head stamp already
    /// set to the requester.
    pub fn submit(requester: &Actor, department_id: Uuid, input: NewRequest, now: DateTime<Utc>) -> Self {
        let (status, dept_head_approver_id) = if requester.role == Role::DepartmentHead {
            (RequestStatus::PendingDean, Some(requester.id))
        } else {
            (RequestStatus::PendingDeptHead, None)
        };
        Self {
            id: Uuid::new_v4(),
            requester_id: requester.id,
            requester_role: requester.role,
            department_id,
            item_description: input.item_description,
            quantity: input.quantity,
            urgency: input.urgency,
            justification: input.justification,
            status,
            dept_head_approver_id,
            dean_approver_id: None,
            storekeeper_approver_id: None,
            rejection_reason: None,
            allocated_item_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
