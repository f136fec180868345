use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::role::DomainParseError;

/// Approval stage of a custody transfer.
///
/// Same-department transfers enter at `PendingStorekeeper`; transfers that
/// cross a department boundary enter at `PendingDeptHead` and pick up dean
/// sign-off before reaching the storekeeper. `Completed` and `Rejected` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    PendingDeptHead,
    PendingDean,
    PendingStorekeeper,
    PendingReceiver,
    Completed,
    Rejected,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::PendingDeptHead => "pending_dept_head",
            TransferStatus::PendingDean => "pending_dean",
            TransferStatus::PendingStorekeeper => "pending_storekeeper",
            TransferStatus::PendingReceiver => "pending_receiver",
            TransferStatus::Completed => "completed",
            TransferStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Rejected)
    }

    pub fn stage_index(&self) -> usize {
        match self {
            TransferStatus::PendingDeptHead => 0,
            TransferStatus::PendingDean => 1,
            TransferStatus::PendingStorekeeper => 2,
            TransferStatus::PendingReceiver => 3,
            TransferStatus::Completed | TransferStatus::Rejected => 4,
        }
    }
}

impl FromStr for TransferStatus {
    type Err = DomainParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_dept_head" => Ok(TransferStatus::PendingDeptHead),
            "pending_dean" => Ok(TransferStatus::PendingDean),
            "pending_storekeeper" => Ok(TransferStatus::PendingStorekeeper),
            "pending_receiver" => Ok(TransferStatus::PendingReceiver),
            "completed" => Ok(TransferStatus::Completed),
            "rejected" => Ok(TransferStatus::Rejected),
            other => Err(DomainParseError::new("transfer status", other)),
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Custody of an existing item moving from one holder to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: Uuid,
    pub item_id: Uuid,
    pub initiator_id: Uuid,
    pub receiver_id: Uuid,
    pub receiver_department_id: Uuid,
    /// Frozen at creation: whether the receiver's department differs from
    /// the item's owning department, which routes the transfer through the
    /// extended dept-head/dean chain.
    pub cross_department: bool,
    pub status: TransferStatus,
    pub dept_head_approver_id: Option<Uuid>,
    pub dean_approver_id: Option<Uuid>,
    pub storekeeper_approver_id: Option<Uuid>,
    pub rejection_reason: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Input for initiating a transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransfer {
    pub item_id: Uuid,
    pub receiver_id: Uuid,
    pub receiver_department_id: Uuid,
}

impl Transfer {
    /// Builds the initial row. `cross_department` decides the entry stage.
    pub fn initiate(
        initiator_id: Uuid,
        input: NewTransfer,
        cross_department: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let status = if cross_department {
            TransferStatus::PendingDeptHead
        } else {
            TransferStatus::PendingStorekeeper
        };
        Self {
            id: Uuid::new_v4(),
            item_id: input.item_id,
            initiator_id,
            receiver_id: input.receiver_id,
            receiver_department_id: input.receiver_department_id,
            cross_department,
            status,
            dept_head_approver_id: None,
            dean_approver_id: None,
            storekeeper_approver_id: None,
            rejection_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}
