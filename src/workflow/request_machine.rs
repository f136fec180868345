//! The authoritative transition table for requests.
//!
//! The surrounding application used to rebuild "next status" strings in
//! every view; here a single exhaustive match owns the rule and the engine
//! is its only caller.

use crate::domain::{RequestStatus, Role};

use super::decision::Decision;
use super::errors::WorkflowError;

/// Which approver-stamp column a completed stage writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApproverStage {
    DeptHead,
    Dean,
    Storekeeper,
}

/// Outcome of a valid decision: the status to move to and the stage whose
/// approver column records the actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTransition {
    pub next: RequestStatus,
    pub stamp: ApproverStage,
}

/// Computes the next status for `(current, role, decision)`.
///
/// Terminal statuses fail with `AlreadyTerminal` before anything else; a
/// role acting out of turn fails with `InvalidStage` whatever its decision.
pub fn next(
    current: RequestStatus,
    role: Role,
    decision: &Decision,
) -> Result<RequestTransition, WorkflowError> {
    if current.is_terminal() {
        return Err(WorkflowError::AlreadyTerminal {
            status: current.as_str(),
        });
    }
    let stage = match (current, role) {
        (RequestStatus::PendingDeptHead, Role::DepartmentHead) => ApproverStage::DeptHead,
        (RequestStatus::PendingDean, Role::Dean) => ApproverStage::Dean,
        (RequestStatus::PendingStorekeeper, Role::Storekeeper) => ApproverStage::Storekeeper,
        (current, role) => {
            return Err(WorkflowError::InvalidStage {
                status: current.as_str(),
                role,
            })
        }
    };
    let next = match decision {
        Decision::Reject { .. } => RequestStatus::Rejected,
        Decision::Approve { .. } => match current {
            RequestStatus::PendingDeptHead => RequestStatus::PendingDean,
            RequestStatus::PendingDean => RequestStatus::PendingStorekeeper,
            RequestStatus::PendingStorekeeper => RequestStatus::Approved,
            // Terminal statuses were rejected above.
            RequestStatus::Approved | RequestStatus::Rejected => unreachable!(),
        },
    };
    Ok(RequestTransition { next, stamp: stage })
}
