//! The authoritative transition table for transfers.
//!
//! The role stages mirror the request chain; the receiver stage is matched
//! on identity rather than role, since any role can hold custody.

use crate::domain::{Actor, Role, Transfer, TransferStatus};

use super::decision::Decision;
use super::errors::WorkflowError;
use super::request_machine::ApproverStage;

/// Outcome of a valid transfer decision. `stamp` is `None` for the receiver
/// stage, which is recorded through `completed_at` and the transition log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferTransition {
    pub next: TransferStatus,
    pub stamp: Option<ApproverStage>,
}

/// Computes the next status for a decision by `actor` on `transfer`.
pub fn next(
    transfer: &Transfer,
    actor: &Actor,
    decision: &Decision,
) -> Result<TransferTransition, WorkflowError> {
    let current = transfer.status;
    if current.is_terminal() {
        return Err(WorkflowError::AlreadyTerminal {
            status: current.as_str(),
        });
    }
    let invalid = || WorkflowError::InvalidStage {
        status: current.as_str(),
        role: actor.role,
    };

    let (approved_next, stamp) = match current {
        TransferStatus::PendingDeptHead => {
            if actor.role != Role::DepartmentHead {
                return Err(invalid());
            }
            (TransferStatus::PendingDean, Some(ApproverStage::DeptHead))
        }
        TransferStatus::PendingDean => {
            if actor.role != Role::Dean {
                return Err(invalid());
            }
            (TransferStatus::PendingStorekeeper, Some(ApproverStage::Dean))
        }
        TransferStatus::PendingStorekeeper => {
            if actor.role != Role::Storekeeper {
                return Err(invalid());
            }
            (
                TransferStatus::PendingReceiver,
                Some(ApproverStage::Storekeeper),
            )
        }
        TransferStatus::PendingReceiver => {
            // Acceptance is personal: only the named receiver may act.
            if actor.id != transfer.receiver_id {
                return Err(invalid());
            }
            (TransferStatus::Completed, None)
        }
        // Terminal statuses were rejected above.
        TransferStatus::Completed | TransferStatus::Rejected => unreachable!(),
    };

    let next = match decision {
        Decision::Approve { .. } => approved_next,
        Decision::Reject { .. } => TransferStatus::Rejected,
    };
    Ok(TransferTransition { next, stamp })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewTransfer, Role};
    use chrono::Utc;
    use uuid::Uuid;

    fn transfer(status: TransferStatus) -> Transfer {
        let mut t = Transfer::initiate(
            Uuid::new_v4(),
            NewTransfer {
                item_id: Uuid::new_v4(),
                receiver_id: Uuid::new_v4(),
                receiver_department_id: Uuid::new_v4(),
            },
            false,
            Utc::now(),
        );
        t.status = status;
        t
    }

    fn actor(role: Role) -> Actor {
        Actor::new(Uuid::new_v4(), "t", role, Some(Uuid::new_v4()))
    }

    #[test]
    fn storekeeper_approval_moves_to_receiver_stage() {
        let t = transfer(TransferStatus::PendingStorekeeper);
        let out = next(&t, &actor(Role::Storekeeper), &Decision::approve()).unwrap();
        assert_eq!(out.next, TransferStatus::PendingReceiver);
        assert_eq!(out.stamp, Some(ApproverStage::Storekeeper));
    }

    #[test]
    fn only_the_named_receiver_can_accept() {
        let t = transfer(TransferStatus::PendingReceiver);

        let stranger = actor(Role::Staff);
        let err = next(&t, &stranger, &Decision::approve()).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidStage { .. }));

        let receiver = Actor::new(t.receiver_id, "receiver", Role::Staff, None);
        let out = next(&t, &receiver, &Decision::approve()).unwrap();
        assert_eq!(out.next, TransferStatus::Completed);
        assert_eq!(out.stamp, None);
    }

    #[test]
    fn receiver_can_decline() {
        let t = transfer(TransferStatus::PendingReceiver);
        let receiver = Actor::new(t.receiver_id, "receiver", Role::Staff, None);
        let out = next(&t, &receiver, &Decision::reject("wrong building")).unwrap();
        assert_eq!(out.next, TransferStatus::Rejected);
    }

    #[test]
    fn cross_department_chain_walks_head_then_dean() {
        let t = transfer(TransferStatus::PendingDeptHead);
        let out = next(&t, &actor(Role::DepartmentHead), &Decision::approve()).unwrap();
        assert_eq!(out.next, TransferStatus::PendingDean);

        let t = transfer(TransferStatus::PendingDean);
        let out = next(&t, &actor(Role::Dean), &Decision::approve()).unwrap();
        assert_eq!(out.next, TransferStatus::PendingStorekeeper);
    }

    #[test]
    fn terminal_transfers_reject_all_decisions() {
        for status in [TransferStatus::Completed, TransferStatus::Rejected] {
            let t = transfer(status);
            let err = next(&t, &actor(Role::Storekeeper), &Decision::approve()).unwrap_err();
            assert!(matches!(err, WorkflowError::AlreadyTerminal { .. }));
        }
    }
}
