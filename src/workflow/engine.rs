//! The workflow engine: one transaction per decision.
//!
//! Every decision loads the entity, runs the pure transition table, applies
//! the status write with a compare-and-swap on the status observed at read
//! time, and performs any coupled item mutation inside the same transaction.
//! A failure at any point rolls the whole unit back; the change event is
//! emitted only after commit.

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    Actor, Item, ItemStatus, NewItem, NewRequest, NewTransfer, Request, RequestStatus, Role,
    Transfer, TransferStatus,
};
use crate::store;

use super::decision::Decision;
use super::errors::WorkflowError;
use super::events::{ChangeBus, ChangeEvent, EntityKind};
use super::request_machine::{self, ApproverStage};
use super::transfer_machine;

pub struct WorkflowEngine {
    pool: SqlitePool,
    events: ChangeBus,
}

impl WorkflowEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            events: ChangeBus::default(),
        }
    }

    pub fn with_events(pool: SqlitePool, events: ChangeBus) -> Self {
        Self { pool, events }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn events(&self) -> &ChangeBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    /// Creates a request at its entry stage. Department heads submitting
    /// for themselves enter at `PendingDean` with their own stamp set.
    pub async fn submit_request(
        &self,
        requester: &Actor,
        input: NewRequest,
    ) -> Result<Request, WorkflowError> {
        if input.quantity < 1 {
            return Err(WorkflowError::validation("quantity must be at least 1"));
        }
        if input.item_description.trim().is_empty() {
            return Err(WorkflowError::validation("item description is required"));
        }
        let department_id = requester
            .department_id
            .ok_or_else(|| WorkflowError::validation("requester has no department"))?;

        let now = Utc::now();
        let request = Request::submit(requester, department_id, input, now);

        let mut tx = self.pool.begin().await?;
        store::requests::insert(&mut tx, &request).await?;
        store::audit::insert(
            &mut tx,
            EntityKind::Request,
            request.id,
            None,
            request.status.as_str(),
            requester.id,
            requester.role,
            None,
            now,
        )
        .await?;
        store::notifications::insert(
            &mut tx,
            request.requester_id,
            EntityKind::Request,
            request.id,
            &format!("request submitted, awaiting {}", request.status),
            now,
        )
        .await?;
        tx.commit().await?;

        info!(
            request_id = %request.id,
            requester_id = %request.requester_id,
            status = %request.status,
            urgency = %request.urgency,
            "request submitted"
        );
        self.events
            .publish(EntityKind::Request, request.id, request.version);
        Ok(request)
    }

    /// Applies one decision to a pending request.
    ///
    /// Storekeeper approval may allocate an existing available item named in
    /// the decision; approval of a department head's own request creates a
    /// fresh item custodied by them. Either side effect commits atomically
    /// with the status change or not at all.
    pub async fn decide_request(
        &self,
        actor: &Actor,
        request_id: Uuid,
        decision: &Decision,
    ) -> Result<Request, WorkflowError> {
        map_lock_contention(
            self.decide_request_inner(actor, request_id, decision).await,
            "request",
            request_id,
        )
    }

    async fn decide_request_inner(
        &self,
        actor: &Actor,
        request_id: Uuid,
        decision: &Decision,
    ) -> Result<Request, WorkflowError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut request = store::requests::fetch(&mut tx, request_id)
            .await?
            .ok_or(WorkflowError::NotFound {
                entity: "request",
                id: request_id,
            })?;
        let observed = request.status;
        let transition = request_machine::next(observed, actor.role, decision)?;

        match transition.stamp {
            ApproverStage::DeptHead => request.dept_head_approver_id = Some(actor.id),
            ApproverStage::Dean => request.dean_approver_id = Some(actor.id),
            ApproverStage::Storekeeper => request.storekeeper_approver_id = Some(actor.id),
        }
        request.status = transition.next;
        request.version += 1;
        request.updated_at = now;
        if let Decision::Reject { reason } = decision {
            request.rejection_reason = reason.clone();
        }

        if transition.next == RequestStatus::Approved {
            self.apply_approval_side_effects(&mut tx, &mut request, decision, now)
                .await?;
        }

        let applied = store::requests::cas_apply(&mut tx, &request, observed).await?;
        if !applied {
            warn!(request_id = %request_id, "request CAS failed, concurrent decision");
            return Err(WorkflowError::Conflict {
                entity: "request",
                id: request_id,
            });
        }

        store::audit::insert(
            &mut tx,
            EntityKind::Request,
            request.id,
            Some(observed.as_str()),
            request.status.as_str(),
            actor.id,
            actor.role,
            decision.comment(),
            now,
        )
        .await?;
        store::notifications::insert(
            &mut tx,
            request.requester_id,
            EntityKind::Request,
            request.id,
            &notification_text("request", observed.as_str(), request.status.as_str()),
            now,
        )
        .await?;
        tx.commit().await?;

        info!(
            request_id = %request.id,
            from_status = %observed,
            to_status = %request.status,
            actor_id = %actor.id,
            actor_role = %actor.role,
            "request transition"
        );
        self.events
            .publish(EntityKind::Request, request.id, request.version);
        Ok(request)
    }

    /// Item side effects of final approval, inside the caller's transaction.
    async fn apply_approval_side_effects(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        request: &mut Request,
        decision: &Decision,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        if request.requester_role == Role::DepartmentHead {
            // Department-head self-requests are direct allocations: approval
            // registers a new item already custodied by the requester.
            let mut item = Item::register(
                NewItem {
                    name: request.item_description.clone(),
                    description: Some(request.justification.clone()),
                    asset_tag: generated_asset_tag(request.id),
                },
                now,
            );
            item.status = ItemStatus::Allocated;
            item.custodian_id = Some(request.requester_id);
            item.owner_department_id = Some(request.department_id);
            store::items::insert(&mut *tx, &item).await?;
            request.allocated_item_id = Some(item.id);
            info!(
                request_id = %request.id,
                item_id = %item.id,
                asset_tag = %item.asset_tag,
                "item created for direct allocation"
            );
        } else if let Decision::Approve {
            item_id: Some(item_id),
        } = decision
        {
            let item = store::items::fetch(&mut *tx, *item_id)
                .await?
                .ok_or(WorkflowError::NotFound {
                    entity: "item",
                    id: *item_id,
                })?;
            if item.status != ItemStatus::Available {
                return Err(WorkflowError::validation(format!(
                    "item {} is {}, not available",
                    item.asset_tag, item.status
                )));
            }
            let allocated = store::items::cas_allocate(
                &mut *tx,
                *item_id,
                request.requester_id,
                request.department_id,
                now,
            )
            .await?;
            if !allocated {
                return Err(WorkflowError::Conflict {
                    entity: "item",
                    id: *item_id,
                });
            }
            request.allocated_item_id = Some(*item_id);
        }
        Ok(())
    }

    /// Initiates a custody transfer. The cross-department rule is evaluated
    /// here, once, against the item's current owning department.
    pub async fn create_transfer(
        &self,
        initiator: &Actor,
        input: NewTransfer,
    ) -> Result<Transfer, WorkflowError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let item = store::items::fetch(&mut tx, input.item_id)
            .await?
            .ok_or(WorkflowError::NotFound {
                entity: "item",
                id: input.item_id,
            })?;
        if item.status != ItemStatus::Allocated {
            return Err(WorkflowError::validation(format!(
                "item {} is {}, only allocated items can be transferred",
                item.asset_tag, item.status
            )));
        }
        let holder_ok = item.custodian_id == Some(initiator.id)
            || initiator.role.manages_inventory();
        if !holder_ok {
            return Err(WorkflowError::validation(
                "only the current custodian or inventory staff may initiate a transfer",
            ));
        }
        if item.custodian_id == Some(input.receiver_id) {
            return Err(WorkflowError::validation(
                "receiver already holds custody of this item",
            ));
        }

        let cross_department = item
            .owner_department_id
            .is_some_and(|dept| dept != input.receiver_department_id);
        let transfer = Transfer::initiate(initiator.id, input, cross_department, now);

        store::transfers::insert(&mut tx, &transfer).await?;
        store::audit::insert(
            &mut tx,
            EntityKind::Transfer,
            transfer.id,
            None,
            transfer.status.as_str(),
            initiator.id,
            initiator.role,
            None,
            now,
        )
        .await?;
        store::notifications::insert(
            &mut tx,
            transfer.initiator_id,
            EntityKind::Transfer,
            transfer.id,
            &format!("transfer initiated, awaiting {}", transfer.status),
            now,
        )
        .await?;
        tx.commit().await?;

        info!(
            transfer_id = %transfer.id,
            item_id = %transfer.item_id,
            cross_department = transfer.cross_department,
            status = %transfer.status,
            "transfer initiated"
        );
        self.events
            .publish(EntityKind::Transfer, transfer.id, transfer.version);
        Ok(transfer)
    }

    /// Applies one decision to a pending transfer.
    ///
    /// Receiver acceptance reassigns the item's custodian and owning
    /// department in the same transaction that marks the transfer completed;
    /// rejection never touches the item.
    pub async fn decide_transfer(
        &self,
        actor: &Actor,
        transfer_id: Uuid,
        decision: &Decision,
    ) -> Result<Transfer, WorkflowError> {
        map_lock_contention(
            self.decide_transfer_inner(actor, transfer_id, decision).await,
            "transfer",
            transfer_id,
        )
    }

    async fn decide_transfer_inner(
        &self,
        actor: &Actor,
        transfer_id: Uuid,
        decision: &Decision,
    ) -> Result<Transfer, WorkflowError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut transfer = store::transfers::fetch(&mut tx, transfer_id)
            .await?
            .ok_or(WorkflowError::NotFound {
                entity: "transfer",
                id: transfer_id,
            })?;
        let observed = transfer.status;
        let transition = transfer_machine::next(&transfer, actor, decision)?;

        match transition.stamp {
            Some(ApproverStage::DeptHead) => transfer.dept_head_approver_id = Some(actor.id),
            Some(ApproverStage::Dean) => transfer.dean_approver_id = Some(actor.id),
            Some(ApproverStage::Storekeeper) => transfer.storekeeper_approver_id = Some(actor.id),
            None => {}
        }
        transfer.status = transition.next;
        transfer.version += 1;
        transfer.updated_at = now;
        if let Decision::Reject { reason } = decision {
            transfer.rejection_reason = reason.clone();
        }

        if transition.next == TransferStatus::Completed {
            let moved = store::items::cas_reassign_custody(
                &mut tx,
                transfer.item_id,
                transfer.receiver_id,
                transfer.receiver_department_id,
                now,
            )
            .await?;
            if !moved {
                // The item left the allocated state since the transfer was
                // approved; accepting now would break the custody invariant.
                return Err(WorkflowError::Conflict {
                    entity: "item",
                    id: transfer.item_id,
                });
            }
            transfer.completed_at = Some(now);
        }

        let applied = store::transfers::cas_apply(&mut tx, &transfer, observed).await?;
        if !applied {
            warn!(transfer_id = %transfer_id, "transfer CAS failed, concurrent decision");
            return Err(WorkflowError::Conflict {
                entity: "transfer",
                id: transfer_id,
            });
        }

        store::audit::insert(
            &mut tx,
            EntityKind::Transfer,
            transfer.id,
            Some(observed.as_str()),
            transfer.status.as_str(),
            actor.id,
            actor.role,
            decision.comment(),
            now,
        )
        .await?;
        let notify_target = match transfer.status {
            // The receiver learns the item is waiting on them; otherwise the
            // initiator tracks progress.
            TransferStatus::PendingReceiver | TransferStatus::Completed => transfer.receiver_id,
            _ => transfer.initiator_id,
        };
        store::notifications::insert(
            &mut tx,
            notify_target,
            EntityKind::Transfer,
            transfer.id,
            &notification_text("transfer", observed.as_str(), transfer.status.as_str()),
            now,
        )
        .await?;
        tx.commit().await?;

        info!(
            transfer_id = %transfer.id,
            from_status = %observed,
            to_status = %transfer.status,
            actor_id = %actor.id,
            actor_role = %actor.role,
            "transfer transition"
        );
        self.events
            .publish(EntityKind::Transfer, transfer.id, transfer.version);
        Ok(transfer)
    }
}

/// SQLite reports a racing writer as lock or snapshot contention rather
/// than letting the status guard observe zero rows; both mean the same
/// thing to callers, so they surface as `Conflict`.
fn map_lock_contention<T>(
    result: Result<T, WorkflowError>,
    entity: &'static str,
    id: Uuid,
) -> Result<T, WorkflowError> {
    match result {
        Err(WorkflowError::Database(e)) if is_lock_contention(&e) => {
            warn!(entity = entity, id = %id, "write contention mapped to conflict");
            Err(WorkflowError::Conflict { entity, id })
        }
        other => other,
    }
}

fn is_lock_contention(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.message().contains("database is locked"))
}

fn notification_text(entity: &str, from: &str, to: &str) -> String {
    format!("{entity} moved from {from} to {to}")
}

/// Tag for items created by direct allocation, derived from the request id
/// so retries of the same approval cannot mint two different tags.
fn generated_asset_tag(request_id: Uuid) -> String {
    let (head, ..) = request_id.as_fields();
    format!("DA-{:06}", head % 1_000_000)
}
