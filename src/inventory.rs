//! Storekeeper/admin item operations outside the approval chain.
//!
//! Same transactional discipline as the workflow engine: every mutation is
//! a CAS on the item's current status, and a change event follows commit.

use chrono::Utc;
use regex::Regex;
use sqlx::SqlitePool;
use std::sync::LazyLock;
use tracing::info;
use uuid::Uuid;

use crate::domain::{Actor, Item, ItemStatus, NewItem};
use crate::store;
use crate::workflow::{ChangeBus, EntityKind, WorkflowError};

static ASSET_TAG: LazyLock<Regex> = LazyLock::new(|| {
    // 2-4 uppercase letters, dash, at least 3 digits: "IT-0042".
    Regex::new(r"^[A-Z]{2,4}-\d{3,}$").unwrap()
});

pub struct InventoryService {
    pool: SqlitePool,
    events: ChangeBus,
}

/// The item left the expected state between read and write.
fn conflict(item_id: Uuid) -> WorkflowError {
    WorkflowError::Conflict {
        entity: "item",
        id: item_id,
    }
}

impl InventoryService {
    pub fn new(pool: SqlitePool, events: ChangeBus) -> Self {
        Self { pool, events }
    }

    fn require_inventory_role(actor: &Actor) -> Result<(), WorkflowError> {
        if actor.role.manages_inventory() {
            Ok(())
        } else {
            Err(WorkflowError::validation(format!(
                "{} may not manage inventory",
                actor.role
            )))
        }
    }

    /// Registers a new item into the central store.
    pub async fn add_item(&self, actor: &Actor, input: NewItem) -> Result<Item, WorkflowError> {
        Self::require_inventory_role(actor)?;
        if input.name.trim().is_empty() {
            return Err(WorkflowError::validation("item name is required"));
        }
        if !ASSET_TAG.is_match(&input.asset_tag) {
            return Err(WorkflowError::validation(format!(
                "asset tag {:?} does not match the AB-123 format",
                input.asset_tag
            )));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        if store::items::fetch_by_tag(&mut tx, &input.asset_tag)
            .await?
            .is_some()
        {
            return Err(WorkflowError::validation(format!(
                "asset tag {} is already registered",
                input.asset_tag
            )));
        }
        let item = Item::register(input, now);
        store::items::insert(&mut tx, &item).await?;
        tx.commit().await?;

        info!(item_id = %item.id, asset_tag = %item.asset_tag, "item registered");
        self.events.publish(EntityKind::Item, item.id, item.version);
        Ok(item)
    }

    /// Returns an allocated item to the central store.
    pub async fn return_item(&self, actor: &Actor, item_id: Uuid) -> Result<Item, WorkflowError> {
        Self::require_inventory_role(actor)?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let item = self.fetch_item(&mut tx, item_id).await?;
        if item.status != ItemStatus::Allocated {
            return Err(WorkflowError::validation(format!(
                "item {} is {}, only allocated items can be returned",
                item.asset_tag, item.status
            )));
        }
        let released = store::items::cas_release(&mut tx, item_id, now).await?;
        if !released {
            return Err(conflict(item_id));
        }
        self.finish(tx, item_id, actor, "item returned to store").await
    }

    pub async fn begin_maintenance(
        &self,
        actor: &Actor,
        item_id: Uuid,
    ) -> Result<Item, WorkflowError> {
        Self::require_inventory_role(actor)?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let item = self.fetch_item(&mut tx, item_id).await?;
        if !item.status.can_enter_maintenance() {
            return Err(WorkflowError::validation(format!(
                "item {} is {}, cannot enter maintenance",
                item.asset_tag, item.status
            )));
        }
        let moved = store::items::cas_begin_maintenance(&mut tx, item_id, now).await?;
        if !moved {
            return Err(conflict(item_id));
        }
        self.finish(tx, item_id, actor, "item sent to maintenance").await
    }

    /// Maintenance completion leaves the item back in the central store.
    pub async fn finish_maintenance(
        &self,
        actor: &Actor,
        item_id: Uuid,
    ) -> Result<Item, WorkflowError> {
        Self::require_inventory_role(actor)?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let item = self.fetch_item(&mut tx, item_id).await?;
        if item.status != ItemStatus::UnderMaintenance {
            return Err(WorkflowError::validation(format!(
                "item {} is {}, not under maintenance",
                item.asset_tag, item.status
            )));
        }
        let moved = store::items::cas_finish_maintenance(&mut tx, item_id, now).await?;
        if !moved {
            return Err(conflict(item_id));
        }
        self.finish(tx, item_id, actor, "maintenance finished").await
    }

    pub async fn mark_damaged(&self, actor: &Actor, item_id: Uuid) -> Result<Item, WorkflowError> {
        Self::require_inventory_role(actor)?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let item = self.fetch_item(&mut tx, item_id).await?;
        if item.status == ItemStatus::Damaged {
            return Err(WorkflowError::validation(format!(
                "item {} is already damaged",
                item.asset_tag
            )));
        }
        let moved = store::items::cas_mark_damaged(&mut tx, item_id, now).await?;
        if !moved {
            return Err(conflict(item_id));
        }
        self.finish(tx, item_id, actor, "item marked damaged").await
    }

    /// Administrative override. Refused while any request or transfer
    /// references the item.
    pub async fn delete_item(&self, actor: &Actor, item_id: Uuid) -> Result<(), WorkflowError> {
        if actor.role != crate::domain::Role::Admin {
            return Err(WorkflowError::validation(
                "only admins may delete items",
            ));
        }
        let mut tx = self.pool.begin().await?;
        let item = self.fetch_item(&mut tx, item_id).await?;
        let refs = store::items::reference_count(&mut tx, item_id).await?;
        if refs > 0 {
            return Err(WorkflowError::validation(format!(
                "item {} is referenced by {refs} workflow record(s)",
                item.asset_tag
            )));
        }
        store::items::delete(&mut tx, item_id).await?;
        tx.commit().await?;
        info!(item_id = %item_id, actor_id = %actor.id, "item deleted");
        Ok(())
    }

    pub async fn list_items(&self) -> Result<Vec<Item>, WorkflowError> {
        let mut conn = self.pool.acquire().await?;
        Ok(store::items::list(&mut conn).await?)
    }

    async fn fetch_item(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        item_id: Uuid,
    ) -> Result<Item, WorkflowError> {
        store::items::fetch(&mut *tx, item_id)
            .await?
            .ok_or(WorkflowError::NotFound {
                entity: "item",
                id: item_id,
            })
    }

    async fn finish(
        &self,
        tx: sqlx::Transaction<'_, sqlx::Sqlite>,
        item_id: Uuid,
        actor: &Actor,
        what: &str,
    ) -> Result<Item, WorkflowError> {
        let mut tx = tx;
        let item = self.fetch_item(&mut tx, item_id).await?;
        tx.commit().await?;
        info!(item_id = %item_id, actor_id = %actor.id, status = %item.status, "{what}");
        self.events.publish(EntityKind::Item, item_id, item.version);
        Ok(item)
    }
}
