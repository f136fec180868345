use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::role::DomainParseError;

/// Physical state of an asset record.
///
/// Invariants enforced by the store layer: `Allocated` implies a non-null
/// custodian, `Available` implies a null custodian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Available,
    Allocated,
    UnderMaintenance,
    Damaged,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Available => "available",
            ItemStatus::Allocated => "allocated",
            ItemStatus::UnderMaintenance => "under_maintenance",
            ItemStatus::Damaged => "damaged",
        }
    }

    /// Maintenance can start while the item is in circulation or in store.
    pub fn can_enter_maintenance(&self) -> bool {
        matches!(self, ItemStatus::Available | ItemStatus::Allocated)
    }
}

impl FromStr for ItemStatus {
    type Err = DomainParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(ItemStatus::Available),
            "allocated" => Ok(ItemStatus::Allocated),
            "under_maintenance" => Ok(ItemStatus::UnderMaintenance),
            "damaged" => Ok(ItemStatus::Damaged),
            other => Err(DomainParseError::new("item status", other)),
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An asset record. `owner_department_id` of `None` means the item sits in
/// the central store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub asset_tag: String,
    pub status: ItemStatus,
    pub custodian_id: Option<Uuid>,
    pub owner_department_id: Option<Uuid>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for registering a new item into the central store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub description: Option<String>,
    pub asset_tag: String,
}

impl Item {
    /// Builds a fresh item sitting in the central store.
    pub fn register(input: NewItem, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            asset_tag: input.asset_tag,
            status: ItemStatus::Available,
            custodian_id: None,
            owner_department_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
