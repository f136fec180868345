use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Which table a change event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Request,
    Transfer,
    Item,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Request => "request",
            EntityKind::Transfer => "transfer",
            EntityKind::Item => "item",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = crate::domain::DomainParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "request" => Ok(EntityKind::Request),
            "transfer" => Ok(EntityKind::Transfer),
            "item" => Ok(EntityKind::Item),
            other => Err(crate::domain::DomainParseError::new("entity kind", other)),
        }
    }
}

/// Emitted once per committed transition. Consumers subscribe for pushes or
/// poll the entity's `version` column; nothing in the engine polls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    pub version: i64,
}

/// Broadcast bus for change events. Cheap to clone; all clones feed the
/// same channel.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Publishes after commit. A send error only means nobody is listening.
    pub fn publish(&self, entity_kind: EntityKind, entity_id: Uuid, version: i64) {
        let event = ChangeEvent {
            entity_kind,
            entity_id,
            version,
        };
        if self.tx.send(event).is_err() {
            tracing::debug!(
                entity_kind = %entity_kind,
                entity_id = %entity_id,
                "change event dropped, no subscribers"
            );
        }
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(256)
    }
}
