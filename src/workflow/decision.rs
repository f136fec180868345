use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::WorkflowError;

/// A decision submitted against a pending entity.
///
/// `Approve` may name an existing available item for the storekeeper stage
/// of a request; `Reject` may carry a reason, stored on the entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    Approve {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_id: Option<Uuid>,
    },
    Reject {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl Decision {
    pub fn approve() -> Self {
        Decision::Approve { item_id: None }
    }

    pub fn approve_with_item(item_id: Uuid) -> Self {
        Decision::Approve {
            item_id: Some(item_id),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Decision::Reject {
            reason: Some(reason.into()),
        }
    }

    /// Parses the wire shape `{action, comment?, item_id?}` used by the CLI.
    pub fn parse(
        action: &str,
        comment: Option<String>,
        item_id: Option<Uuid>,
    ) -> Result<Self, WorkflowError> {
        match action {
            "approve" => Ok(Decision::Approve { item_id }),
            "reject" => Ok(Decision::Reject { reason: comment }),
            other => Err(WorkflowError::validation(format!(
                "unknown decision action: {other}"
            ))),
        }
    }

    pub fn is_approve(&self) -> bool {
        matches!(self, Decision::Approve { .. })
    }

    /// The comment a decision contributes to the transition log.
    pub fn comment(&self) -> Option<&str> {
        match self {
            Decision::Approve { .. } => None,
            Decision::Reject { reason } => reason.as_deref(),
        }
    }
}
