// Custodian - Asset Approval & Transfer Workflow Service
// This exposes the core components for testing and integration

pub mod config;
pub mod database;
pub mod domain;
pub mod inventory;
pub mod store;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use config::{CustodianConfig, DatabaseConfig, ObservabilityConfig, WorkflowConfig};
pub use database::DatabaseManager;
pub use domain::{
    Actor, Item, ItemStatus, NewItem, NewRequest, NewTransfer, Request, RequestStatus, Role,
    Transfer, TransferStatus, Urgency,
};
pub use inventory::InventoryService;
pub use telemetry::{
    create_decision_span, generate_correlation_id, init_telemetry, shutdown_telemetry,
};
pub use workflow::{
    ChangeBus, ChangeEvent, Decision, EntityKind, WorkflowEngine, WorkflowError,
};
