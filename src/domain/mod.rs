// Domain model for asset custody workflows.
// Statuses round-trip through the database as snake_case strings.

pub mod item;
pub mod request;
pub mod role;
pub mod transfer;

pub use item::{Item, ItemStatus, NewItem};
pub use request::{NewRequest, Request, RequestStatus};
pub use role::{Actor, DomainParseError, Role, Urgency};
pub use transfer::{NewTransfer, Transfer, TransferStatus};
