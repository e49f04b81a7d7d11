pub mod assignment;
pub mod error;
pub mod event_log;
pub mod model;
pub mod permissions;
pub mod router;
pub mod service;
pub mod state_machine;
pub mod stats;
pub mod store;

#[cfg(test)]
mod test_support;

pub use error::DispatchError;
pub use event_log::{Event, EventLog, EventType};
pub use model::{Actor, Incident, IncidentType, Priority, Responder, Role, Status};
pub use service::{DispatchService, StatusUpdate};
pub use stats::{Period, Snapshot};
pub use store::{IncidentFilter, ListQuery, Page, SortField, SortOrder, SqliteStore};
