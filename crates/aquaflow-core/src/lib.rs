//! Polling layer between `aquaflow-api` and host consumers.
//!
//! This crate owns the domain model and the polling coordinator for the
//! AquaFlow Connect workspace:
//!
//! - **[`Coordinator`]** — Central facade managing the account lifecycle:
//!   [`poll_cycle()`](Coordinator::poll_cycle) produces one consistent
//!   [`Snapshot`] per cycle, [`start()`](Coordinator::start) spawns the
//!   background poll loop, and [`set_value()`](Coordinator::set_value)
//!   performs the optimistic write-back path.
//!
//! - **[`Snapshot`]** — The atomically published view of all known
//!   devices and projects. Readers never observe a partially-updated
//!   snapshot; a new value is built privately and swapped in whole.
//!
//! - **Domain model** ([`model`]) — [`Device`], [`Project`], and the
//!   vendor [`AttributeMap`] with its synthetic metadata suffix keys.

pub mod coordinator;
pub mod error;
pub mod model;

pub use coordinator::{AccountConfig, ConnectionState, Coordinator, DeviceEvent};
pub use error::CoreError;
pub use model::{AttributeMap, Device, Project, Snapshot};

// Re-export the api types hosts need to drive the coordinator.
pub use aquaflow_api::transport::TransportConfig;
pub use aquaflow_api::{CommandValue, Portal, StatisticsKind};
