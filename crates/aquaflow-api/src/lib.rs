// aquaflow-api: Async Rust client for the AquaFlow Connect portal
// (checksum-signed XML over HTTP, AES-encrypted login).

pub mod checksum;
pub mod client;
pub mod crypto;
pub mod error;
pub mod payload;
pub mod portal;
pub mod session;
pub mod transport;
pub mod xml;

pub use client::ConnectClient;
pub use error::Error;
pub use payload::{CommandValue, StatisticsKind};
pub use portal::Portal;
pub use session::{Session, SessionManager};
pub use xml::{AttributeMap, StatusPayload, WireDevice, WireProject};
