//! The connection hub: live-connection registry, fan-out, and routing.

pub mod connection;
pub mod registry;
pub mod router;

pub use connection::{Connection, SendOutcome};
pub use registry::{Hub, HubCounts};
