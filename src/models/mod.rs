//! # Data Models
//!
//! Client-side views of the remote connection records. Everything here is
//! observed from the service; nothing is persisted locally.

pub mod connection;
pub mod ids;

pub use connection::{ConnectedAccount, ConnectionRequest, ConnectionStatus};
pub use ids::{ConnectedAccountId, EntityId, IntegrationId};
