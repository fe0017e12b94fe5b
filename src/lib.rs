//! # Connections Client Library
//!
//! Client for the connection handshake of a managed connections API: initiate a
//! connection for an end user, hand out the provider redirect URL and wait for
//! the connected account to become active.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod handshake;
pub mod models;
pub mod telemetry;

pub use api::{ConnectionsApi, HttpConnectionsApi, InitiateParams, ReinitiateParams};
pub use error::{HandshakeError, RemoteError, TransportError};
pub use handshake::HandshakeClient;
pub use models::{
    ConnectedAccount, ConnectedAccountId, ConnectionRequest, ConnectionStatus, EntityId,
    IntegrationId,
};
