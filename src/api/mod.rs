//! Remote connected-accounts API
//!
//! This module provides:
//! - The `ConnectionsApi` trait the handshake client talks through
//! - `HttpConnectionsApi`, the reqwest implementation against the hosted service

pub mod http;
pub mod trait_;

pub use http::HttpConnectionsApi;
pub use trait_::{ConnectionsApi, InitiateParams, ReinitiateParams};
