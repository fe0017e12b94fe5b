//! Connections API trait definition
//!
//! Defines the remote operations the handshake client depends on.

use async_trait::async_trait;
use serde_json::{Map, Value};
use url::Url;

use crate::error::TransportError;
use crate::models::{
    ConnectedAccount, ConnectedAccountId, ConnectionRequest, EntityId, IntegrationId,
};

/// Parameters for starting a new connection
#[derive(Debug, Clone)]
pub struct InitiateParams {
    pub integration_id: IntegrationId,
    pub entity_id: EntityId,
    /// Where the provider sends the user after authorization
    pub redirect_destination: Option<Url>,
    /// Connection parameters forwarded verbatim (API-key style integrations)
    pub data: Option<Map<String, Value>>,
}

impl InitiateParams {
    pub fn new(integration_id: IntegrationId, entity_id: EntityId) -> Self {
        Self {
            integration_id,
            entity_id,
            redirect_destination: None,
            data: None,
        }
    }

    pub fn with_redirect(mut self, redirect_destination: Url) -> Self {
        self.redirect_destination = Some(redirect_destination);
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }
}

/// Parameters for re-authorizing an existing connected account
#[derive(Debug, Clone)]
pub struct ReinitiateParams {
    pub connected_account_id: ConnectedAccountId,
    pub redirect_destination: Option<Url>,
    pub data: Option<Map<String, Value>>,
}

#[async_trait]
pub trait ConnectionsApi: Send + Sync {
    /// Begin a remote authorization attempt for an entity against an integration.
    async fn initiate_connection(
        &self,
        params: &InitiateParams,
    ) -> Result<ConnectionRequest, TransportError>;

    /// Fetch the current remote record of a connected account.
    async fn get_connected_account(
        &self,
        id: &ConnectedAccountId,
    ) -> Result<ConnectedAccount, TransportError>;

    /// Start a fresh authorization attempt for an existing connected account.
    async fn reinitiate_connection(
        &self,
        params: &ReinitiateParams,
    ) -> Result<ConnectionRequest, TransportError>;

    /// List the connected accounts of an entity, optionally narrowed to one integration.
    async fn list_connected_accounts(
        &self,
        entity_id: &EntityId,
        integration_id: Option<&IntegrationId>,
    ) -> Result<Vec<ConnectedAccount>, TransportError>;
}
