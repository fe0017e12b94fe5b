//! Connection request and connected account models
//!
//! A [`ConnectionRequest`] is the client's handle on one authorization attempt.
//! Its redirect URL is fixed at creation; only the observed status changes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

use crate::error::{HandshakeError, TransportError};
use crate::models::{ConnectedAccountId, EntityId, IntegrationId};

/// Remote connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// Authorization started, waiting for the end user
    Initiated,
    /// Credentials are in place
    Active,
    /// Authorization failed on the provider side
    Failed,
    /// The end user never completed authorization in time
    Expired,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Initiated => "INITIATED",
            ConnectionStatus::Active => "ACTIVE",
            ConnectionStatus::Failed => "FAILED",
            ConnectionStatus::Expired => "EXPIRED",
        }
    }

    /// Whether polling should stop once this status is observed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConnectionStatus::Initiated)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = TransportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "INITIATED" => Ok(ConnectionStatus::Initiated),
            "ACTIVE" => Ok(ConnectionStatus::Active),
            "FAILED" => Ok(ConnectionStatus::Failed),
            "EXPIRED" => Ok(ConnectionStatus::Expired),
            _ => Err(TransportError::UnexpectedStatus {
                value: value.to_string(),
            }),
        }
    }
}

/// Handle on a single remote authorization attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    connected_account_id: ConnectedAccountId,
    redirect_url: Option<Url>,
    status: ConnectionStatus,
    initiated_at: DateTime<Utc>,
}

impl ConnectionRequest {
    /// Build a request from what the remote returned for an initiate or reinitiate call.
    pub fn new(
        connected_account_id: ConnectedAccountId,
        redirect_url: Option<Url>,
        status: ConnectionStatus,
    ) -> Self {
        Self {
            connected_account_id,
            redirect_url,
            status,
            initiated_at: Utc::now(),
        }
    }

    pub fn connected_account_id(&self) -> &ConnectedAccountId {
        &self.connected_account_id
    }

    /// URL the end user must visit to authorize, if the integration uses a redirect flow.
    pub fn redirect_url(&self) -> Option<&Url> {
        self.redirect_url.as_ref()
    }

    /// Last status observed from the remote.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn initiated_at(&self) -> DateTime<Utc> {
        self.initiated_at
    }

    pub fn is_active(&self) -> bool {
        self.status == ConnectionStatus::Active
    }

    /// The redirect URL, or a configuration error when the integration did not issue one.
    pub fn require_redirect_url(&self) -> Result<&Url, HandshakeError> {
        self.redirect_url.as_ref().ok_or_else(|| {
            HandshakeError::configuration(format!(
                "connected account {} was initiated without a redirect URL; the integration is not configured for OAuth",
                self.connected_account_id
            ))
        })
    }

    pub(crate) fn observe(&mut self, status: ConnectionStatus) {
        self.status = status;
    }
}

/// Remote-side record of a connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedAccount {
    pub id: ConnectedAccountId,
    pub status: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integration_id: Option<IntegrationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}
