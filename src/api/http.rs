//! HTTP implementation of the connections API
//!
//! Talks JSON to the hosted connected-accounts service, authenticating with an
//! `x-api-key` header and tagging each call with an `x-request-id`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::api::trait_::{ConnectionsApi, InitiateParams, ReinitiateParams};
use crate::config::{ApiKey, ClientConfig};
use crate::error::{HandshakeError, RemoteError, TransportError};
use crate::models::{
    ConnectedAccount, ConnectedAccountId, ConnectionRequest, ConnectionStatus, EntityId,
    IntegrationId,
};
use crate::telemetry;

const API_KEY_HEADER: &str = "x-api-key";
const REQUEST_ID_HEADER: &str = "x-request-id";
const CONNECTED_ACCOUNTS_PATH: [&str; 2] = ["v1", "connectedAccounts"];

/// reqwest-backed client for the connected-accounts endpoints
#[derive(Debug, Clone)]
pub struct HttpConnectionsApi {
    client: Client,
    base_url: Url,
    /// `<base>/v1/connectedAccounts`; always a hierarchical URL.
    accounts_url: Url,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitiateBody<'a> {
    integration_id: &'a str,
    entity_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_uri: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Map<String, Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReinitiateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_uri: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionRequestWire {
    connected_account_id: String,
    connection_status: String,
    redirect_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectedAccountWire {
    id: String,
    status: String,
    integration_id: Option<String>,
    app_name: Option<String>,
    client_unique_user_id: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ConnectedAccountPage {
    #[serde(default)]
    items: Vec<ConnectedAccountWire>,
}

impl HttpConnectionsApi {
    /// Create a client for `base_url` (e.g. `https://backend.composio.dev/api`).
    pub fn new(
        base_url: Url,
        api_key: Option<&ApiKey>,
        request_timeout: Duration,
    ) -> Result<Self, HandshakeError> {
        let mut accounts_url = base_url.clone();
        accounts_url
            .path_segments_mut()
            .map_err(|_| {
                HandshakeError::configuration(format!(
                    "API base '{base_url}' cannot carry a path; use an http(s) URL"
                ))
            })?
            .pop_if_empty()
            .extend(CONNECTED_ACCOUNTS_PATH);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(key) = api_key.filter(|key| !key.is_empty()) {
            let mut value = HeaderValue::from_str(key.expose()).map_err(|_| {
                HandshakeError::configuration("API key contains characters not allowed in a header")
            })?;
            value.set_sensitive(true);
            headers.insert(API_KEY_HEADER, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .user_agent(concat!("connections-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            accounts_url,
        })
    }

    /// Build a client from loaded configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self, HandshakeError> {
        let base_url = config
            .api_base_url()
            .map_err(|err| HandshakeError::configuration(err.to_string()))?;
        Self::new(base_url, config.api_key.as_ref(), config.request_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, extra: &[&str]) -> Url {
        let mut url = self.accounts_url.clone();
        // Checked in `new`
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.extend(extra);
        }
        url
    }

    fn request_id() -> String {
        telemetry::current_trace_id().unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let remote = RemoteError::from_response(status.as_u16(), &body);
            warn!(
                status = remote.status,
                error_type = remote.error_type.as_deref().unwrap_or("unknown"),
                request_id = remote.request_id.as_deref().unwrap_or("none"),
                message = %remote.message,
                "Connections API returned an error"
            );
            return Err(TransportError::Remote(remote));
        }

        serde_json::from_str(&body).map_err(|err| TransportError::decode(err.to_string(), Some(&body)))
    }
}

fn parse_id<T, F>(value: String, build: F) -> Result<T, TransportError>
where
    F: FnOnce(String) -> Result<T, HandshakeError>,
{
    build(value).map_err(|err| TransportError::decode(err.to_string(), None))
}

fn parse_redirect_url(raw: Option<String>) -> Result<Option<Url>, TransportError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => Url::parse(value)
            .map(Some)
            .map_err(|err| TransportError::decode(format!("invalid redirectUrl: {}", err), Some(value))),
    }
}

impl TryFrom<ConnectionRequestWire> for ConnectionRequest {
    type Error = TransportError;

    fn try_from(wire: ConnectionRequestWire) -> Result<Self, Self::Error> {
        let id = parse_id(wire.connected_account_id, ConnectedAccountId::new)?;
        let status: ConnectionStatus = wire.connection_status.parse()?;
        let redirect_url = parse_redirect_url(wire.redirect_url)?;
        Ok(ConnectionRequest::new(id, redirect_url, status))
    }
}

impl TryFrom<ConnectedAccountWire> for ConnectedAccount {
    type Error = TransportError;

    fn try_from(wire: ConnectedAccountWire) -> Result<Self, Self::Error> {
        Ok(ConnectedAccount {
            id: parse_id(wire.id, ConnectedAccountId::new)?,
            status: wire.status.parse()?,
            integration_id: wire.integration_id.and_then(|id| IntegrationId::new(id).ok()),
            app_name: wire.app_name,
            entity_id: wire.client_unique_user_id.and_then(|id| EntityId::new(id).ok()),
            created_at: wire.created_at,
            updated_at: wire.updated_at,
        })
    }
}

#[async_trait]
impl ConnectionsApi for HttpConnectionsApi {
    #[instrument(
        skip_all,
        fields(integration_id = %params.integration_id, entity_id = %params.entity_id)
    )]
    async fn initiate_connection(
        &self,
        params: &InitiateParams,
    ) -> Result<ConnectionRequest, TransportError> {
        let url = self.endpoint(&[]);
        let body = InitiateBody {
            integration_id: params.integration_id.as_str(),
            entity_id: params.entity_id.as_str(),
            redirect_uri: params.redirect_destination.as_ref().map(Url::as_str),
            data: params.data.as_ref(),
        };

        let response = self
            .client
            .post(url)
            .header(REQUEST_ID_HEADER, Self::request_id())
            .json(&body)
            .send()
            .await?;

        let wire: ConnectionRequestWire = Self::read_json(response).await?;
        let request = ConnectionRequest::try_from(wire)?;

        debug!(
            connected_account_id = %request.connected_account_id(),
            status = %request.status(),
            has_redirect_url = request.redirect_url().is_some(),
            "Connection initiated"
        );

        Ok(request)
    }

    #[instrument(skip_all, fields(connected_account_id = %id))]
    async fn get_connected_account(
        &self,
        id: &ConnectedAccountId,
    ) -> Result<ConnectedAccount, TransportError> {
        let url = self.endpoint(&[id.as_str()]);

        let response = self
            .client
            .get(url)
            .header(REQUEST_ID_HEADER, Self::request_id())
            .send()
            .await?;

        let wire: ConnectedAccountWire = Self::read_json(response).await?;
        ConnectedAccount::try_from(wire)
    }

    #[instrument(skip_all, fields(connected_account_id = %params.connected_account_id))]
    async fn reinitiate_connection(
        &self,
        params: &ReinitiateParams,
    ) -> Result<ConnectionRequest, TransportError> {
        let url = self.endpoint(&[params.connected_account_id.as_str(), "reinitiate"]);
        let body = ReinitiateBody {
            redirect_uri: params.redirect_destination.as_ref().map(Url::as_str),
            data: params.data.as_ref(),
        };

        let response = self
            .client
            .post(url)
            .header(REQUEST_ID_HEADER, Self::request_id())
            .json(&body)
            .send()
            .await?;

        let wire: ConnectionRequestWire = Self::read_json(response).await?;
        ConnectionRequest::try_from(wire)
    }

    #[instrument(skip_all, fields(entity_id = %entity_id))]
    async fn list_connected_accounts(
        &self,
        entity_id: &EntityId,
        integration_id: Option<&IntegrationId>,
    ) -> Result<Vec<ConnectedAccount>, TransportError> {
        let mut url = self.endpoint(&[]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("user_uuid", entity_id.as_str());
            if let Some(integration_id) = integration_id {
                query.append_pair("integrationId", integration_id.as_str());
            }
        }

        let response = self
            .client
            .get(url)
            .header(REQUEST_ID_HEADER, Self::request_id())
            .send()
            .await?;

        let page: ConnectedAccountPage = Self::read_json(response).await?;
        page.items.into_iter().map(ConnectedAccount::try_from).collect()
    }
}
