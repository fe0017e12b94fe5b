//! # Connection Handshake
//!
//! Initiates a connection for an entity, surfaces the redirect URL to the
//! caller and waits for the remote service to report the connected account as
//! active. The wait is a bounded polling loop that can be cancelled at any
//! point; dropping an in-flight status request aborts it.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::api::{ConnectionsApi, HttpConnectionsApi, InitiateParams, ReinitiateParams};
use crate::config::{ClientConfig, MAX_POLL_INTERVAL, MIN_POLL_INTERVAL};
use crate::error::HandshakeError;
use crate::models::{
    ConnectedAccount, ConnectedAccountId, ConnectionRequest, ConnectionStatus, EntityId,
    IntegrationId,
};

/// Default spacing between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default bound on how long `await_active` waits.
pub const DEFAULT_ACTIVATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the connection-initiation-and-activation handshake
pub struct HandshakeClient<A = HttpConnectionsApi> {
    api: Arc<A>,
    poll_interval: Duration,
    default_timeout: Duration,
}

impl HandshakeClient<HttpConnectionsApi> {
    /// Build an HTTP-backed client from loaded configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self, HandshakeError> {
        let api = HttpConnectionsApi::from_config(config)?;
        Ok(Self::new(api)
            .with_poll_interval(config.poll_interval())
            .with_default_timeout(config.activation_timeout()))
    }
}

impl<A: ConnectionsApi> HandshakeClient<A> {
    pub fn new(api: A) -> Self {
        Self {
            api: Arc::new(api),
            poll_interval: DEFAULT_POLL_INTERVAL,
            default_timeout: DEFAULT_ACTIVATION_TIMEOUT,
        }
    }

    /// Set the polling interval, clamped to [`MIN_POLL_INTERVAL`]..=[`MAX_POLL_INTERVAL`].
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        let clamped = interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        if clamped != interval {
            warn!(
                requested_ms = interval.as_millis() as u64,
                clamped_ms = clamped.as_millis() as u64,
                "Poll interval out of range, clamping"
            );
        }
        self.poll_interval = clamped;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Start a connection for `entity_id` against `integration_id`.
    ///
    /// OAuth integrations answer with status INITIATED and a redirect URL. A
    /// missing redirect URL is returned as-is; use
    /// [`ConnectionRequest::require_redirect_url`] or [`HandshakeClient::connect`]
    /// to turn it into a configuration error.
    pub async fn initiate(
        &self,
        integration_id: &IntegrationId,
        entity_id: &EntityId,
        redirect_destination: Option<Url>,
    ) -> Result<ConnectionRequest, HandshakeError> {
        let mut params = InitiateParams::new(integration_id.clone(), entity_id.clone());
        params.redirect_destination = redirect_destination;
        self.initiate_with(params).await
    }

    /// Same as [`HandshakeClient::initiate`], with full control over the request parameters.
    #[instrument(
        skip_all,
        fields(integration_id = %params.integration_id, entity_id = %params.entity_id)
    )]
    pub async fn initiate_with(
        &self,
        params: InitiateParams,
    ) -> Result<ConnectionRequest, HandshakeError> {
        match self.api.initiate_connection(&params).await {
            Ok(request) => {
                counter!("connection_initiate_total", "outcome" => "ok").increment(1);

                if request.redirect_url().is_none() && !request.is_active() {
                    warn!(
                        connected_account_id = %request.connected_account_id(),
                        status = %request.status(),
                        "Connection initiated without a redirect URL"
                    );
                }

                info!(
                    connected_account_id = %request.connected_account_id(),
                    status = %request.status(),
                    "Connection initiated"
                );
                Ok(request)
            }
            Err(err) => {
                counter!("connection_initiate_total", "outcome" => "error").increment(1);
                error!(error = %err, "Failed to initiate connection");
                Err(err.into())
            }
        }
    }

    /// Wait until the remote reports `request` as ACTIVE.
    pub async fn await_active(
        &self,
        request: ConnectionRequest,
        timeout: Duration,
    ) -> Result<ConnectionRequest, HandshakeError> {
        self.await_active_until_cancelled(request, timeout, &CancellationToken::new())
            .await
    }

    /// Poll the status endpoint until ACTIVE, a terminal failure, the deadline or cancellation.
    ///
    /// The first poll is immediate; subsequent polls are spaced by the poll
    /// interval and never scheduled past the deadline. A status request still
    /// in flight when the deadline passes is dropped. A timeout too large to
    /// represent as an instant leaves the wait unbounded.
    #[instrument(
        skip_all,
        fields(
            connected_account_id = %request.connected_account_id(),
            timeout_ms = timeout.as_millis() as u64
        )
    )]
    pub async fn await_active_until_cancelled(
        &self,
        mut request: ConnectionRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ConnectionRequest, HandshakeError> {
        let started = Instant::now();
        let deadline = started.checked_add(timeout);
        let id = request.connected_account_id().clone();
        let mut polls: u32 = 0;

        let timed_out = |polls: u32| HandshakeError::Timeout {
            connected_account_id: id.clone(),
            waited: started.elapsed(),
            polls,
        };
        let cancelled = || HandshakeError::Cancelled {
            connected_account_id: id.clone(),
        };

        let outcome = loop {
            polls += 1;
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(cancelled()),
                result = self.api.get_connected_account(&id) => result,
                _ = expire_at(deadline) => break Err(timed_out(polls)),
            };
            counter!("connection_status_poll_total").increment(1);

            let account = match polled {
                Ok(account) => account,
                Err(err) => {
                    error!(poll = polls, error = %err, "Connection status poll failed");
                    break Err(err.into());
                }
            };

            request.observe(account.status);
            debug!(poll = polls, status = %account.status, "Observed connection status");

            if account.status.is_terminal() {
                break match account.status {
                    ConnectionStatus::Active => Ok(()),
                    status => Err(HandshakeError::Activation {
                        connected_account_id: id.clone(),
                        status,
                    }),
                };
            }

            let next_poll = Instant::now() + self.poll_interval;
            let wake = deadline.map_or(next_poll, |deadline| next_poll.min(deadline));
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(cancelled()),
                _ = sleep_until(wake) => {}
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break Err(timed_out(polls));
            }
        };

        let waited = started.elapsed();
        histogram!("connection_activation_wait_ms").record(waited.as_secs_f64() * 1_000.0);

        let outcome_label = match &outcome {
            Ok(()) => "active",
            Err(HandshakeError::Activation {
                status: ConnectionStatus::Expired,
                ..
            }) => "expired",
            Err(HandshakeError::Activation { .. }) => "failed",
            Err(HandshakeError::Timeout { .. }) => "timeout",
            Err(HandshakeError::Cancelled { .. }) => "cancelled",
            Err(_) => "transport_error",
        };
        counter!("connection_activation_total", "outcome" => outcome_label).increment(1);

        match outcome {
            Ok(()) => {
                info!(
                    polls,
                    waited_ms = waited.as_millis() as u64,
                    "Connection is active"
                );
                Ok(request)
            }
            Err(err) => {
                warn!(
                    polls,
                    waited_ms = waited.as_millis() as u64,
                    outcome = outcome_label,
                    "Connection did not become active"
                );
                Err(err)
            }
        }
    }

    /// Start a fresh authorization attempt for an existing connected account.
    ///
    /// The returned request is always INITIATED and tied to `connected_account_id`.
    #[instrument(skip_all, fields(connected_account_id = %connected_account_id))]
    pub async fn reinitiate(
        &self,
        connected_account_id: &ConnectedAccountId,
        redirect_destination: Option<Url>,
    ) -> Result<ConnectionRequest, HandshakeError> {
        let params = ReinitiateParams {
            connected_account_id: connected_account_id.clone(),
            redirect_destination,
            data: None,
        };

        let returned = match self.api.reinitiate_connection(&params).await {
            Ok(returned) => returned,
            Err(err) => {
                counter!("connection_reinitiate_total", "outcome" => "error").increment(1);
                error!(error = %err, "Failed to reinitiate connection");
                return Err(err.into());
            }
        };
        counter!("connection_reinitiate_total", "outcome" => "ok").increment(1);

        if returned.connected_account_id() != connected_account_id {
            warn!(
                returned_id = %returned.connected_account_id(),
                "Remote answered reinitiate for a different connected account"
            );
        }
        if returned.status() != ConnectionStatus::Initiated {
            warn!(
                remote_status = %returned.status(),
                "Remote reported a non-initial status after reinitiate"
            );
        }

        info!("Connection reinitiated");
        Ok(ConnectionRequest::new(
            connected_account_id.clone(),
            returned.redirect_url().cloned(),
            ConnectionStatus::Initiated,
        ))
    }

    /// Initiate, hand the redirect URL to `on_redirect`, then wait for activation.
    ///
    /// Integrations that come back ACTIVE straight away (inline credentials) are
    /// returned without polling. Anything else without a redirect URL is a
    /// configuration error.
    pub async fn connect<F>(
        &self,
        params: InitiateParams,
        on_redirect: F,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ConnectionRequest, HandshakeError>
    where
        F: FnOnce(&Url),
    {
        let request = self.initiate_with(params).await?;
        if request.is_active() {
            return Ok(request);
        }

        on_redirect(request.require_redirect_url()?);
        self.await_active_until_cancelled(request, timeout, cancel)
            .await
    }

    /// Fetch the current remote record of a connected account.
    pub async fn connected_account(
        &self,
        id: &ConnectedAccountId,
    ) -> Result<ConnectedAccount, HandshakeError> {
        Ok(self.api.get_connected_account(id).await?)
    }

    /// List an entity's connected accounts, optionally for a single integration.
    pub async fn list_connected_accounts(
        &self,
        entity_id: &EntityId,
        integration_id: Option<&IntegrationId>,
    ) -> Result<Vec<ConnectedAccount>, HandshakeError> {
        Ok(self
            .api
            .list_connected_accounts(entity_id, integration_id)
            .await?)
    }
}

/// Resolves at `deadline`, or never for an unbounded wait.
async fn expire_at(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl<A> Clone for HandshakeClient<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            poll_interval: self.poll_interval,
            default_timeout: self.default_timeout,
        }
    }
}
