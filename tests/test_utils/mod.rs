//! Test utilities for exercising the client against a wiremock server.

use connections_client::HandshakeClient;
use connections_client::api::HttpConnectionsApi;
use connections_client::config::{ApiKey, ClientConfig};
use serde_json::{Value, json};
use wiremock::MockServer;

#[allow(dead_code)]
pub const TEST_API_KEY: &str = "sk_test_handshake_123";

/// Configuration pointing at the mock server with the shortest allowed poll interval.
#[allow(dead_code)]
pub fn test_config(server: &MockServer) -> ClientConfig {
    ClientConfig {
        profile: "test".to_string(),
        api_base: server.uri(),
        api_key: Some(ApiKey::new(TEST_API_KEY)),
        poll_interval_ms: 1_000,
        activation_timeout_seconds: 10,
        request_timeout_seconds: 5,
        ..ClientConfig::default()
    }
}

#[allow(dead_code)]
pub fn http_api(server: &MockServer) -> HttpConnectionsApi {
    HttpConnectionsApi::from_config(&test_config(server)).expect("http api builds")
}

#[allow(dead_code)]
pub fn handshake_client(server: &MockServer) -> HandshakeClient {
    HandshakeClient::from_config(&test_config(server)).expect("handshake client builds")
}

/// Body of an initiate or reinitiate response.
#[allow(dead_code)]
pub fn connection_request_body(id: &str, status: &str, redirect_url: Option<&str>) -> Value {
    let mut body = json!({
        "connectedAccountId": id,
        "connectionStatus": status,
    });
    if let Some(url) = redirect_url {
        body["redirectUrl"] = json!(url);
    }
    body
}

/// Body of a connected account record.
#[allow(dead_code)]
pub fn account_body(id: &str, status: &str) -> Value {
    json!({
        "id": id,
        "status": status,
        "integrationId": "int_google_1",
        "appName": "gmail",
        "clientUniqueUserId": "alice",
        "createdAt": "2026-03-01T10:00:00Z",
        "updatedAt": "2026-03-01T10:05:00Z"
    })
}
