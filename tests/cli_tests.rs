use assert_cmd::Command;
use serde_json::{Value, json};
use tempfile::TempDir;
mod test_utils;
use test_utils::{TEST_API_KEY, account_body, connection_request_body};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path, query_param},
};

struct CliOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// Run the `connect` binary against the mock server from an empty working directory.
fn run_cli(server: &MockServer, args: &[&str]) -> CliOutput {
    let work_dir = TempDir::new().unwrap();
    let output = Command::cargo_bin("connect")
        .unwrap()
        .current_dir(work_dir.path())
        .env_remove("CONNECT_PROFILE")
        .env_remove("RUST_LOG")
        .env("CONNECT_API_BASE", server.uri())
        .env("CONNECT_API_KEY", TEST_API_KEY)
        .env("CONNECT_POLL_INTERVAL_MS", "1000")
        .env("CONNECT_LOG_LEVEL", "warn")
        .args(args)
        .output()
        .unwrap();

    CliOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_prints_json() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/connectedAccounts/ca_123"))
        .and(header("x-api-key", TEST_API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(account_body("ca_123", "ACTIVE")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let output = run_cli(&mock_server, &["status", "ca_123", "--json"]);

    assert!(output.success, "stderr: {}", output.stderr);
    let parsed: Value = serde_json::from_str(&output.stdout).unwrap();
    assert_eq!(parsed["id"], "ca_123");
    assert_eq!(parsed["status"], "ACTIVE");
    assert_eq!(parsed["appName"], "gmail");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_initiate_prints_redirect_url() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/connectedAccounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(connection_request_body(
            "ca_123",
            "INITIATED",
            Some("https://accounts.google.com/o/oauth2/auth?state=xyz"),
        )))
        .mount(&mock_server)
        .await;

    let output = run_cli(
        &mock_server,
        &["initiate", "--integration", "int_google_1", "--entity", "alice"],
    );

    assert!(output.success, "stderr: {}", output.stderr);
    assert!(output.stdout.contains("connected_account_id: ca_123"));
    assert!(output.stdout.contains("status: INITIATED"));
    assert!(
        output
            .stdout
            .contains("redirect_url: https://accounts.google.com/o/oauth2/auth?state=xyz")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connect_prints_redirect_then_active_status() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/connectedAccounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(connection_request_body(
            "ca_123",
            "INITIATED",
            Some("https://github.com/login/oauth/authorize?state=abc"),
        )))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/connectedAccounts/ca_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(account_body("ca_123", "ACTIVE")))
        .mount(&mock_server)
        .await;

    let output = run_cli(
        &mock_server,
        &[
            "connect",
            "--integration",
            "int_github_1",
            "--entity",
            "alice",
            "--timeout",
            "5",
        ],
    );

    assert!(output.success, "stderr: {}", output.stderr);
    assert!(
        output
            .stdout
            .contains("Open this URL to authorize: https://github.com/login/oauth/authorize?state=abc")
    );
    assert!(output.stdout.contains("status: ACTIVE"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wait_fails_on_timeout() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/connectedAccounts/ca_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(account_body("ca_123", "INITIATED")))
        .mount(&mock_server)
        .await;

    let output = run_cli(&mock_server, &["wait", "ca_123", "--timeout", "1"]);

    assert!(!output.success);
    assert!(output.stderr.contains("did not become active"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_accounts_lists_one_line_per_account() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/connectedAccounts"))
        .and(query_param("user_uuid", "alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                account_body("ca_1", "ACTIVE"),
                account_body("ca_2", "EXPIRED")
            ]
        })))
        .mount(&mock_server)
        .await;

    let output = run_cli(&mock_server, &["accounts", "--entity", "alice"]);

    assert!(output.success, "stderr: {}", output.stderr);
    let lines: Vec<&str> = output.stdout.lines().collect();
    assert_eq!(lines, vec!["ca_1\tACTIVE\tgmail", "ca_2\tEXPIRED\tgmail"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_error_exits_non_zero() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/connectedAccounts/ca_missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "status": 404,
            "message": "Connected account not found",
            "type": "NotFoundError"
        })))
        .mount(&mock_server)
        .await;

    let output = run_cli(&mock_server, &["status", "ca_missing"]);

    assert!(!output.success);
    assert!(output.stderr.contains("Connected account not found"));
}

#[test]
fn test_missing_api_key_fails_fast() {
    let work_dir = TempDir::new().unwrap();
    let output = Command::cargo_bin("connect")
        .unwrap()
        .current_dir(work_dir.path())
        .env_remove("CONNECT_API_KEY")
        .env_remove("CONNECT_PROFILE")
        .args(["status", "ca_123"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("API key is missing"));
}
