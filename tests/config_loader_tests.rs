use connections_client::config::{ConfigError, ConfigLoader};
use std::{
    env, fs,
    sync::{Mutex, MutexGuard, OnceLock},
    time::Duration,
};
use tempfile::TempDir;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

const KEYS: [&str; 9] = [
    "CONNECT_PROFILE",
    "CONNECT_API_BASE",
    "CONNECT_API_KEY",
    "CONNECT_POLL_INTERVAL_MS",
    "CONNECT_ACTIVATION_TIMEOUT_SECONDS",
    "CONNECT_REQUEST_TIMEOUT_SECONDS",
    "CONNECT_LOG_LEVEL",
    "CONNECT_LOG_FORMAT",
    "RUST_LOG",
];

fn clear_env() {
    unsafe {
        for key in KEYS {
            env::remove_var(key);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

#[test]
fn loads_defaults_when_only_key_present() {
    let _guard = env_guard();
    clear_env();
    unsafe {
        env::set_var("CONNECT_API_KEY", "sk_live_defaults");
    }

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_base, "https://backend.composio.dev/api");
    assert_eq!(cfg.poll_interval(), Duration::from_secs(3));
    assert_eq!(cfg.activation_timeout(), Duration::from_secs(60));
    assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.log_format, "pretty");
    assert_eq!(
        cfg.api_key.as_ref().map(|key| key.expose()),
        Some("sk_live_defaults")
    );
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "CONNECT_POLL_INTERVAL_MS=2000\n");
    write_env_file(&temp_dir, ".env.test", "CONNECT_POLL_INTERVAL_MS=4000\n");
    write_env_file(&temp_dir, ".env.test.local", "CONNECT_POLL_INTERVAL_MS=5000\n");

    // Select profile via .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        "CONNECT_PROFILE=test\nCONNECT_POLL_INTERVAL_MS=2500\n",
    );

    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("layered config loads");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.poll_interval_ms, 5_000);
    // The test profile may omit the API key
    assert!(cfg.api_key.is_none());
    clear_env();
}

#[test]
fn process_env_overrides_files() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "CONNECT_API_KEY=sk_from_file\nCONNECT_LOG_FORMAT=pretty\n",
    );
    unsafe {
        env::set_var("CONNECT_LOG_FORMAT", "JSON");
        env::set_var("CONNECT_API_BASE", "http://127.0.0.1:9000/api");
    }

    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("config loads");

    assert_eq!(cfg.log_format, "json");
    assert_eq!(
        cfg.api_base_url().unwrap().as_str(),
        "http://127.0.0.1:9000/api"
    );
    assert_eq!(
        cfg.api_key.as_ref().map(|key| key.expose()),
        Some("sk_from_file")
    );
    clear_env();
}

#[test]
fn missing_api_key_is_rejected_outside_test_profile() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let err = loader.load().unwrap_err();

    assert!(matches!(err, ConfigError::MissingApiKey));
    clear_env();
}

#[test]
fn poll_interval_below_floor_is_rejected() {
    let _guard = env_guard();
    clear_env();
    unsafe {
        env::set_var("CONNECT_API_KEY", "sk_live_123");
        env::set_var("CONNECT_POLL_INTERVAL_MS", "250");
    }

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let err = loader.load().unwrap_err();

    assert!(matches!(
        err,
        ConfigError::InvalidPollInterval { value: 250, .. }
    ));
    clear_env();
}

#[test]
fn non_numeric_timeout_is_rejected() {
    let _guard = env_guard();
    clear_env();
    unsafe {
        env::set_var("CONNECT_API_KEY", "sk_live_123");
        env::set_var("CONNECT_ACTIVATION_TIMEOUT_SECONDS", "soon");
    }

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let err = loader.load().unwrap_err();

    match err {
        ConfigError::InvalidNumber { key, value } => {
            assert_eq!(key, "CONNECT_ACTIVATION_TIMEOUT_SECONDS");
            assert_eq!(value, "soon");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    clear_env();
}

#[test]
fn redacted_json_hides_api_key() {
    let _guard = env_guard();
    clear_env();
    unsafe {
        env::set_var("CONNECT_API_KEY", "sk_live_secret_value");
    }

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("config loads");
    let json = cfg.redacted_json().unwrap();

    assert!(!json.contains("sk_live_secret_value"));
    assert!(json.contains("[REDACTED]"));
    assert!(!format!("{cfg:?}").contains("sk_live_secret_value"));
    clear_env();
}
