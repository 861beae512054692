use draftmill::core::config::DraftmillConfig;
use draftmill::core::ConfigLoader;
use std::env;
use std::sync::Mutex;
use tempfile::TempDir;

// Environment mutations are process-global; serialize the tests that touch them.
static ENV_LOCK: Mutex<()> = Mutex::new(());

struct EnvGuard {
    key: &'static str,
    previous: Option<String>,
}

impl EnvGuard {
    fn set(key: &'static str, value: &str) -> Self {
        let previous = env::var(key).ok();
        env::set_var(key, value);
        EnvGuard { key, previous }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(previous) => env::set_var(self.key, previous),
            None => env::remove_var(self.key),
        }
    }
}

#[test]
fn test_missing_file_yields_defaults() {
    let _lock = ENV_LOCK.lock().unwrap();
    let dir = TempDir::new().unwrap();

    let config = ConfigLoader::load_from_workspace(dir.path()).unwrap();
    assert_eq!(config.server.bind, "127.0.0.1:8319");
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.execution.work_timeout_ms, 120_000);
}

#[test]
fn test_file_values_override_defaults() {
    let _lock = ENV_LOCK.lock().unwrap();
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("draftmill.toml"),
        r#"
[server]
bind = "0.0.0.0:9200"

[retry]
max_attempts = 7
jitter_ms = 100

[gates]
article_generation_fail_open = false
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_workspace(dir.path()).unwrap();
    assert_eq!(config.server.bind, "0.0.0.0:9200");
    assert_eq!(config.retry.max_attempts, 7);
    assert_eq!(config.retry.jitter_ms, 100);
    assert!(!config.gates.article_generation_fail_open);
    // Sections absent from the file keep their defaults.
    assert!(config.gates.seed_approval_fail_open);
    assert_eq!(config.server.auth_token_env, "DRAFTMILL_AUTH_TOKEN");
}

#[test]
fn test_env_overrides_beat_file_values() {
    let _lock = ENV_LOCK.lock().unwrap();
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("draftmill.toml"),
        "[server]\nbind = \"0.0.0.0:9200\"\n\n[retry]\nmax_attempts = 7\n",
    )
    .unwrap();

    let _bind = EnvGuard::set("DRAFTMILL_SERVER_BIND", "127.0.0.1:7777");
    let _attempts = EnvGuard::set("DRAFTMILL_RETRY_MAX_ATTEMPTS", "2");
    let _timeout = EnvGuard::set("DRAFTMILL_WORK_TIMEOUT_MS", "1500");

    let config = ConfigLoader::load_from_workspace(dir.path()).unwrap();
    assert_eq!(config.server.bind, "127.0.0.1:7777");
    assert_eq!(config.retry.max_attempts, 2);
    assert_eq!(config.execution.work_timeout_ms, 1500);
}

#[test]
fn test_unparseable_env_override_is_ignored() {
    let _lock = ENV_LOCK.lock().unwrap();
    let dir = TempDir::new().unwrap();

    let _attempts = EnvGuard::set("DRAFTMILL_RETRY_MAX_ATTEMPTS", "not-a-number");
    let config = ConfigLoader::load_from_workspace(dir.path()).unwrap();
    assert_eq!(config.retry.max_attempts, 3);
}

#[test]
fn test_malformed_file_is_an_error() {
    let _lock = ENV_LOCK.lock().unwrap();
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("draftmill.toml"), "[server\nbind=").unwrap();

    assert!(ConfigLoader::load_from_workspace(dir.path()).is_err());
}

#[test]
fn test_validation_rejects_bad_values() {
    let mut config = DraftmillConfig::default();
    config.retry.backoff_multiplier = 0.9;
    assert!(ConfigLoader::validate_config(&config).is_err());

    let mut config = DraftmillConfig::default();
    config.server.bind = "  ".to_string();
    assert!(ConfigLoader::validate_config(&config).is_err());

    let mut config = DraftmillConfig::default();
    config.execution.work_timeout_ms = 0;
    assert!(ConfigLoader::validate_config(&config).is_err());
}

#[test]
fn test_env_var_documentation_lists_every_override() {
    let docs = ConfigLoader::env_var_documentation();
    for var in [
        "DRAFTMILL_SERVER_BIND",
        "DRAFTMILL_AUTH_TOKEN_ENV",
        "DRAFTMILL_RETRY_MAX_ATTEMPTS",
        "DRAFTMILL_RETRY_INITIAL_DELAY_MS",
        "DRAFTMILL_WORK_TIMEOUT_MS",
    ] {
        assert!(docs.iter().any(|doc| doc.contains(var)), "{} missing", var);
    }
}
