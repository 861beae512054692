#![allow(clippy::result_large_err)]

use super::DraftmillConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config from workspace root (workspace/draftmill.toml).
    /// Environment variables override config file values.
    pub fn load_from_workspace(workspace_path: &Path) -> Result<DraftmillConfig, AppError> {
        let config_path = workspace_path.join("draftmill.toml");
        let config_file = Self::load_from_file(&config_path)?;

        let mut config = config_file.unwrap_or_default();
        Self::apply_env_overrides(&mut config);
        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load config from a specific file path. Returns Ok(None) if the file doesn't exist.
    pub fn load_from_file(path: &Path) -> Result<Option<DraftmillConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
        })?;

        let config: DraftmillConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ValidationError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
        })?;

        Ok(Some(config))
    }

    fn apply_env_overrides(config: &mut DraftmillConfig) {
        if let Ok(bind) = env::var("DRAFTMILL_SERVER_BIND") {
            config.server.bind = bind;
        }

        if let Ok(auth_token_env) = env::var("DRAFTMILL_AUTH_TOKEN_ENV") {
            config.server.auth_token_env = auth_token_env;
        }

        if let Ok(max_attempts_str) = env::var("DRAFTMILL_RETRY_MAX_ATTEMPTS") {
            if let Ok(max_attempts) = max_attempts_str.parse::<u32>() {
                config.retry.max_attempts = max_attempts;
            }
        }

        if let Ok(initial_delay_str) = env::var("DRAFTMILL_RETRY_INITIAL_DELAY_MS") {
            if let Ok(initial_delay_ms) = initial_delay_str.parse::<u64>() {
                config.retry.initial_delay_ms = initial_delay_ms;
            }
        }

        if let Ok(timeout_str) = env::var("DRAFTMILL_WORK_TIMEOUT_MS") {
            if let Ok(work_timeout_ms) = timeout_str.parse::<u64>() {
                config.execution.work_timeout_ms = work_timeout_ms;
            }
        }
    }

    /// Validate configuration values
    pub fn validate_config(config: &DraftmillConfig) -> Result<(), AppError> {
        if config.server.bind.trim().is_empty() {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                "server.bind cannot be empty".to_string(),
            ));
        }

        if config.retry.max_attempts == 0 {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if config.retry.backoff_multiplier < 1.0 {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                "retry.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }

        if config.execution.work_timeout_ms == 0 {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                "execution.work_timeout_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "DRAFTMILL_SERVER_BIND - Override server bind address (default: 127.0.0.1:8319)",
            "DRAFTMILL_AUTH_TOKEN_ENV - Name of the env var holding the bearer token",
            "DRAFTMILL_RETRY_MAX_ATTEMPTS - Override default retry attempt budget",
            "DRAFTMILL_RETRY_INITIAL_DELAY_MS - Override the delay before the first retry",
            "DRAFTMILL_WORK_TIMEOUT_MS - Override the per-call collaborator timeout",
        ]
    }
}
