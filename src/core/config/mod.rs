use serde::{Deserialize, Serialize};

/// Main Draftmill configuration loaded from draftmill.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DraftmillConfig {
    /// HTTP trigger server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Default retry policy applied to step work units
    #[serde(default)]
    pub retry: RetryConfig,

    /// Per-gate fail-open toggles
    #[serde(default)]
    pub gates: GatesConfig,

    /// Unit-of-work execution limits
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// HTTP trigger server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Environment variable holding the bearer auth token
    #[serde(default = "default_auth_token_env")]
    pub auth_token_env: String,

    /// Maximum accepted request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Default retry policy values; callers may override per invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound on any single backoff sleep, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Optional random jitter added to each sleep; zero keeps backoff deterministic
    #[serde(default)]
    pub jitter_ms: u64,
}

/// Per-gate fail-open toggles. A fail-open gate resolves evaluation errors
/// to allowed; a fail-closed gate blocks on them instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatesConfig {
    #[serde(default = "default_fail_open")]
    pub seed_approval_fail_open: bool,

    #[serde(default = "default_fail_open")]
    pub topic_approval_fail_open: bool,

    #[serde(default = "default_fail_open")]
    pub article_generation_fail_open: bool,
}

/// Unit-of-work execution limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Hard timeout for one collaborator call, in milliseconds.
    /// Distinct from the retry policy's attempt budget.
    #[serde(default = "default_work_timeout_ms")]
    pub work_timeout_ms: u64,
}

// Default functions
fn default_bind() -> String {
    "127.0.0.1:8319".to_string()
}

fn default_auth_token_env() -> String {
    "DRAFTMILL_AUTH_TOKEN".to_string()
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_fail_open() -> bool {
    true
}

fn default_work_timeout_ms() -> u64 {
    120_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_bind(),
            auth_token_env: default_auth_token_env(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: 0,
        }
    }
}

impl Default for GatesConfig {
    fn default() -> Self {
        GatesConfig {
            seed_approval_fail_open: true,
            topic_approval_fail_open: true,
            article_generation_fail_open: true,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            work_timeout_ms: default_work_timeout_ms(),
        }
    }
}


pub mod loader;

pub use loader::ConfigLoader;
