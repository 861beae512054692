use crate::core::types::{ErrorCategory, ErrorSeverity};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug)]
pub struct AppError {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub code: String,
    pub message: String,
    pub context: HashMap<String, String>,
    pub occurred_at: DateTime<Utc>,
    pub retry_count: u32,
    pub source: Option<anyhow::Error>,
}

impl AppError {
    pub fn new<T: Into<String>>(category: ErrorCategory, message: T) -> Self {
        let severity = match category {
            ErrorCategory::ConflictError | ErrorCategory::GateBlockedError => {
                ErrorSeverity::Warning
            }
            ErrorCategory::Unknown => ErrorSeverity::Info,
            _ => ErrorSeverity::Error,
        };
        AppError {
            category,
            severity,
            code: format!("ERR-{}", uuid::Uuid::new_v4()),
            message: message.into(),
            context: HashMap::new(),
            occurred_at: Utc::now(),
            retry_count: 0,
            source: None,
        }
    }

    pub fn with_source<T: Into<String>>(
        category: ErrorCategory,
        message: T,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        let mut error = AppError::new(category, message);
        error.source = Some(anyhow::anyhow!(source));
        error
    }

    pub fn with_code<T: Into<String>>(mut self, code: T) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_context<T: Into<String>>(mut self, context: T) -> Self {
        self.context.insert("context".to_string(), context.into());
        self
    }

    pub fn add_context(&mut self, key: &str, value: &str) {
        self.context.insert(key.to_string(), value.to_string());
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    /// Annotate the error with the number of retry attempts consumed before it escaped.
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Whether the retry loop may attempt the failed operation again.
    ///
    /// Category is the primary signal. Errors raised by opaque collaborators
    /// sometimes arrive as `InternalError` with only a message; those fall
    /// through to a message inspection for the usual transient phrasings.
    pub fn is_retryable(&self) -> bool {
        match self.category {
            ErrorCategory::TransientError
            | ErrorCategory::TimeoutError
            | ErrorCategory::RateLimitError => true,
            ErrorCategory::ValidationError
            | ErrorCategory::ConflictError
            | ErrorCategory::GateBlockedError
            | ErrorCategory::TerminalExecutionError
            | ErrorCategory::NotFoundError
            | ErrorCategory::AuthError
            | ErrorCategory::SerializationError => false,
            _ => transient_message_pattern().is_match(&self.message),
        }
    }
}

fn transient_message_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        regex::Regex::new(
            r"(?i)(timed? ?out|connection reset|connection refused|rate limit|too many requests|status (429|5\d\d)|temporarily unavailable)",
        )
        .expect("transient pattern is valid")
    })
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.category, self.message)?;
        if !self.context.is_empty() {
            write!(f, " (Context: {:?})", self.context)?;
        }
        if self.retry_count > 0 {
            write!(f, " (after {} retries)", self.retry_count)?;
        }
        if let Some(ref source) = self.source {
            write!(f, "\nCaused by: {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError {
            category: ErrorCategory::InternalError,
            severity: ErrorSeverity::Error,
            code: "ANYHOW_ERROR".to_string(),
            message: e.to_string(),
            context: HashMap::new(),
            occurred_at: Utc::now(),
            retry_count: 0,
            source: Some(e),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError {
            category: ErrorCategory::IoError,
            severity: ErrorSeverity::Error,
            code: "IO_ERROR".to_string(),
            message: e.to_string(),
            context: HashMap::new(),
            occurred_at: Utc::now(),
            retry_count: 0,
            source: Some(anyhow::anyhow!(e)),
        }
    }
}
