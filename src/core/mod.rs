pub mod config;
pub mod error;
pub mod types;
pub mod workflow;

pub use config::{ConfigLoader, DraftmillConfig};
pub use error::AppError;
pub use types::{ErrorCategory, ErrorSeverity};
