//! Error types shared across Conveyor crates
//!
//! Errors carry structured context (which operation, which field) so log
//! lines point at the failing piece without extra plumbing.

use thiserror::Error;

/// Shared error type for client construction and configuration
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration value
    #[error("configuration error: {field}: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
        /// The offending setting (e.g., "poll_interval")
        field: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Where the error occurred (e.g., "create_client")
        context: String,
    },
}

impl Error {
    /// Create a configuration error for a specific setting
    pub fn config_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            field: field.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }
}
