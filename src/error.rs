//! Error types for the weather resolver

use thiserror::Error;

/// Crate-level error for setup and infrastructure failures.
///
/// Failures while resolving weather never surface as this type; they are
/// collapsed into an error [`WeatherResult`](crate::WeatherResult).
#[derive(Error, Debug)]
pub enum ResolverError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Cache operation errors
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// General application errors
    #[error("Application error: {message}")]
    General { message: String },
}

impl ResolverError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new cache error
    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Create a new general error
    pub fn general<S: Into<String>>(message: S) -> Self {
        Self::General {
            message: message.into(),
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            ResolverError::Config { message } => {
                format!("Configuration error: {message}. Please check your config file.")
            }
            ResolverError::Cache { .. } => {
                "Cache operation failed. You may need to clear the cache directory.".to_string()
            }
            ResolverError::Io { .. } => {
                "File operation failed. Please check file permissions.".to_string()
            }
            ResolverError::General { message } => message.clone(),
        }
    }
}
