// src/error.rs

//! Unified error handling for the listing watcher.

use std::fmt;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization failed
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Source index could not be retrieved (network/timeout, transient)
    #[error("Fetch failure for {site}: {message}")]
    Fetch { site: String, message: String },

    /// Source markup was retrieved but not recognized
    #[error("Parse failure for {site}: {message}")]
    Parse { site: String, message: String },

    /// A source's batch could not be committed to the store
    #[error("Store commit failure for {site}: {message}")]
    StoreCommit { site: String, message: String },

    /// Notification channel delivery failed
    #[error("Notify failure on {channel}: {message}")]
    Notify { channel: String, message: String },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a fetch failure with source context.
    pub fn fetch(source: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            site: source.into(),
            message: message.to_string(),
        }
    }

    /// Create a parse failure with source context.
    pub fn parse(source: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Parse {
            site: source.into(),
            message: message.to_string(),
        }
    }

    /// Create a store commit failure with source context.
    pub fn store_commit(source: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::StoreCommit {
            site: source.into(),
            message: message.to_string(),
        }
    }

    /// Create a notification delivery failure.
    pub fn notify(channel: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Notify {
            channel: channel.into(),
            message: message.to_string(),
        }
    }

    /// Whether the failure is worth retrying on a later cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::Http(_) | Self::Io(_))
    }
}
