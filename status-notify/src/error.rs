//! Crate-wide error types.
//!
//! These errors signal misuse of the API (notifying before initialization,
//! registering a provider type twice, ...) or failures of the surrounding
//! plumbing such as reading a configuration file. Delivery failures are never
//! reported through this type; they are values of
//! [`NotificationError`](crate::notification::NotificationError).

use thiserror::Error;

use crate::notification::NotificationError;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Notification service is not initialized")]
    NotInitialized,

    #[error("Notification service is already initialized")]
    AlreadyInitialized,

    #[error("Provider type '{0}' is already registered")]
    DuplicateProviderType(String),

    #[error("Duplicate provider id '{0}'")]
    DuplicateProviderId(String),

    #[error("Unknown provider type '{provider_type}', available: [{}]", .available.join(", "))]
    UnknownProviderType {
        provider_type: String,
        available: Vec<String>,
    },

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Invalid provider configuration: {}", format_config_errors(.0))]
    InvalidProviderConfigs(Vec<(usize, NotificationError)>),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn unknown_provider_type(
        provider_type: impl Into<String>,
        available: impl IntoIterator<Item = String>,
    ) -> Self {
        Self::UnknownProviderType {
            provider_type: provider_type.into(),
            available: available.into_iter().collect(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

fn format_config_errors(errors: &[(usize, NotificationError)]) -> String {
    errors
        .iter()
        .map(|(index, error)| format!("[{}] {}", index, error.message))
        .collect::<Vec<_>>()
        .join("; ")
}
