//! Error types for the sovereign filter.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid batch schedule '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },
}

/// Contact registry / archive store faults.
///
/// A registry miss is never one of these: lookups return `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures that abort processing of a single inbound message.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("Contact lookup failed for {sender}: {source}")]
    Lookup {
        sender: String,
        #[source]
        source: RegistryError,
    },

    #[error("Failed to archive message {message_id}: {source}")]
    Archive {
        message_id: String,
        #[source]
        source: RegistryError,
    },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
