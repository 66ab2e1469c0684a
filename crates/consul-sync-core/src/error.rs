//! Unified error type for consul-sync core.

use consul_sync_types::{ConfigError, RegistryError, TypedError};
use thiserror::Error;

/// Main error type for all core operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConsulError {
    /// Configuration is unusable (missing port/address/consulServiceName, bad agent port).
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A registry agent call failed.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Building the HTTP client failed.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// File system I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConsulError {
    /// Shorthand for a missing required value.
    pub fn missing(field: impl Into<String>) -> Self {
        Self::Config(ConfigError::MissingField { field: field.into() })
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl From<TypedError> for ConsulError {
    fn from(e: TypedError) -> Self {
        match e {
            TypedError::Config(c) => Self::Config(c),
            TypedError::Registry(r) => Self::Registry(r),
        }
    }
}

/// Result type alias for core operations.
pub type ConsulResult<T> = Result<T, ConsulError>;
