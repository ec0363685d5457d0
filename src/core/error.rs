//! Error types and handling for the gateway.
//!
//! Tool-level failures never reach this type: the dispatcher turns them into
//! response envelopes. What remains here are the conditions that stop the
//! process from starting or serving.

use thiserror::Error;

use super::transport::TransportError;
use crate::domains::tools::CatalogError;

/// A specialized Result type for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the gateway.
#[derive(Debug, Error)]
pub enum Error {
    /// The tool catalog is inconsistent (duplicate or empty tool name).
    #[error("Startup defect: {0}")]
    Catalog(#[from] CatalogError),

    /// Configuration is structurally malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport failed to start or broke down while serving.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// I/O errors from file operations or network communication.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error must stop the gateway before it serves anything.
    pub fn is_startup_defect(&self) -> bool {
        matches!(self, Self::Catalog(_) | Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_defects() {
        let err = Error::from(CatalogError::EmptyName {
            namespace: "storage".to_string(),
        });
        assert!(err.is_startup_defect());
        assert!(err.to_string().starts_with("Startup defect:"));

        assert!(Error::config("bad").is_startup_defect());
        assert!(!Error::from(std::io::Error::other("x")).is_startup_defect());
    }
}
