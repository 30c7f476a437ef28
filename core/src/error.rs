//! Error types for the pomonote core.
//!
//! This module defines the crate-level error type, aggregating the
//! per-concern errors from the config, vault, and corrector modules.

use thiserror::Error;

use crate::config::ConfigError;
use crate::vault::VaultError;

/// Errors that can occur during core operations.
///
/// This is the primary error type for the crate, encompassing all possible
/// failure modes that cross a component boundary. Internal parsing and
/// resolution failures never surface here; they degrade to empty or
/// neutral results inside their component.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Document store error.
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_conversion() {
        let config_err = ConfigError::MissingEnvVar("POMONOTE_VAULT_DIR".to_string());
        let err: CoreError = config_err.into();
        assert!(matches!(err, CoreError::Config(_)));
        assert_eq!(
            err.to_string(),
            "configuration error: missing required environment variable: POMONOTE_VAULT_DIR"
        );
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CoreError = io_err.into();
        assert!(matches!(err, CoreError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn error_source_chain() {
        use std::error::Error;

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: CoreError = io_err.into();
        assert!(err.source().is_some());
    }
}
