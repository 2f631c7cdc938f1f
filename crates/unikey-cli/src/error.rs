//! CLI error types.

use thiserror::Error;

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Storage or constraint error from the core.
    #[error("storage error: {0}")]
    Core(#[from] unikey_core::Error),

    /// Output encoding error.
    #[error("output error: {0}")]
    Output(#[from] serde_json::Error),

    /// Malformed `name=value` field argument.
    #[error("invalid field '{0}': expected name=value")]
    InvalidField(String),

    /// The same field was given twice.
    #[error("duplicate field '{0}'")]
    DuplicateField(String),
}
