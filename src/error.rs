//! Failure taxonomy for pipeline runs.
//!
//! Operations return [`anyhow::Result`] and raise one of these variants at the
//! point of failure; callers classify a failure with
//! `err.downcast_ref::<EtlError>()`, which sees through attached context.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtlError {
    /// A configuration key that the run cannot do without is absent.
    #[error("Missing required configuration key '{0}'")]
    MissingKey(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Provided file path is invalid: <{}>", .0.display())]
    PathNotFound(PathBuf),

    #[error("Provided directory path is invalid: <{}>", .0.display())]
    NotADirectory(PathBuf),

    #[error("Column <{0}> is missing from given table")]
    MissingColumn(String),

    #[error("Cannot convert '{value}' in column <{column}> to {target}")]
    Coercion {
        column: String,
        value: String,
        target: String,
    },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}
