//! CertWatch error type — one enum for the whole workspace.

use thiserror::Error;

/// Workspace-wide result alias.
pub type Result<T> = std::result::Result<T, CertWatchError>;

/// All CertWatch errors.
#[derive(Error, Debug)]
pub enum CertWatchError {
    /// Configuration load/parse problems.
    #[error("Config error: {0}")]
    Config(String),

    /// Database errors. Fatal to the current tenant's sweep.
    #[error("Store error: {0}")]
    Store(String),

    /// Write-time validation rejections (rules, records).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Outbound mail dispatch failures, including send timeouts.
    #[error("Send error: {0}")]
    Send(String),

    /// Requested entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CertWatchError {
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
