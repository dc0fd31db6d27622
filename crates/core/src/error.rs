// Central Error Type for the Harness
//
// Only `Transient` is retryable. Everything else fails the scenario immediately.

use std::path::PathBuf;
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Timed out waiting for lock on {} after {waited_secs}s", path.display())]
    LockTimeout { path: PathBuf, waited_secs: u64 },

    #[error("Lock error on {}: {message}", path.display())]
    Lock { path: PathBuf, message: String },

    #[error("Download of {url} failed: {message}")]
    Download { url: String, message: String },

    #[error("Digest mismatch for {artifact}: expected {expected}, got {actual}")]
    DigestMismatch {
        artifact: String,
        expected: String,
        actual: String,
    },

    #[error("Extraction of {artifact} failed: {message}")]
    Extraction { artifact: String, message: String },

    #[error("Launch misconfiguration: {0}")]
    Misconfiguration(String),

    #[error("Spawn failed: {0}")]
    Spawn(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Timed out after {after_secs}s without a self-reported exit code")]
    TimedOut { after_secs: u64 },

    #[error("Exit code mismatch: expected {expected:#X}, got {actual:#X}")]
    ExitCodeMismatch { expected: i32, actual: i32 },

    #[error("Launch cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HarnessError {
    /// Whether an enclosing retry policy may re-run the whole launch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HarnessError::Transient(_))
    }
}

/// Result type alias using HarnessError
pub type Result<T> = std::result::Result<T, HarnessError>;
