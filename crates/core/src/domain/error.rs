// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Invalid engine version: {0}")]
    InvalidEngineVersion(String),

    #[error("Invalid asset name: {0}")]
    InvalidAssetName(String),

    #[error("Universal architecture {0} is invalid here, pick one")]
    UniversalArchitecture(String),

    #[error("Platform {0} is not supported for this operation")]
    UnsupportedPlatform(String),

    #[error("Injection method {method} is not supported on {platform}")]
    UnsupportedInjectionMethod { method: String, platform: String },

    #[error("Invalid artifact id: {0}")]
    InvalidArtifactId(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
