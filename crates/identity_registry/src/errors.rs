//! Error types for the identity registry

use thiserror::Error;

/// Coarse classification of a [`RegistryError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Conflict,
    Authorization,
    NotFound,
    Infrastructure,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid identity hash: expected 32 bytes")]
    InvalidHash,

    #[error("Invalid metadata: at most 500 characters allowed")]
    InvalidMetadata,

    #[error("Invalid change description: at most 200 characters allowed")]
    InvalidChanges,

    #[error("Invalid status: at most 20 ASCII characters allowed")]
    InvalidStatus,

    #[error("Invalid account id: {0}")]
    InvalidAccount(String),

    #[error("Identity already registered")]
    AlreadyRegistered,

    #[error("Identity already verified")]
    AlreadyVerified,

    #[error("Identity not found")]
    IdentityNotFound,

    #[error("Caller is not the identity owner")]
    NotOwner,

    #[error("Unauthorized: admin identity required")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    /// Stable numeric code surfaced to callers
    pub fn code(&self) -> u32 {
        match self {
            RegistryError::InvalidHash => 100,
            RegistryError::InvalidMetadata => 101,
            RegistryError::InvalidChanges => 102,
            RegistryError::InvalidStatus => 103,
            RegistryError::InvalidAccount(_) => 104,
            RegistryError::AlreadyRegistered => 200,
            RegistryError::AlreadyVerified => 201,
            RegistryError::NotOwner => 300,
            RegistryError::Unauthorized => 301,
            RegistryError::IdentityNotFound => 404,
            RegistryError::Database(_) => 500,
            RegistryError::Serialization(_) => 501,
            RegistryError::Config(_) => 502,
            RegistryError::Io(_) => 503,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            RegistryError::InvalidHash
            | RegistryError::InvalidMetadata
            | RegistryError::InvalidChanges
            | RegistryError::InvalidStatus
            | RegistryError::InvalidAccount(_) => ErrorCategory::Validation,
            RegistryError::AlreadyRegistered | RegistryError::AlreadyVerified => {
                ErrorCategory::Conflict
            }
            RegistryError::NotOwner | RegistryError::Unauthorized => ErrorCategory::Authorization,
            RegistryError::IdentityNotFound => ErrorCategory::NotFound,
            RegistryError::Database(_)
            | RegistryError::Serialization(_)
            | RegistryError::Config(_)
            | RegistryError::Io(_) => ErrorCategory::Infrastructure,
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
