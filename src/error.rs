use thiserror::Error;

use crate::objects::ObjectStoreError;
use crate::types::Role;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("object store error: {0}")]
    ObjectStore(#[from] ObjectStoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("already exists")]
    AlreadyExists,

    #[error("permission denied: requires {required}, have {actual}")]
    PermissionDenied { required: Role, actual: Role },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("staged change in impossible state: {0}")]
    ConflictDefect(String),

    #[error("token lookup collision")]
    TokenLookupCollision,

    #[error("invalid token format")]
    InvalidTokenFormat,

    #[error("token hashing failed: {0}")]
    TokenHash(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
