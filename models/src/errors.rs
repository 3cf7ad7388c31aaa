// models/src/errors.rs

use std::io;
pub use thiserror::Error;
use uuid::Error as UuidError;
use anyhow::Error as AnyhowError;

use serde::{Deserialize, Serialize};

/// Errors raised by the domain and storage layers. The HTTP layer maps
/// these onto status codes; every variant except the wrapped internals is
/// a non-retryable client error.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Storage error: {0}")]
    StorageError(String), // General storage operation error
    #[error("Failed to acquire lock: {0}")]
    LockError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("{0} not found")]
    NotFound(String),
    #[error("Entity already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid data provided: {0}")]
    InvalidData(String),
    #[error("An internal error occurred: {0}")]
    InternalError(String),

    #[error("Access already granted")]
    DuplicateActiveGrant,
    #[error("Access permission not found")]
    PermissionNotFound,
    #[error("Access can only be granted to a doctor or laboratory")]
    GranteeNotEligible,

    #[error("invalid status transition from '{from}' to '{to}'")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Cannot update approved {0} profile. Please contact admin for changes.")]
    CannotModifyApprovedProfile(String),

    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("UUID parsing or generation error: {0}")]
    Uuid(#[from] UuidError),
}

// Implement From for serde_json::Error to convert into DomainError variants.
impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(format!("JSON processing error: {}", err))
    }
}

impl From<AnyhowError> for DomainError {
    fn from(err: AnyhowError) -> Self {
        DomainError::StorageError(format!("Underlying storage operation failed: {}", err))
    }
}

impl From<bcrypt::BcryptError> for DomainError {
    fn from(_: bcrypt::BcryptError) -> Self {
        DomainError::Validation(ValidationError::PasswordHashingFailed)
    }
}

/// A validation error.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// An invalid value was provided where a specific value or format was expected.
    #[error("invalid value provided")]
    InvalidValue,
    /// One or more fields failed shape checks.
    #[error("Validation error")]
    Fields(Vec<FieldError>),
    /// An invalid date format was provided.
    #[error("invalid date format: {0}; expected YYYY-MM-DD or RFC 3339")]
    InvalidDateFormat(String),
    /// A date that must lie in the future does not.
    #[error("{0} must be in the future")]
    DateNotInFuture(String),
    /// Password hashing failed.
    #[error("password hashing failed")]
    PasswordHashingFailed,
    /// Password verification failed.
    #[error("password verification failed")]
    PasswordVerificationFailed,
    /// A value falls outside the closed set accepted for the field.
    #[error("'{value}' is not a valid {field}")]
    UnknownVariant { field: String, value: String },
}

/// Field-level detail carried by `ValidationError::Fields`, surfaced to
/// clients as `errors: [{field, message}]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        FieldError { field: field.into(), message: message.into() }
    }
}

/// A type alias for a `Result` that returns a `DomainError` on failure.
pub type DomainResult<T> = Result<T, DomainError>;

/// A type alias for a `Result` that returns a `ValidationError` on failure.
pub type ValidationResult<T> = Result<T, ValidationError>;
