//! Errors returned by the engine services.
//!
//! Callers branch on [`ErrorKind`]; the wrapped error keeps the detail.

use thiserror::Error;

use mercato_core::CoreError;

use crate::error::DbError;

/// Engine operation errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Coarse classification for callers (the HTTP layer maps these to codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    InvalidTransition,
    CouponUnavailable,
    Conflict,
    /// Transient; the caller may retry.
    Temporary,
    /// Corrupt data or a broken invariant.
    Internal,
}

impl ErrorKind {
    /// Stable identifier for logs and API payloads.
    pub const fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::InvalidTransition => "INVALID_TRANSITION",
            ErrorKind::CouponUnavailable => "COUPON_UNAVAILABLE",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Temporary => "TEMPORARY",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Core(err) => match err {
                CoreError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
                CoreError::CouponUnavailable { .. } | CoreError::CouponNotIssuable { .. } => {
                    ErrorKind::CouponUnavailable
                }
                CoreError::EmptyShoppingList | CoreError::Validation(_) => ErrorKind::InvalidInput,
                CoreError::InvariantViolation(_) => ErrorKind::Internal,
            },
            EngineError::Db(err) => match err {
                DbError::NotFound { .. } => ErrorKind::NotFound,
                DbError::UniqueViolation { .. } => ErrorKind::Conflict,
                DbError::ForeignKeyViolation { .. } => ErrorKind::InvalidInput,
                e if e.is_transient() => ErrorKind::Temporary,
                _ => ErrorKind::Internal,
            },
        }
    }
}

impl From<mercato_core::ValidationError> for EngineError {
    fn from(err: mercato_core::ValidationError) -> Self {
        EngineError::Core(err.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
