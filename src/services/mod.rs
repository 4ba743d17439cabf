pub mod assignment;
pub mod cognitive;
pub mod completion;
pub mod focus_session;
pub mod pulse;
pub mod quiz;
pub mod reconcile;
pub mod rollup;

use thiserror::Error;

/// Failure taxonomy shared by every service entry point. Mapped onto HTTP in
/// `response::AppError`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
