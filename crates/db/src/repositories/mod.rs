use thiserror::Error;

use deckbot_core::errors::ServiceError;

pub mod channel;
pub mod memory;
pub mod slide;

pub use channel::SqlChannelRepository;
pub use memory::{InMemoryChannelRepository, InMemorySlideRepository};
pub use slide::SqlSlideRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{0} is not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Unique-constraint violations are caller errors, not storage failures.
    pub(crate) fn from_write(error: sqlx::Error, conflict: &str) -> Self {
        match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(conflict.to_string())
            }
            _ => Self::Database(error),
        }
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound(what) => {
                ServiceError::not_found(format!("{what} is not found"), RepositoryError::NotFound(what))
            }
            RepositoryError::Conflict(message) => {
                ServiceError::parameter(message.clone(), RepositoryError::Conflict(message))
            }
            RepositoryError::Decode(message) => {
                ServiceError::internal("", RepositoryError::Decode(message))
            }
            error @ RepositoryError::Database(_) => ServiceError::external("", None, error),
        }
    }
}
