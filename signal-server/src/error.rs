//! Domain error kinds shared across the pipeline.
//!
//! Handlers never let these escape the event-loop boundary; each task
//! catches, logs, and records a terminal state on the owning entity
//! where applicable. The HTTP layer maps them onto response statuses.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    /// Signal failed pre-trade checks. User-visible.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Broker returned a non-DONE retcode or the transport failed.
    #[error("broker error: {message}")]
    Broker {
        message: String,
        retcode: Option<i32>,
    },

    /// Bad, missing, or expired token.
    #[error("unauthorized: {0}")]
    Auth(String),

    /// Resource absent. Never logged as an error.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A synchronizer tick failed; the next tick continues.
    #[error("sync error: {0}")]
    TransientSync(String),

    /// Encrypt/decrypt failure. Fatal to the operation only.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Missing required environment at startup.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl DomainError {
    pub fn broker(message: impl Into<String>, retcode: Option<i32>) -> Self {
        DomainError::Broker {
            message: message.into(),
            retcode,
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
