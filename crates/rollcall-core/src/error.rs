use thiserror::Error;

/// Error taxonomy shared across the rollcall crates.
///
/// `Transient` is the only retryable kind, and only mutations are ever
/// retried; retry policy lives in the sync coordinator, never in the
/// attendance service itself.
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient: {0}")]
    Transient(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("storage: {0}")]
    Storage(#[from] sqlx::Error),

    /// A queued mutation exhausted its retry budget. Surfaced instead of
    /// dropped so the operator can reconcile by hand.
    #[error("sync item abandoned after {retries} attempts: {event}")]
    Abandoned {
        event: String,
        payload: String,
        retries: u32,
    },
}

impl Error {
    /// Whether the sync coordinator may schedule a retry for this failure.
    /// Only transient faults qualify; validation, not-found and storage
    /// errors reproduce deterministically and are surfaced instead.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Transient(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
