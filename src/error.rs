//! Service error taxonomy.
//!
//! Every operation the service exposes fails with one of these variants so
//! the HTTP layer and CLI can map failures to the right status without
//! string-sniffing. Conversions from `io` and `sqlx` errors fold into
//! [`ServiceError::Persistence`] since both only occur on the storage path.

/// Error kinds surfaced by session and answering operations.
#[derive(Debug)]
pub enum ServiceError {
    /// Bad input from the caller (empty question, invalid session name).
    InvalidRequest(String),
    /// The session has no durable artifacts and is not cached.
    NotFound(String),
    /// A session with the requested name already exists.
    Conflict(String),
    /// The session has no document index yet (nothing uploaded).
    RetrievalUnavailable(String),
    /// The language model call failed. The turn is never persisted in
    /// this case, so retrying the same question is safe.
    GenerationFailed(String),
    /// Disk or database I/O failure on load/save.
    Persistence(String),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::InvalidRequest(m) => write!(f, "invalid request: {}", m),
            ServiceError::NotFound(m) => write!(f, "not found: {}", m),
            ServiceError::Conflict(m) => write!(f, "conflict: {}", m),
            ServiceError::RetrievalUnavailable(m) => {
                write!(f, "no documents available: {}", m)
            }
            ServiceError::GenerationFailed(m) => write!(f, "generation failed: {}", m),
            ServiceError::Persistence(m) => write!(f, "persistence error: {}", m),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self {
        ServiceError::Persistence(e.to_string())
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        ServiceError::Persistence(e.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
