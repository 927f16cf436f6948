use thiserror::Error;

/// Result type shared by the store backends and the shortener service.
pub type Result<T> = std::result::Result<T, LinkError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("short code cannot be empty")]
    EmptyKey,
    #[error("original url cannot be empty")]
    EmptyValue,
    #[error("user id cannot be empty")]
    EmptyUserId,
    /// The `(original_url, owner_id)` pair is already shortened; carries the existing code.
    #[error("url already exists: {0}")]
    AlreadyExists(String),
    /// The code is used by a different link. Callers retry with a fresh code.
    #[error("short code already taken: {0}")]
    CodeTaken(String),
    #[error("not found")]
    NotFound,
    #[error("short url has been deleted")]
    AlreadyDeleted,
    #[error("store not initialized")]
    NotInitialized,
    #[error("failed to generate a unique short code after {attempts} attempts")]
    GenerationFailed { attempts: u32 },
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage io failed: {0}")]
    Io(String),
}

impl LinkError {
    /// Returns the pre-existing code when the error is [`LinkError::AlreadyExists`].
    pub fn existing_code(&self) -> Option<&str> {
        match self {
            LinkError::AlreadyExists(code) => Some(code),
            _ => None,
        }
    }

    /// Whether the error is caused by malformed caller input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LinkError::EmptyKey | LinkError::EmptyValue | LinkError::EmptyUserId
        )
    }
}

impl From<std::io::Error> for LinkError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}
