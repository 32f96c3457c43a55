use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(#[from] opendal::Error),

    #[error("record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("stored value at {0} failed at-rest authentication")]
    Unwrap(String),

    #[error("invalid at-rest key: {0}")]
    InvalidKey(String),

    #[error("invalid message id: {0:?}")]
    InvalidId(String),
}
