use sdmsg_crypto::CryptoError;
use sdmsg_storage::StorageError;
use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("secure message {0} not found")]
    NotFound(String),

    #[error("storage key for secure message {0} is missing")]
    MissingStorageKey(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VaultError {
    /// The message is gone for good: consumed, expired, exhausted or never existed.
    pub fn is_gone(&self) -> bool {
        match self {
            Self::NotFound(_) | Self::MissingStorageKey(_) => true,
            Self::Crypto(e) => e.is_terminal(),
            _ => false,
        }
    }
}
