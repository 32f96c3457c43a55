use thiserror::Error;

use crate::message::SecureMessage;
use crate::seal::SealError;

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Failures of the encrypt/decrypt protocol.
///
/// `DecryptFailure`, `Expired` and `HitPointsExhausted` carry the message with
/// its metadata re-sealed (and hit points updated) and every key fragment
/// stripped, so the caller can persist the new state.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("unable to decrypt the secure message")]
    DecryptFailure(Box<SecureMessage>),

    #[error("the secure message has expired")]
    Expired(Box<SecureMessage>),

    #[error("the hit point limit of the secure message has been reached")]
    HitPointsExhausted(Box<SecureMessage>),

    #[error("sealing failed: {0}")]
    Seal(#[from] SealError),

    #[error("metadata serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

impl CryptoError {
    /// The updated message, for the variants that carry one.
    pub fn message(&self) -> Option<&SecureMessage> {
        match self {
            Self::DecryptFailure(message)
            | Self::Expired(message)
            | Self::HitPointsExhausted(message) => Some(&**message),
            _ => None,
        }
    }

    pub fn into_message(self) -> Option<SecureMessage> {
        match self {
            Self::DecryptFailure(message)
            | Self::Expired(message)
            | Self::HitPointsExhausted(message) => Some(*message),
            _ => None,
        }
    }

    /// Expired and exhausted messages can never be decrypted again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired(_) | Self::HitPointsExhausted(_))
    }
}
