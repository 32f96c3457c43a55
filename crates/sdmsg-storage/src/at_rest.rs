//! At-rest wrapping of stored values
//!
//! Sealed message halves and key fragments are wrapped once more before they
//! reach a backend, under a key derived from a deployment secret:
//!
//! ```text
//! at-rest key = HKDF-SHA256(ikm = secret, salt = none, info = domain)
//! ```
//!
//! Records and fragments use different domains, so a leaked record key does
//! not open the fragment store and vice versa.

use hkdf::Hkdf;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroizing;

use sdmsg_crypto::KEY_SIZE;

use crate::error::{StorageError, StorageResult};

pub const RECORDS_DOMAIN: &str = "sdmsg-records-v1";
pub const FRAGMENTS_DOMAIN: &str = "sdmsg-fragments-v1";

/// Shortest secret accepted for deriving at-rest keys
pub const MIN_SECRET_LEN: usize = 16;

#[derive(Clone)]
pub struct AtRestCipher {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl std::fmt::Debug for AtRestCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtRestCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl AtRestCipher {
    /// Derive the wrapping key for one storage domain.
    pub fn derive(secret: &SecretString, domain: &str) -> StorageResult<Self> {
        let ikm = secret.expose_secret().as_bytes();
        if ikm.len() < MIN_SECRET_LEN {
            return Err(StorageError::InvalidKey(format!(
                "at-rest secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }

        let hkdf = Hkdf::<Sha256>::new(None, ikm);
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        hkdf.expand(domain.as_bytes(), key.as_mut_slice())
            .map_err(|e| StorageError::InvalidKey(format!("HKDF expand failed: {e}")))?;

        Ok(Self { key })
    }

    pub fn wrap(&self, plaintext: &[u8]) -> StorageResult<String> {
        sdmsg_crypto::seal(&self.key, plaintext)
            .map_err(|e| StorageError::InvalidKey(format!("wrapping failed: {e}")))
    }

    /// Unwrap a value read from `location` (used in the error only).
    pub fn unwrap(&self, wrapped: &str, location: &str) -> StorageResult<Zeroizing<Vec<u8>>> {
        sdmsg_crypto::open(&self.key, wrapped).map_err(|_| StorageError::Unwrap(location.to_string()))
    }

    /// Unwrap a value that was a UTF-8 string before wrapping.
    pub fn unwrap_string(&self, wrapped: &str, location: &str) -> StorageResult<String> {
        let bytes = self.unwrap(wrapped, location)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| StorageError::Unwrap(location.to_string()))
    }
}
