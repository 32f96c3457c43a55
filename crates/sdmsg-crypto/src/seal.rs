//! Sealed values: XChaCha20-Poly1305 plus the transport encoding
//!
//! Wire format (ASCII-safe string):
//! ```text
//! base64( json( [ base64(nonce), base64(ciphertext || tag) ] ) )
//! ```
//!
//! Every seal draws a fresh 192-bit random nonce, so re-sealing the same
//! plaintext under the same key never reuses a nonce.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

#[derive(Debug, Error)]
pub enum SealError {
    #[error("malformed sealed value: {0}")]
    Malformed(&'static str),

    #[error("sealed value failed authentication: invalid key or corrupted data")]
    Authentication,

    #[error("AEAD encryption failed")]
    Encrypt,
}

/// A nonce and the ciphertext (with tag) it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedValue {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

impl SealedValue {
    /// Encode to the transport string.
    pub fn pack(&self) -> String {
        let parts = [STANDARD.encode(self.nonce), STANDARD.encode(&self.ciphertext)];
        // An array of two strings always serializes
        let json = serde_json::to_string(&parts).unwrap_or_default();
        STANDARD.encode(json)
    }

    /// Decode a transport string produced by [`SealedValue::pack`].
    pub fn unpack(packed: &str) -> Result<Self, SealError> {
        let json = STANDARD
            .decode(packed)
            .map_err(|_| SealError::Malformed("outer base64"))?;
        let parts: Vec<String> =
            serde_json::from_slice(&json).map_err(|_| SealError::Malformed("json"))?;
        let [nonce_b64, ciphertext_b64]: [String; 2] = parts
            .try_into()
            .map_err(|_| SealError::Malformed("expected [nonce, ciphertext]"))?;

        let nonce: [u8; NONCE_SIZE] = STANDARD
            .decode(nonce_b64)
            .map_err(|_| SealError::Malformed("nonce base64"))?
            .try_into()
            .map_err(|_| SealError::Malformed("nonce length"))?;
        let ciphertext = STANDARD
            .decode(ciphertext_b64)
            .map_err(|_| SealError::Malformed("ciphertext base64"))?;
        if ciphertext.len() < TAG_SIZE {
            return Err(SealError::Malformed("ciphertext shorter than tag"));
        }

        Ok(Self { nonce, ciphertext })
    }
}

/// Encrypt `plaintext` under a 32-byte key and return the packed sealed value.
pub fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<String, SealError> {
    let cipher = XChaCha20Poly1305::new(key.into());

    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| SealError::Encrypt)?;

    Ok(SealedValue { nonce, ciphertext }.pack())
}

/// Decode and decrypt a packed sealed value.
pub fn open(key: &[u8; KEY_SIZE], packed: &str) -> Result<Zeroizing<Vec<u8>>, SealError> {
    let sealed = SealedValue::unpack(packed)?;
    let cipher = XChaCha20Poly1305::new(key.into());

    cipher
        .decrypt(XNonce::from_slice(&sealed.nonce), sealed.ciphertext.as_slice())
        .map(Zeroizing::new)
        .map_err(|_| SealError::Authentication)
}
