//! Encrypt/decrypt state machine: hit points, expiry and failure re-sealing
//!
//! ```text
//! Plaintext ──encrypt──▶ Sealed ──decrypt──▶ Consumed
//!                          │  ▲
//!            wrong key     │  │ meta re-sealed, hit_points - 1
//!                          ▼  │
//!                     DecryptFailure ──(hit_points == 0)──▶ Exhausted
//!                          │
//!                          └──(now > expires_at)──▶ Expired
//! ```
//!
//! Metadata is always sealed before content, and on decrypt the metadata is
//! opened before the content key is even looked at.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::message::{Meta, SecureMessage};
use crate::seal;
use crate::KEY_SIZE;

/// Source of the current time (Unix seconds).
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        unix_now()
    }
}

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Clone, Copy)]
enum Failure {
    Decrypt,
    Expired,
    Exhausted,
}

/// The crypto engine. Stateless apart from its clock.
#[derive(Clone)]
pub struct Engine {
    clock: Arc<dyn Clock>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            clock: Arc::new(clock),
        }
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Seal whichever halves of the message are not sealed yet.
    ///
    /// Metadata first, then content. The plaintext content is wiped as soon as
    /// it is sealed. Key fragments are left in place for the caller to
    /// distribute.
    pub fn encrypt(&self, mut message: SecureMessage) -> CryptoResult<SecureMessage> {
        if !message.is_meta_encrypted() {
            let meta_key = message
                .metadata_key()
                .unwrap_or_else(|| Zeroizing::new(Vec::new()));
            let key = key_array(&meta_key)?;
            let meta_json = Zeroizing::new(serde_json::to_vec(&message.meta())?);
            let sealed = seal::seal(key, &meta_json)?;
            message.set_encrypted_meta(sealed);
            debug!(id = ?message.id(), "metadata sealed");
        }

        if !message.is_content_encrypted() {
            let content_key = message.encryption_key();
            let key = key_array(&content_key)?;
            let sealed = seal::seal(key, message.content().unwrap_or_default())?;
            message.set_encrypted_content(sealed);
            message.wipe_content();
            debug!(id = ?message.id(), "content sealed");
        }

        Ok(message)
    }

    /// Open only the metadata. Needs the sealed metadata plus the database,
    /// storage and meta key fragments.
    pub fn decrypt_meta(&self, mut message: SecureMessage) -> CryptoResult<SecureMessage> {
        let opened = match (message.encrypted_meta(), message.metadata_key()) {
            (Some(sealed), Some(meta_key)) if message.is_meta_encrypted() => key_array(&meta_key)
                .ok()
                .and_then(|key| seal::open(key, sealed).ok()),
            _ => None,
        };
        let meta = opened.and_then(|json| serde_json::from_slice::<Meta>(&json).ok());

        let Some(meta) = meta else {
            warn!(id = ?message.id(), "metadata could not be decrypted");
            return Err(self.fail(message, Failure::Decrypt));
        };

        message.set_meta(meta);
        message.wipe_encrypted_meta();
        Ok(message)
    }

    /// Decrypt the content, enforcing expiry and hit points.
    ///
    /// On success the content is set and every key fragment is wiped. On
    /// failure the returned error carries the message with re-sealed metadata.
    pub fn decrypt(&self, message: SecureMessage) -> CryptoResult<SecureMessage> {
        let mut message = if message.is_meta_encrypted() {
            self.decrypt_meta(message)?
        } else {
            message
        };

        let content_key = message.encryption_key();
        let Ok(key) = key_array(&content_key) else {
            return Err(self.reduce_hit_points(message));
        };

        if self.clock.now() > message.expires_at() {
            debug!(id = ?message.id(), expires_at = message.expires_at(), "message expired");
            return Err(self.fail(message, Failure::Expired));
        }

        if message.hit_points() == 0 {
            return Err(self.reduce_hit_points(message));
        }

        let opened = message
            .encrypted_content()
            .and_then(|sealed| seal::open(key, sealed).ok());
        let Some(content) = opened else {
            return Err(self.reduce_hit_points(message));
        };

        message.replace_content(content);
        message.wipe_encrypted_content();
        message.wipe_keys(true);
        debug!(id = ?message.id(), "message decrypted");
        Ok(message)
    }

    /// Probe whether the content key opens the content.
    ///
    /// Does not touch hit points and does not check expiry, so every call is a
    /// free guess. Never expose this to untrusted callers.
    pub fn validate_encryption_key(&self, message: &SecureMessage) -> bool {
        let content_key = message.encryption_key();
        let meta_key_len = message.metadata_key().map_or(0, |key| key.len());
        let Ok(key) = key_array(&content_key) else {
            return false;
        };
        if meta_key_len != KEY_SIZE {
            return false;
        }

        // The opened buffer is Zeroizing and wiped when dropped here
        message
            .encrypted_content()
            .is_some_and(|sealed| seal::open(key, sealed).is_ok())
    }

    /// Consume one hit point and build the failure. Running out turns any
    /// failure into `HitPointsExhausted`.
    fn reduce_hit_points(&self, mut message: SecureMessage) -> CryptoError {
        let remaining = message.hit_points().saturating_sub(1);
        message.set_hit_points(remaining);
        warn!(id = ?message.id(), remaining, "decrypt attempt failed");

        if remaining == 0 {
            self.fail(message, Failure::Exhausted)
        } else {
            self.fail(message, Failure::Decrypt)
        }
    }

    /// Re-seal whatever is in plaintext (under fresh nonces), strip the keys
    /// and wrap the message in the error.
    fn fail(&self, message: SecureMessage, failure: Failure) -> CryptoError {
        let mut message = match self.encrypt(message) {
            Ok(message) => message,
            Err(e) => return e,
        };
        message.wipe_keys(true);

        let message = Box::new(message);
        match failure {
            Failure::Decrypt => CryptoError::DecryptFailure(message),
            Failure::Expired => CryptoError::Expired(message),
            Failure::Exhausted => CryptoError::HitPointsExhausted(message),
        }
    }
}

fn key_array(key: &[u8]) -> CryptoResult<&[u8; KEY_SIZE]> {
    key.try_into().map_err(|_| CryptoError::InvalidKeyLength {
        expected: KEY_SIZE,
        actual: key.len(),
    })
}
