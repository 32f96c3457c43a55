//! Message factory: ids, default metadata and fresh key fragments
//!
//! The factory owns the application-wide meta key and injects it into every
//! message before handing it to the [`Engine`].

use tracing::debug;

use crate::engine::Engine;
use crate::error::CryptoResult;
use crate::keys::{generate_id, generate_key_fragments, MetaKey};
use crate::message::SecureMessage;
use crate::{DEFAULT_EXPIRES_IN_SECS, DEFAULT_HIT_POINTS};

/// Defaults applied by [`Factory::make`] when the caller leaves them unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageDefaults {
    pub hit_points: u32,
    pub expires_in_secs: i64,
}

impl Default for MessageDefaults {
    fn default() -> Self {
        Self {
            hit_points: DEFAULT_HIT_POINTS,
            expires_in_secs: DEFAULT_EXPIRES_IN_SECS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Factory {
    meta_key: MetaKey,
    defaults: MessageDefaults,
    engine: Engine,
}

impl Factory {
    pub fn new(meta_key: MetaKey) -> Self {
        Self {
            meta_key,
            defaults: MessageDefaults::default(),
            engine: Engine::new(),
        }
    }

    pub fn with_defaults(mut self, defaults: MessageDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn defaults(&self) -> MessageDefaults {
        self.defaults
    }

    /// Build a new plaintext message with a fresh id.
    ///
    /// `expires_at` is an absolute Unix timestamp; when omitted the message
    /// expires `expires_in_secs` from now.
    pub fn make(
        &self,
        content: impl Into<Vec<u8>>,
        hit_points: Option<u32>,
        expires_at: Option<i64>,
    ) -> SecureMessage {
        let expires_at = expires_at
            .unwrap_or_else(|| self.engine.now().saturating_add(self.defaults.expires_in_secs));

        let mut message = SecureMessage::new();
        message
            .set_id(generate_id())
            .set_content(content)
            .set_hit_points(hit_points.unwrap_or(self.defaults.hit_points))
            .set_expires_at(expires_at);
        message
    }

    /// Generate new key fragments (replacing any present) and seal the message.
    ///
    /// The returned message still holds all fragments; the caller is
    /// responsible for distributing them and then wiping.
    pub fn encrypt(&self, mut message: SecureMessage) -> CryptoResult<SecureMessage> {
        let fragments = generate_key_fragments();
        message
            .set_database_key(fragments.database_key.as_slice())
            .set_storage_key(fragments.storage_key.as_slice())
            .set_verification_code(fragments.verification_code.as_bytes())
            .set_meta_key(self.meta_key.as_bytes());

        debug!(id = ?message.id(), "encrypting message with fresh key fragments");
        self.engine.encrypt(message)
    }

    pub fn decrypt(&self, mut message: SecureMessage) -> CryptoResult<SecureMessage> {
        message.set_meta_key(self.meta_key.as_bytes());
        self.engine.decrypt(message)
    }

    pub fn decrypt_meta(&self, mut message: SecureMessage) -> CryptoResult<SecureMessage> {
        message.set_meta_key(self.meta_key.as_bytes());
        self.engine.decrypt_meta(message)
    }

    /// Probe the content key without consuming a hit point. See
    /// [`Engine::validate_encryption_key`].
    pub fn validate_encryption_key(&self, message: &mut SecureMessage) -> bool {
        message.set_meta_key(self.meta_key.as_bytes());
        self.engine.validate_encryption_key(message)
    }
}
