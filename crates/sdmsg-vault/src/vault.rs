//! The vault: one sealed message split across two stores and the recipient
//!
//! ```text
//! create:  Factory::make → Factory::encrypt ─┬─ storage key       → FragmentStore
//!                                            ├─ meta/content/db key → RecordStore
//!                                            └─ verification code → caller
//!
//! read:    RecordStore + FragmentStore + code → Factory::decrypt
//!            ok         → destroy, return content
//!            terminal   → destroy, event
//!            failure    → persist re-sealed meta, event
//! ```

use anyhow::Context;
use secrecy::ExposeSecret;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use sdmsg_core::config::{BackendKind, SdmsgConfig};
use sdmsg_core::read_secret_env;
use sdmsg_crypto::{CryptoError, Factory, MessageDefaults, Meta, MetaKey, SecureMessage};
use sdmsg_storage::{
    build_operator, AtRestCipher, FragmentStore, RecordStore, S3Credentials, StoredRecord,
    FRAGMENTS_DOMAIN, RECORDS_DOMAIN,
};

use crate::error::{VaultError, VaultResult};
use crate::events::{EventBus, VaultEvent};
use crate::locks::IdLocks;

/// What the creator of a message gets back. The verification code is the
/// recipient's fragment and exists nowhere else.
pub struct EncryptedMessage {
    pub id: String,
    pub verification_code: Zeroizing<String>,
    pub hit_points: u32,
    pub expires_at: i64,
}

impl std::fmt::Debug for EncryptedMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedMessage")
            .field("id", &self.id)
            .field("verification_code", &"[REDACTED]")
            .field("hit_points", &self.hit_points)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub struct Vault {
    factory: Factory,
    records: RecordStore,
    fragments: FragmentStore,
    locks: IdLocks,
    events: EventBus,
}

impl Vault {
    pub fn new(factory: Factory, records: RecordStore, fragments: FragmentStore) -> Self {
        Self {
            factory,
            records,
            fragments,
            locks: IdLocks::new(),
            events: EventBus::new(),
        }
    }

    /// Build a vault from config. The meta key and the at-rest secret are
    /// read from the environment variables the config names.
    pub fn from_config(config: &SdmsgConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let meta_key = read_secret_env(&config.messages.meta_key_env)?;
        let meta_key = MetaKey::new(meta_key.expose_secret().as_bytes())
            .with_context(|| format!("{} must be exactly 10 bytes", config.messages.meta_key_env))?;
        let at_rest = read_secret_env(&config.at_rest.secret_env)?;

        let needs_s3 = [&config.records, &config.fragments]
            .iter()
            .any(|backend| backend.backend == BackendKind::S3);
        let creds = if needs_s3 {
            Some(S3Credentials::from_env()?)
        } else {
            None
        };

        let records = RecordStore::new(
            build_operator(&config.records, creds.as_ref()).context("building record store")?,
            AtRestCipher::derive(&at_rest, RECORDS_DOMAIN)?,
        );
        let fragments = FragmentStore::new(
            build_operator(&config.fragments, creds.as_ref()).context("building fragment store")?,
            AtRestCipher::derive(&at_rest, FRAGMENTS_DOMAIN)?,
        );

        let factory = Factory::new(meta_key).with_defaults(MessageDefaults {
            hit_points: config.messages.hit_points,
            expires_in_secs: config.messages.expires_in_secs,
        });

        Ok(Self::new(factory, records, fragments))
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn fragments(&self) -> &FragmentStore {
        &self.fragments
    }

    /// Current time according to the engine's clock.
    pub fn now(&self) -> i64 {
        self.factory.engine().now()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.events.subscribe()
    }

    /// Seal `content` and distribute its key fragments.
    ///
    /// Unset limits fall back to the configured defaults.
    pub async fn encrypt(
        &self,
        content: impl Into<Vec<u8>>,
        expires_at: Option<i64>,
        hit_points: Option<u32>,
    ) -> VaultResult<EncryptedMessage> {
        let message = self.factory.make(content, hit_points, expires_at);
        let mut message = self.factory.encrypt(message)?;

        let (Some(id), Some(storage_key), Some(database_key), Some(code)) = (
            message.id().map(str::to_string),
            message.storage_key().map(|key| Zeroizing::new(key.to_vec())),
            message.database_key().map(|key| Zeroizing::new(key.to_vec())),
            message.verification_code().map(|code| Zeroizing::new(code.to_vec())),
        ) else {
            return Err(anyhow::anyhow!("encrypted message is missing its id or key fragments").into());
        };
        let (Some(encrypted_meta), Some(encrypted_content)) = (
            message.encrypted_meta().map(str::to_string),
            message.encrypted_content().map(str::to_string),
        ) else {
            return Err(anyhow::anyhow!("message {id} was not sealed").into());
        };

        self.fragments.put(&id, &storage_key).await?;
        let record = StoredRecord {
            encrypted_meta,
            encrypted_content,
            database_key,
        };
        if let Err(e) = self.records.put(&id, &record).await {
            if let Err(cleanup) = self.fragments.delete(&id).await {
                warn!(id = %id, error = %cleanup, "failed to remove fragment after record write failed");
            }
            return Err(e.into());
        }

        let verification_code = String::from_utf8(code.to_vec())
            .map(Zeroizing::new)
            .map_err(|_| anyhow::anyhow!("verification code is not UTF-8"))?;
        let (hit_points, expires_at) = (message.hit_points(), message.expires_at());
        message.wipe_keys(true);

        info!(id = %id, hit_points, expires_at, "secure message created");
        Ok(EncryptedMessage {
            id,
            verification_code,
            hit_points,
            expires_at,
        })
    }

    /// Decrypt and consume a message, returning only the content.
    pub async fn decrypt(&self, id: &str, verification_code: &str) -> VaultResult<Zeroizing<Vec<u8>>> {
        let mut message = self.decrypt_message(id, verification_code).await?;
        Ok(message
            .take_content()
            .unwrap_or_else(|| Zeroizing::new(Vec::new())))
    }

    /// Decrypt and consume a message.
    ///
    /// A successful read destroys the message. A wrong code spends a hit point
    /// and the re-sealed metadata is persisted; running out of hit points or
    /// time destroys the message.
    pub async fn decrypt_message(&self, id: &str, verification_code: &str) -> VaultResult<SecureMessage> {
        let _guard = self.locks.lock(id).await;

        let mut message = match self.load(id).await {
            Ok(message) => message,
            Err(e) => {
                if matches!(e, VaultError::MissingStorageKey(_)) {
                    warn!(id, "storage key fragment missing");
                    self.events.emit(VaultEvent::DecryptionFailed { id: id.to_string() });
                }
                return Err(e);
            }
        };
        message.set_verification_code(verification_code.as_bytes());

        match self.factory.decrypt(message) {
            Ok(message) => {
                self.destroy_locked(id).await?;
                info!(id, "secure message read and destroyed");
                Ok(message)
            }
            Err(e) => Err(self.handle_failure(id, e).await),
        }
    }

    /// Probe whether `verification_code` is right without spending a hit point.
    ///
    /// Neither expiry nor hit points are enforced here, so every call is a free
    /// guess. Do not expose this to untrusted callers; failed probes are logged.
    pub async fn check_verification_code(&self, id: &str, verification_code: &str) -> VaultResult<bool> {
        let mut message = self.load(id).await?;
        message.set_verification_code(verification_code.as_bytes());

        let valid = self.factory.validate_encryption_key(&mut message);
        message.wipe_keys(true);
        if !valid {
            warn!(id, "verification code probe failed");
        }
        Ok(valid)
    }

    /// Read the metadata (hit points, expiry) without touching the content.
    pub async fn get_meta(&self, id: &str) -> VaultResult<Meta> {
        let message = self.load(id).await?;
        let mut message = self.factory.decrypt_meta(message)?;
        message.wipe_keys(true);
        Ok(message.meta())
    }

    /// Delete record and fragment.
    pub async fn destroy(&self, id: &str) -> VaultResult<()> {
        let _guard = self.locks.lock(id).await;
        self.destroy_locked(id).await
    }

    pub(crate) async fn destroy_locked(&self, id: &str) -> VaultResult<()> {
        self.fragments.delete(id).await?;
        self.records.delete(id).await?;
        debug!(id, "record and fragment deleted");
        self.events.emit(VaultEvent::Destroyed { id: id.to_string() });
        Ok(())
    }

    pub(crate) async fn lock(&self, id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        self.locks.lock(id).await
    }

    pub(crate) fn factory(&self) -> &Factory {
        &self.factory
    }

    /// Rebuild a message from both stores, without the verification code.
    pub(crate) async fn load(&self, id: &str) -> VaultResult<SecureMessage> {
        let record = self
            .records
            .get(id)
            .await?
            .ok_or_else(|| VaultError::NotFound(id.to_string()))?;
        let storage_key = self
            .fragments
            .get(id)
            .await?
            .ok_or_else(|| VaultError::MissingStorageKey(id.to_string()))?;

        let mut message = SecureMessage::new();
        message
            .set_id(id)
            .set_encrypted_meta(record.encrypted_meta)
            .set_encrypted_content(record.encrypted_content)
            .set_database_key(record.database_key.as_slice())
            .set_storage_key(storage_key.as_slice());
        Ok(message)
    }

    /// Persist what the failed attempt changed and fire the matching event.
    ///
    /// The re-sealed metadata is written before anything is reported. If it
    /// cannot be written the attempt is rejected with the storage error, so a
    /// wrong code never goes unrecorded. A terminal failure is still destroyed
    /// even then: with the message gone the budget holds regardless.
    async fn handle_failure(&self, id: &str, error: CryptoError) -> VaultError {
        warn!(id, error = %error, "secure message decrypt failed");

        let persisted = match error.message().and_then(SecureMessage::encrypted_meta) {
            Some(sealed) => match self.records.update_meta(id, sealed).await {
                Ok(true) => {
                    debug!(id, "re-sealed metadata persisted");
                    Ok(())
                }
                Ok(false) => {
                    warn!(id, "record vanished before metadata could be persisted");
                    Ok(())
                }
                Err(e) => {
                    error!(id, error = %e, "failed to persist re-sealed metadata");
                    Err(e)
                }
            },
            None => Ok(()),
        };

        let id_owned = id.to_string();
        let event = match &error {
            CryptoError::HitPointsExhausted(_) => Some(VaultEvent::HitPointLimitReached { id: id_owned }),
            CryptoError::Expired(_) => Some(VaultEvent::Expired { id: id_owned }),
            CryptoError::DecryptFailure(_) => Some(VaultEvent::DecryptionFailed { id: id_owned }),
            _ => None,
        };
        if let Some(event) = event {
            self.events.emit(event);
        }

        if error.is_terminal() {
            if let Err(e) = self.destroy_locked(id).await {
                error!(id, error = %e, "failed to destroy terminal message");
                return match persisted {
                    Err(write) => write.into(),
                    Ok(()) => e,
                };
            }
            return error.into();
        }

        match persisted {
            Ok(()) => error.into(),
            Err(e) => e.into(),
        }
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("defaults", &self.factory.defaults())
            .finish_non_exhaustive()
    }
}
