//! The secure message entity
//!
//! Pure data: plaintext/sealed content, plaintext/sealed metadata and the four
//! key fragments. Every secret buffer is held in `Zeroizing` so it is
//! overwritten when wiped or dropped.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

/// Metadata sealed alongside the content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Remaining decrypt attempts
    pub hit_points: u32,
    /// Unix timestamp (seconds) after which the message is expired
    pub expires_at: i64,
}

#[derive(Clone, Default)]
pub struct SecureMessage {
    id: Option<String>,
    content: Option<Zeroizing<Vec<u8>>>,
    encrypted_content: Option<String>,
    meta: Meta,
    encrypted_meta: Option<String>,
    database_key: Option<Zeroizing<Vec<u8>>>,
    storage_key: Option<Zeroizing<Vec<u8>>>,
    verification_code: Option<Zeroizing<Vec<u8>>>,
    meta_key: Option<Zeroizing<Vec<u8>>>,
}

impl SecureMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: impl Into<String>) -> &mut Self {
        self.id = Some(id.into());
        self
    }

    /// Plaintext content. Only present before encryption and after a successful decrypt.
    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref().map(Vec::as_slice)
    }

    pub fn set_content(&mut self, content: impl Into<Vec<u8>>) -> &mut Self {
        self.replace_content(Zeroizing::new(content.into()))
    }

    pub(crate) fn replace_content(&mut self, content: Zeroizing<Vec<u8>>) -> &mut Self {
        wipe(&mut self.content);
        self.content = Some(content);
        self
    }

    /// Move the plaintext out of the message, leaving nothing behind.
    pub fn take_content(&mut self) -> Option<Zeroizing<Vec<u8>>> {
        self.content.take()
    }

    pub fn encrypted_content(&self) -> Option<&str> {
        self.encrypted_content.as_deref()
    }

    pub fn set_encrypted_content(&mut self, sealed: impl Into<String>) -> &mut Self {
        self.encrypted_content = Some(sealed.into());
        self
    }

    pub fn is_content_encrypted(&self) -> bool {
        self.encrypted_content
            .as_deref()
            .is_some_and(|sealed| !sealed.is_empty())
    }

    pub fn meta(&self) -> Meta {
        self.meta
    }

    pub fn set_meta(&mut self, meta: Meta) -> &mut Self {
        self.meta = meta;
        self
    }

    pub fn hit_points(&self) -> u32 {
        self.meta.hit_points
    }

    pub fn set_hit_points(&mut self, hit_points: u32) -> &mut Self {
        self.meta.hit_points = hit_points;
        self
    }

    pub fn expires_at(&self) -> i64 {
        self.meta.expires_at
    }

    pub fn set_expires_at(&mut self, expires_at: i64) -> &mut Self {
        self.meta.expires_at = expires_at;
        self
    }

    pub fn encrypted_meta(&self) -> Option<&str> {
        self.encrypted_meta.as_deref()
    }

    pub fn set_encrypted_meta(&mut self, sealed: impl Into<String>) -> &mut Self {
        self.encrypted_meta = Some(sealed.into());
        self
    }

    pub fn is_meta_encrypted(&self) -> bool {
        self.encrypted_meta
            .as_deref()
            .is_some_and(|sealed| !sealed.is_empty())
    }

    pub fn database_key(&self) -> Option<&[u8]> {
        self.database_key.as_deref().map(Vec::as_slice)
    }

    pub fn set_database_key(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        replace(&mut self.database_key, key.into());
        self
    }

    pub fn storage_key(&self) -> Option<&[u8]> {
        self.storage_key.as_deref().map(Vec::as_slice)
    }

    pub fn set_storage_key(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        replace(&mut self.storage_key, key.into());
        self
    }

    pub fn verification_code(&self) -> Option<&[u8]> {
        self.verification_code.as_deref().map(Vec::as_slice)
    }

    pub fn set_verification_code(&mut self, code: impl Into<Vec<u8>>) -> &mut Self {
        replace(&mut self.verification_code, code.into());
        self
    }

    pub fn has_meta_key(&self) -> bool {
        self.meta_key.is_some()
    }

    pub fn set_meta_key(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        replace(&mut self.meta_key, key.into());
        self
    }

    /// Content key: `database_key || storage_key || verification_code`.
    ///
    /// Missing fragments contribute nothing, so an incomplete set shows up as a
    /// key that is not [`KEY_SIZE`](crate::KEY_SIZE) bytes long.
    pub fn encryption_key(&self) -> Zeroizing<Vec<u8>> {
        concat(&[
            self.database_key.as_deref(),
            self.storage_key.as_deref(),
            self.verification_code.as_deref(),
        ])
    }

    /// Metadata key: `database_key || storage_key || meta_key`, or `None` when
    /// any of the three fragments is missing.
    pub fn metadata_key(&self) -> Option<Zeroizing<Vec<u8>>> {
        let parts = [
            self.database_key.as_deref(),
            self.storage_key.as_deref(),
            self.meta_key.as_deref(),
        ];
        if parts.iter().any(Option::is_none) {
            return None;
        }
        Some(concat(&parts))
    }

    pub fn wipe_content(&mut self) {
        wipe(&mut self.content);
    }

    pub fn wipe_encrypted_content(&mut self) {
        wipe(&mut self.encrypted_content);
    }

    pub fn wipe_encrypted_meta(&mut self) {
        wipe(&mut self.encrypted_meta);
    }

    /// Wipe the key fragments. The verification code can be kept so it can
    /// still be handed to the recipient after encryption.
    pub fn wipe_keys(&mut self, wipe_verification_code: bool) {
        wipe(&mut self.database_key);
        wipe(&mut self.storage_key);
        wipe(&mut self.meta_key);
        if wipe_verification_code {
            wipe(&mut self.verification_code);
        }
    }
}

impl std::fmt::Debug for SecureMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureMessage")
            .field("id", &self.id)
            .field("meta", &self.meta)
            .field("content", &self.content.as_ref().map(|_| "[REDACTED]"))
            .field("content_encrypted", &self.is_content_encrypted())
            .field("meta_encrypted", &self.is_meta_encrypted())
            .field("database_key", &self.database_key.is_some())
            .field("storage_key", &self.storage_key.is_some())
            .field("verification_code", &self.verification_code.is_some())
            .field("meta_key", &self.meta_key.is_some())
            .finish()
    }
}

/// Overwrite and drop whatever the slot holds.
fn wipe<Z: Zeroize>(slot: &mut Option<Z>) {
    if let Some(mut value) = slot.take() {
        value.zeroize();
    }
}

fn replace(slot: &mut Option<Zeroizing<Vec<u8>>>, value: Vec<u8>) {
    wipe(slot);
    *slot = Some(Zeroizing::new(value));
}

fn concat(parts: &[Option<&Vec<u8>>]) -> Zeroizing<Vec<u8>> {
    let len = parts.iter().flatten().map(|part| part.len()).sum();
    let mut key = Zeroizing::new(Vec::with_capacity(len));
    for part in parts.iter().flatten() {
        key.extend_from_slice(part);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_with_keys() -> SecureMessage {
        let mut message = SecureMessage::new();
        message
            .set_database_key("databaseKey")
            .set_storage_key("storageKey_")
            .set_verification_code("1234567890")
            .set_meta_key("metaKey___");
        message
    }

    #[test]
    fn test_key_composition() {
        let message = message_with_keys();
        assert_eq!(
            message.encryption_key().as_slice(),
            b"databaseKeystorageKey_1234567890"
        );
        assert_eq!(
            message.metadata_key().unwrap().as_slice(),
            b"databaseKeystorageKey_metaKey___"
        );
    }

    #[test]
    fn test_missing_fragment() {
        let mut message = SecureMessage::new();
        message.set_database_key("databaseKey").set_meta_key("metaKey___");

        assert!(message.metadata_key().is_none());
        assert_eq!(message.encryption_key().len(), 11);
    }

    #[test]
    fn test_encrypted_flags() {
        let mut message = SecureMessage::new();
        assert!(!message.is_content_encrypted());
        assert!(!message.is_meta_encrypted());

        message.set_encrypted_content("");
        assert!(!message.is_content_encrypted(), "empty sealed value is not encrypted");

        message.set_encrypted_content("abc").set_encrypted_meta("def");
        assert!(message.is_content_encrypted());
        assert!(message.is_meta_encrypted());

        message.wipe_encrypted_content();
        message.wipe_encrypted_meta();
        assert!(message.encrypted_content().is_none());
        assert!(message.encrypted_meta().is_none());
    }

    #[test]
    fn test_wipe_keys_keeps_verification_code() {
        let mut message = message_with_keys();
        message.wipe_keys(false);

        assert!(message.database_key().is_none());
        assert!(message.storage_key().is_none());
        assert!(!message.has_meta_key());
        assert_eq!(message.verification_code(), Some(&b"1234567890"[..]));

        message.wipe_keys(true);
        assert!(message.verification_code().is_none());
    }

    #[test]
    fn test_wipe_content() {
        let mut message = SecureMessage::new();
        message.set_content("Unit Test");
        assert_eq!(message.content(), Some(&b"Unit Test"[..]));

        message.wipe_content();
        assert!(message.content().is_none());
    }

    #[test]
    fn test_meta_json_shape() {
        let meta = Meta {
            hit_points: 3,
            expires_at: 4823435472,
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(json, r#"{"hit_points":3,"expires_at":4823435472}"#);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut message = message_with_keys();
        message.set_content("top secret");
        let rendered = format!("{message:?}");
        assert!(!rendered.contains("top secret"));
        assert!(!rendered.contains("1234567890"));
    }
}
