//! Message ids and key fragment generation

use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{CryptoError, CryptoResult};
use crate::{DATABASE_KEY_SIZE, ID_LEN, META_KEY_SIZE, STORAGE_KEY_SIZE, VERIFICATION_CODE_SIZE};

/// The three per-message key fragments. Zeroized on drop.
///
/// Each fragment is meant for a different storage channel: the database key
/// goes into the record store, the storage key onto the fragment store and the
/// verification code to the recipient.
#[derive(Clone)]
pub struct KeyFragments {
    pub database_key: Zeroizing<Vec<u8>>,
    pub storage_key: Zeroizing<Vec<u8>>,
    pub verification_code: Zeroizing<String>,
}

impl std::fmt::Debug for KeyFragments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyFragments")
            .field("database_key", &"[REDACTED]")
            .field("storage_key", &"[REDACTED]")
            .field("verification_code", &"[REDACTED]")
            .finish()
    }
}

/// The application-wide metadata key fragment (exactly 10 bytes).
#[derive(Clone)]
pub struct MetaKey {
    bytes: Zeroizing<Vec<u8>>,
}

impl MetaKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> CryptoResult<Self> {
        let mut bytes = bytes.into();
        if bytes.len() != META_KEY_SIZE {
            let actual = bytes.len();
            bytes.zeroize();
            return Err(CryptoError::InvalidKeyLength {
                expected: META_KEY_SIZE,
                actual,
            });
        }
        Ok(Self {
            bytes: Zeroizing::new(bytes),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for MetaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a message id: BLAKE3 of 24 random bytes, first 32 hex digits, uppercase.
pub fn generate_id() -> String {
    let mut seed = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut seed);
    let hash = blake3::hash(&seed);
    seed.zeroize();
    hash.to_hex().as_str()[..ID_LEN].to_ascii_uppercase()
}

/// Generate fresh database/storage key fragments and a verification code.
///
/// The verification code is lowercase hex so it can be typed by a person.
pub fn generate_key_fragments() -> KeyFragments {
    let mut rng = rand::thread_rng();

    let mut storage_key = Zeroizing::new(vec![0u8; STORAGE_KEY_SIZE]);
    rng.fill_bytes(&mut storage_key);

    let mut database_key = Zeroizing::new(vec![0u8; DATABASE_KEY_SIZE]);
    rng.fill_bytes(&mut database_key);

    let mut code_seed = Zeroizing::new([0u8; VERIFICATION_CODE_SIZE / 2]);
    rng.fill_bytes(&mut code_seed[..]);
    let mut verification_code = Zeroizing::new(String::with_capacity(VERIFICATION_CODE_SIZE));
    for &byte in code_seed.iter() {
        verification_code.push(hex_digit(byte >> 4));
        verification_code.push(hex_digit(byte & 0x0f));
    }

    KeyFragments {
        database_key,
        storage_key,
        verification_code,
    }
}

fn hex_digit(nibble: u8) -> char {
    char::from_digit(u32::from(nibble), 16).unwrap_or('0')
}
