//! sdmsg-crypto: split-key, self-destructing message encryption
//!
//! A message is sealed once and can be opened a limited number of times
//! ("hit points") before a deadline. The content key is never stored whole:
//!
//! ```text
//! content key  (32 bytes) = database_key (11) || storage_key (11) || verification_code (10)
//! metadata key (32 bytes) = database_key (11) || storage_key (11) || meta_key (10, app-wide)
//! ```
//!
//! Content and metadata (`{hit_points, expires_at}`) are sealed independently
//! with XChaCha20-Poly1305 under fresh random nonces. Every failed attempt
//! re-seals the metadata with one hit point less and hands the updated
//! message back inside the error so the caller can persist it.

pub mod engine;
pub mod error;
pub mod factory;
pub mod keys;
pub mod message;
pub mod seal;

pub use engine::{unix_now, Clock, Engine, SystemClock};
pub use error::{CryptoError, CryptoResult};
pub use factory::{Factory, MessageDefaults};
pub use keys::{generate_id, generate_key_fragments, KeyFragments, MetaKey};
pub use message::{Meta, SecureMessage};
pub use seal::{open, seal, SealError, SealedValue};

/// Size of a composed content or metadata key (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Key fragment kept in the record store
pub const DATABASE_KEY_SIZE: usize = 11;

/// Key fragment kept on the separate fragment store
pub const STORAGE_KEY_SIZE: usize = 11;

/// Key fragment handed to the recipient
pub const VERIFICATION_CODE_SIZE: usize = 10;

/// Application-wide metadata key fragment
pub const META_KEY_SIZE: usize = 10;

/// Length of a message id in characters
pub const ID_LEN: usize = 32;

pub const DEFAULT_HIT_POINTS: u32 = 3;

/// One day
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 86_400;
