//! sdmsg-storage: the two storage channels behind a sealed message
//!
//! ```text
//! RecordStore    records/{id}.json   { meta, content, key, created_at, updated_at }
//! FragmentStore  fragments/{id}      storage key fragment
//! ```
//!
//! Each store sits on its own OpenDAL operator, so the database key and the
//! storage key never share a medium. Every stored value is additionally
//! wrapped by an [`AtRestCipher`] derived from a deployment secret.

pub mod at_rest;
pub mod error;
pub mod fragments;
pub mod health;
pub mod operator;
pub mod records;

pub use at_rest::{AtRestCipher, FRAGMENTS_DOMAIN, RECORDS_DOMAIN};
pub use error::{StorageError, StorageResult};
pub use fragments::FragmentStore;
pub use health::{check_health, is_healthy};
pub use operator::{build_operator, memory_operator, S3Credentials};
pub use records::{RecordStore, StoredRecord};

/// Reject anything that is not a generated message id, so ids can never
/// escape their prefix on the backend.
pub fn validate_id(id: &str) -> StorageResult<()> {
    let valid = id.len() == sdmsg_crypto::ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidId(id.to_string()))
    }
}
