//! sdmsg-vault: self-destructing messages on top of the two storage channels
//!
//! The vault owns the factory (and with it the app-wide meta key), a record
//! store and a fragment store. Decrypt attempts on the same id are serialized
//! so the hit point budget holds under concurrency.

pub mod error;
pub mod events;
pub mod housekeeping;
mod locks;
pub mod vault;

pub use error::{VaultError, VaultResult};
pub use events::VaultEvent;
pub use housekeeping::SweepReport;
pub use vault::{EncryptedMessage, Vault};
