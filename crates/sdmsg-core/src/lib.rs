pub mod config;
pub mod error;

pub use config::{expand_tilde, read_secret_env, BackendConfig, BackendKind, SdmsgConfig};
pub use error::{SdmsgError, SdmsgResult};
