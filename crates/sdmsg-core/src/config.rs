use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SdmsgError, SdmsgResult};

/// Top-level configuration (loaded from sdmsg.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SdmsgConfig {
    pub daemon: DaemonConfig,
    pub messages: MessagesConfig,
    /// Where the sealed record (meta, content, database key) lives
    pub records: BackendConfig,
    /// Where the storage key fragment lives. Must be a different medium.
    pub fragments: BackendConfig,
    pub at_rest: AtRestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
    /// Prometheus metrics endpoint (default: 127.0.0.1:9190)
    pub metrics_addr: Option<String>,
    /// Seconds between housekeeping sweeps
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    /// Environment variable holding the 10-byte application meta key
    pub meta_key_env: String,
    /// Decrypt attempts granted to a new message
    pub hit_points: u32,
    /// Lifetime of a new message in seconds
    pub expires_in_secs: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Fs,
    Memory,
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub backend: BackendKind,
    /// Root directory for the fs backend
    pub root: PathBuf,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    pub bucket: String,
    /// Reject plaintext HTTP S3 endpoints instead of warning
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AtRestConfig {
    /// Environment variable holding the secret stored values are wrapped with
    pub secret_env: String,
}

impl Default for SdmsgConfig {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
            messages: MessagesConfig::default(),
            records: BackendConfig {
                root: PathBuf::from("~/.local/share/sdmsg/records"),
                bucket: "sdmsg-records".into(),
                ..BackendConfig::default()
            },
            fragments: BackendConfig {
                root: PathBuf::from("~/.local/share/sdmsg/fragments"),
                bucket: "sdmsg-fragments".into(),
                ..BackendConfig::default()
            },
            at_rest: AtRestConfig::default(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_format: "text".into(),
            metrics_addr: Some("127.0.0.1:9190".into()),
            sweep_interval_secs: 300,
        }
    }
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            meta_key_env: "SDMSG_META_KEY".into(),
            hit_points: 3,
            expires_in_secs: 86_400,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Fs,
            root: PathBuf::from("~/.local/share/sdmsg"),
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "sdmsg".into(),
            enforce_tls: false,
        }
    }
}

impl Default for AtRestConfig {
    fn default() -> Self {
        Self {
            secret_env: "SDMSG_AT_REST_SECRET".into(),
        }
    }
}

impl BackendConfig {
    /// True if both configs point at the same physical storage.
    pub fn same_medium(&self, other: &BackendConfig) -> bool {
        match (self.backend, other.backend) {
            (BackendKind::Fs, BackendKind::Fs) => {
                // Nested roots share a disk just as equal roots do
                let (a, b) = (expand_tilde(&self.root), expand_tilde(&other.root));
                a.starts_with(&b) || b.starts_with(&a)
            }
            (BackendKind::S3, BackendKind::S3) => {
                self.endpoint == other.endpoint && self.bucket == other.bucket
            }
            _ => false,
        }
    }
}

impl SdmsgConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> SdmsgResult<Self> {
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)
                .map_err(|e| SdmsgError::Config(format!("parsing {}: {e}", path.display())))?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SdmsgResult<()> {
        if self.records.same_medium(&self.fragments) {
            return Err(SdmsgError::Config(
                "records and fragments must be stored on different backends".into(),
            ));
        }
        if self.messages.hit_points == 0 {
            return Err(SdmsgError::Config("messages.hit_points must be at least 1".into()));
        }
        if self.messages.expires_in_secs <= 0 {
            return Err(SdmsgError::Config(
                "messages.expires_in_secs must be positive".into(),
            ));
        }
        if self.daemon.sweep_interval_secs == 0 {
            return Err(SdmsgError::Config(
                "daemon.sweep_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Read a secret from the environment. Unset or empty is an error.
pub fn read_secret_env(var: &str) -> SdmsgResult<SecretString> {
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => Ok(SecretString::from(value)),
        _ => Err(SdmsgError::Config(format!(
            "environment variable {var} is not set"
        ))),
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[daemon]
log_level = "debug"
log_format = "json"
metrics_addr = "0.0.0.0:9300"
sweep_interval_secs = 60

[messages]
meta_key_env = "APP_META_KEY"
hit_points = 5
expires_in_secs = 3600

[records]
backend = "fs"
root = "/srv/sdmsg/records"

[fragments]
backend = "s3"
endpoint = "https://s3.example.com:8333"
region = "eu-west-1"
bucket = "fragments"
enforce_tls = true

[at_rest]
secret_env = "APP_AT_REST"
"#;
        let config: SdmsgConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.daemon.metrics_addr.as_deref(), Some("0.0.0.0:9300"));
        assert_eq!(config.daemon.sweep_interval_secs, 60);
        assert_eq!(config.messages.meta_key_env, "APP_META_KEY");
        assert_eq!(config.messages.hit_points, 5);
        assert_eq!(config.messages.expires_in_secs, 3600);
        assert_eq!(config.records.backend, BackendKind::Fs);
        assert_eq!(config.records.root, PathBuf::from("/srv/sdmsg/records"));
        assert_eq!(config.fragments.backend, BackendKind::S3);
        assert_eq!(config.fragments.bucket, "fragments");
        assert!(config.fragments.enforce_tls);
        assert_eq!(config.at_rest.secret_env, "APP_AT_REST");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_defaults() {
        let config: SdmsgConfig = toml::from_str("").unwrap();

        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.daemon.log_format, "text");
        assert_eq!(config.daemon.sweep_interval_secs, 300);
        assert_eq!(config.messages.hit_points, 3);
        assert_eq!(config.messages.expires_in_secs, 86_400);
        assert_eq!(config.messages.meta_key_env, "SDMSG_META_KEY");
        assert_eq!(config.at_rest.secret_env, "SDMSG_AT_REST_SECRET");
        assert_ne!(config.records.root, config.fragments.root);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[messages]
hit_points = 1
"#;
        let config: SdmsgConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.messages.hit_points, 1);
        // Defaults
        assert_eq!(config.messages.expires_in_secs, 86_400);
        assert_eq!(config.records.backend, BackendKind::Fs);
        assert_eq!(config.daemon.log_level, "info");
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = SdmsgConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: SdmsgConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.records.root, parsed.records.root);
        assert_eq!(config.fragments.root, parsed.fragments.root);
        assert_eq!(config.messages.hit_points, parsed.messages.hit_points);
    }

    #[test]
    fn test_validate_rejects_shared_medium() {
        let toml_str = r#"
[records]
root = "/srv/sdmsg"

[fragments]
root = "/srv/sdmsg"
"#;
        let config: SdmsgConfig = toml::from_str(toml_str).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("different backends"));
    }

    #[test]
    fn test_validate_rejects_nested_fs_roots() {
        let mut config = SdmsgConfig::default();
        config.records.root = PathBuf::from("/srv/sdmsg");
        config.fragments.root = PathBuf::from("/srv/sdmsg/fragments");
        assert!(config.validate().is_err());

        // Either direction
        std::mem::swap(&mut config.records.root, &mut config.fragments.root);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sibling_fs_roots_are_distinct() {
        let mut config = SdmsgConfig::default();
        config.records.root = PathBuf::from("/srv/sdmsg/records");
        config.fragments.root = PathBuf::from("/srv/sdmsg/records-fragments");
        assert!(config.validate().is_ok());
        assert!(SdmsgConfig::default().validate().is_ok());
    }

    #[test]
    fn test_memory_backends_never_share() {
        let mut config = SdmsgConfig::default();
        config.records.backend = BackendKind::Memory;
        config.fragments.backend = BackendKind::Memory;
        config.fragments.root = config.records.root.clone();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = SdmsgConfig::default();
        config.messages.hit_points = 0;
        assert!(config.validate().is_err());

        let mut config = SdmsgConfig::default();
        config.messages.expires_in_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SdmsgConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.messages.hit_points, 3);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sdmsg.toml");
        std::fs::write(&path, "[daemon]\nsweep_interval_secs = 15\n").unwrap();

        let config = SdmsgConfig::load(&path).unwrap();
        assert_eq!(config.daemon.sweep_interval_secs, 15);
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sdmsg.toml");
        std::fs::write(&path, "[daemon\n").unwrap();

        assert!(matches!(SdmsgConfig::load(&path), Err(SdmsgError::Config(_))));
    }

    #[test]
    fn test_read_secret_env_missing() {
        let err = read_secret_env("SDMSG_TEST_DEFINITELY_UNSET_VAR").unwrap_err();
        assert!(err.to_string().contains("SDMSG_TEST_DEFINITELY_UNSET_VAR"));
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde(Path::new("~/.local/share/sdmsg"));
        assert!(!expanded.to_string_lossy().starts_with("~/"));
        assert_eq!(expand_tilde(Path::new("/abs/path")), PathBuf::from("/abs/path"));
    }
}
