//! OpenDAL Operator factory for sdmsg storage backends

use anyhow::{Context, Result};
use opendal::{Builder, Operator};
use sdmsg_core::config::{expand_tilde, BackendConfig, BackendKind};

/// S3 credentials, read from the environment rather than the config file
#[derive(Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

impl S3Credentials {
    /// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`, falling back to the
    /// `SDMSG_` prefixed names.
    pub fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .or_else(|_| std::env::var("SDMSG_ACCESS_KEY_ID"))
            .context(
                "S3 credentials not found.\n\
                 Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY (or SDMSG_ACCESS_KEY_ID / \
                 SDMSG_SECRET_ACCESS_KEY) to use an s3 backend.",
            )?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .or_else(|_| std::env::var("SDMSG_SECRET_ACCESS_KEY"))
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;

        Ok(Self {
            access_key_id,
            secret_access_key,
        })
    }
}

/// Build an operator for one storage channel.
///
/// `creds` is only consulted for s3 backends. If `enforce_tls` is set and the
/// s3 endpoint uses HTTP this returns an error, otherwise it logs a warning.
pub fn build_operator(cfg: &BackendConfig, creds: Option<&S3Credentials>) -> Result<Operator> {
    match cfg.backend {
        BackendKind::Memory => memory_operator(),
        BackendKind::Fs => {
            let root = expand_tilde(&cfg.root);
            std::fs::create_dir_all(&root)
                .with_context(|| format!("creating storage root: {}", root.display()))?;
            finish(opendal::services::Fs::default().root(&root.to_string_lossy()))
        }
        BackendKind::S3 => {
            if cfg.endpoint.starts_with("http://") {
                if cfg.enforce_tls {
                    anyhow::bail!(
                        "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                         Use an HTTPS endpoint or set enforce_tls = false for local development.",
                        cfg.endpoint
                    );
                }
                tracing::warn!(
                    endpoint = %cfg.endpoint,
                    "S3 endpoint uses plaintext HTTP, credentials are transmitted unencrypted"
                );
            }
            let creds = creds.context("s3 backend requires credentials")?;

            // Path-style addressing is the default, which SeaweedFS and MinIO need
            let builder = opendal::services::S3::default()
                .endpoint(&cfg.endpoint)
                .region(&cfg.region)
                .bucket(&cfg.bucket)
                .access_key_id(&creds.access_key_id)
                .secret_access_key(&creds.secret_access_key);
            finish(builder)
        }
    }
}

/// In-memory operator, for tests and throwaway deployments.
pub fn memory_operator() -> Result<Operator> {
    finish(opendal::services::Memory::default())
}

fn finish<B: Builder>(builder: B) -> Result<Operator> {
    let op = Operator::new(builder)
        .context("creating OpenDAL operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}
