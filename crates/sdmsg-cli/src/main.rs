//! sdmsg: self-destructing message CLI
//!
//! Commands:
//!   create [CONTENT | --file F]   - seal a message, print its id and verification code
//!   read <id> [--code C]          - decrypt and destroy a message
//!   check <id> [--code C]         - probe a verification code without spending a hit point
//!   meta <id>                     - show remaining hit points and expiry
//!   destroy <id>                  - delete a message
//!   housekeeping                  - purge expired, exhausted and orphaned messages once
//!   config show                   - display current configuration
//!   status                        - check both storage channels

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use sdmsg_core::config::SdmsgConfig;
use sdmsg_vault::{Vault, VaultError};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sdmsg",
    version,
    about = "Split-key, self-destructing encrypted messages",
    long_about = "sdmsg: create messages that can be read once with a verification code \
                  and destroy themselves after too many wrong guesses or on expiry"
)]
struct Cli {
    /// Path to sdmsg.toml configuration file
    #[arg(long, short = 'c', env = "SDMSG_CONFIG", default_value = "/etc/sdmsg/config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SDMSG_LOG", default_value = "warn")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "SDMSG_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Seal a new message
    ///
    /// Content comes from the argument, --file, or stdin (in that order).
    Create {
        /// Message content
        content: Option<String>,
        /// Read content from a file
        #[arg(long, short = 'f', conflicts_with = "content")]
        file: Option<PathBuf>,
        /// Decrypt attempts allowed (default: messages.hit_points)
        #[arg(long)]
        hit_points: Option<u32>,
        /// Lifetime in seconds (default: messages.expires_in_secs)
        #[arg(long)]
        expires_in: Option<i64>,
    },

    /// Decrypt a message and destroy it
    Read {
        id: String,
        /// Verification code (prompted for when omitted)
        #[arg(long, env = "SDMSG_CODE")]
        code: Option<String>,
    },

    /// Check a verification code without spending a hit point
    Check {
        id: String,
        #[arg(long, env = "SDMSG_CODE")]
        code: Option<String>,
    },

    /// Show remaining hit points and expiry
    Meta { id: String },

    /// Delete a message
    Destroy { id: String },

    /// Purge expired, exhausted and orphaned messages once
    Housekeeping,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Check that both storage channels are reachable
    Status,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log, &cli.log_format);

    let config = SdmsgConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;

    match cli.command {
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
        Commands::Create {
            content,
            file,
            hit_points,
            expires_in,
        } => {
            let vault = open_vault(&config)?;
            cmd_create(&vault, content, file.as_deref(), hit_points, expires_in).await
        }
        Commands::Read { id, code } => cmd_read(&open_vault(&config)?, &id, code).await,
        Commands::Check { id, code } => cmd_check(&open_vault(&config)?, &id, code).await,
        Commands::Meta { id } => cmd_meta(&open_vault(&config)?, &id).await,
        Commands::Destroy { id } => cmd_destroy(&open_vault(&config)?, &id).await,
        Commands::Housekeeping => cmd_housekeeping(&open_vault(&config)?).await,
        Commands::Status => cmd_status(&config).await,
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries message content, logs go to stderr
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn open_vault(config: &SdmsgConfig) -> Result<Vault> {
    tracing::debug!(
        records = ?config.records.backend,
        fragments = ?config.fragments.backend,
        "opening vault"
    );
    Vault::from_config(config).context(
        "opening vault\n\
         The meta key and at-rest secret are read from the environment variables\n\
         named by messages.meta_key_env and at_rest.secret_env (default:\n\
         SDMSG_META_KEY, exactly 10 bytes, and SDMSG_AT_REST_SECRET, at least 16 bytes).",
    )
}

/// Code from the flag, or prompted for without echo.
fn resolve_code(code: Option<String>) -> Result<Zeroizing<String>> {
    match code {
        Some(code) => Ok(Zeroizing::new(code)),
        None => rpassword::prompt_password("Verification code: ")
            .map(|code| Zeroizing::new(code.trim().to_string()))
            .context("reading verification code"),
    }
}

// ── `sdmsg create` ────────────────────────────────────────────────────────────

async fn cmd_create(
    vault: &Vault,
    content: Option<String>,
    file: Option<&Path>,
    hit_points: Option<u32>,
    expires_in: Option<i64>,
) -> Result<()> {
    let content = match (content, file) {
        (Some(content), _) => Zeroizing::new(content.into_bytes()),
        (None, Some(path)) => Zeroizing::new(
            tokio::fs::read(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?,
        ),
        (None, None) => {
            let mut buf = Zeroizing::new(Vec::new());
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("reading content from stdin")?;
            buf
        }
    };

    if let Some(secs) = expires_in {
        anyhow::ensure!(secs > 0, "--expires-in must be positive");
    }
    let expires_at = expires_in.map(|secs| vault.now().saturating_add(secs));

    let created = vault
        .encrypt(content.to_vec(), expires_at, hit_points)
        .await
        .context("creating message")?;

    println!("id:                {}", created.id);
    println!("verification code: {}", created.verification_code.as_str());
    println!("hit points:        {}", created.hit_points);
    println!(
        "expires:           {} (in {})",
        created.expires_at,
        format_duration(created.expires_at - vault.now())
    );
    Ok(())
}

// ── `sdmsg read` ──────────────────────────────────────────────────────────────

async fn cmd_read(vault: &Vault, id: &str, code: Option<String>) -> Result<()> {
    let code = resolve_code(code)?;
    match vault.decrypt(id, &code).await {
        Ok(content) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&content).context("writing content")?;
            stdout.flush()?;
            Ok(())
        }
        Err(VaultError::Crypto(e)) if !e.is_terminal() => {
            // The failure already spent a hit point; report what is left
            let remaining = vault.get_meta(id).await.map(|meta| meta.hit_points).ok();
            match remaining {
                Some(left) => anyhow::bail!("{e} ({left} attempt(s) left)"),
                None => anyhow::bail!("{e}"),
            }
        }
        Err(e) if e.is_gone() => anyhow::bail!("{e}; the message has been destroyed"),
        Err(e) => Err(e.into()),
    }
}

// ── `sdmsg check` ─────────────────────────────────────────────────────────────

async fn cmd_check(vault: &Vault, id: &str, code: Option<String>) -> Result<()> {
    let code = resolve_code(code)?;
    if vault.check_verification_code(id, &code).await? {
        println!("valid");
        Ok(())
    } else {
        anyhow::bail!("invalid verification code")
    }
}

// ── `sdmsg meta` ──────────────────────────────────────────────────────────────

async fn cmd_meta(vault: &Vault, id: &str) -> Result<()> {
    let meta = vault.get_meta(id).await?;
    let remaining = meta.expires_at - vault.now();

    println!("id:         {id}");
    println!("hit points: {}", meta.hit_points);
    if remaining >= 0 {
        println!("expires:    {} (in {})", meta.expires_at, format_duration(remaining));
    } else {
        println!("expires:    {} (EXPIRED {} ago)", meta.expires_at, format_duration(-remaining));
    }
    Ok(())
}

// ── `sdmsg destroy` ───────────────────────────────────────────────────────────

async fn cmd_destroy(vault: &Vault, id: &str) -> Result<()> {
    vault.destroy(id).await?;
    println!("destroyed {id}");
    Ok(())
}

// ── `sdmsg housekeeping` ──────────────────────────────────────────────────────

async fn cmd_housekeeping(vault: &Vault) -> Result<()> {
    let report = vault.housekeeping(vault.now()).await?;
    println!("scanned:   {}", report.scanned);
    println!("destroyed: {}", report.destroyed);
    println!("orphaned:  {}", report.orphaned);
    println!("failed:    {}", report.failed);
    Ok(())
}

// ── `sdmsg config show` ───────────────────────────────────────────────────────

fn cmd_config_show(config: &SdmsgConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── `sdmsg status` ────────────────────────────────────────────────────────────

async fn cmd_status(config: &SdmsgConfig) -> Result<()> {
    let vault = open_vault(config)?;
    let records_ok = sdmsg_storage::is_healthy(vault.records().operator()).await;
    let fragments_ok = sdmsg_storage::is_healthy(vault.fragments().operator()).await;

    println!("sdmsg v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "  records:   {:?} [{}]",
        config.records.backend,
        if records_ok { "ok" } else { "UNREACHABLE" }
    );
    println!(
        "  fragments: {:?} [{}]",
        config.fragments.backend,
        if fragments_ok { "ok" } else { "UNREACHABLE" }
    );
    println!("  hit points (default): {}", config.messages.hit_points);
    println!(
        "  lifetime (default):   {}",
        format_duration(config.messages.expires_in_secs)
    );

    if !(records_ok && fragments_ok) {
        anyhow::bail!("storage unreachable");
    }
    Ok(())
}

fn format_duration(secs: i64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86_400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86_400, (secs % 86_400) / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create() {
        let cli = Cli::try_parse_from([
            "sdmsg",
            "create",
            "hello",
            "--hit-points",
            "5",
            "--expires-in",
            "60",
        ])
        .unwrap();
        match cli.command {
            Commands::Create {
                content,
                file,
                hit_points,
                expires_in,
            } => {
                assert_eq!(content.as_deref(), Some("hello"));
                assert!(file.is_none());
                assert_eq!(hit_points, Some(5));
                assert_eq!(expires_in, Some(60));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_create_content_and_file_conflict() {
        let result = Cli::try_parse_from(["sdmsg", "create", "hello", "--file", "x.txt"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_read_with_code() {
        let cli = Cli::try_parse_from([
            "sdmsg",
            "read",
            "0123456789ABCDEF0123456789ABCDEF",
            "--code",
            "1234567890",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Read { ref code, .. } if code.as_deref() == Some("1234567890")
        ));
    }

    #[test]
    fn test_resolve_code_from_flag() {
        let code = resolve_code(Some("1234567890".into())).unwrap();
        assert_eq!(code.as_str(), "1234567890");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(61), "1m 1s");
        assert_eq!(format_duration(3_660), "1h 1m");
        assert_eq!(format_duration(90_000), "1d 1h");
    }
}
