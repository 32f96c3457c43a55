//! Housekeeping sweep: purge expired, exhausted and orphaned messages
//!
//! Only metadata is decrypted, which needs the database key, the storage key
//! and the app meta key but never a verification code.

use tracing::{debug, info, warn};

use crate::error::VaultResult;
use crate::vault::Vault;

/// Result of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records looked at
    pub scanned: u64,
    /// Expired or exhausted messages deleted
    pub destroyed: u64,
    /// Records without a storage key fragment, deleted
    pub orphaned: u64,
    /// Records that could not be inspected and were left in place
    pub failed: u64,
}

enum Outcome {
    Kept,
    Destroyed,
    Orphaned,
    Vanished,
}

impl Vault {
    /// Sweep every record against `now` (Unix seconds).
    ///
    /// A record whose metadata cannot be decrypted is logged and skipped, never
    /// deleted: it may belong to a deployment with a different meta key.
    pub async fn housekeeping(&self, now: i64) -> VaultResult<SweepReport> {
        let ids = self.records().list_ids().await?;
        let mut report = SweepReport::default();

        for id in ids {
            report.scanned += 1;
            match self.sweep_one(&id, now).await {
                Ok(Outcome::Kept) | Ok(Outcome::Vanished) => {}
                Ok(Outcome::Destroyed) => report.destroyed += 1,
                Ok(Outcome::Orphaned) => report.orphaned += 1,
                Err(e) => {
                    warn!(id = %id, error = %e, "housekeeping skipped message");
                    report.failed += 1;
                }
            }
        }

        info!(
            scanned = report.scanned,
            destroyed = report.destroyed,
            orphaned = report.orphaned,
            failed = report.failed,
            "housekeeping sweep complete"
        );
        Ok(report)
    }

    async fn sweep_one(&self, id: &str, now: i64) -> VaultResult<Outcome> {
        let _guard = self.lock(id).await;

        if !self.records().exists(id).await? {
            return Ok(Outcome::Vanished);
        }
        if !self.fragments().exists(id).await? {
            debug!(id, "record has no storage key fragment");
            self.destroy_locked(id).await?;
            return Ok(Outcome::Orphaned);
        }

        let message = self.load(id).await?;
        let mut message = self.factory().decrypt_meta(message)?;
        message.wipe_keys(true);

        if message.hit_points() == 0 || now > message.expires_at() {
            debug!(
                id,
                hit_points = message.hit_points(),
                expires_at = message.expires_at(),
                "purging dead message"
            );
            self.destroy_locked(id).await?;
            return Ok(Outcome::Destroyed);
        }

        Ok(Outcome::Kept)
    }
}
