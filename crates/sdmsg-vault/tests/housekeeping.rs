//! Housekeeping sweep over a mix of live, expired, exhausted, orphaned and
//! foreign messages.

use sdmsg_crypto::{Factory, MetaKey};
use sdmsg_storage::{
    memory_operator, AtRestCipher, FragmentStore, RecordStore, FRAGMENTS_DOMAIN, RECORDS_DOMAIN,
};
use sdmsg_vault::{SweepReport, Vault, VaultEvent};
use secrecy::SecretString;

const NOW: i64 = 1_700_000_000;

fn stores() -> (RecordStore, FragmentStore) {
    let secret = SecretString::from("vault housekeeping test secret");
    (
        RecordStore::new(
            memory_operator().expect("memory operator"),
            AtRestCipher::derive(&secret, RECORDS_DOMAIN).unwrap(),
        ),
        FragmentStore::new(
            memory_operator().expect("memory operator"),
            AtRestCipher::derive(&secret, FRAGMENTS_DOMAIN).unwrap(),
        ),
    )
}

fn vault_on(meta_key: &str, (records, fragments): (RecordStore, FragmentStore)) -> Vault {
    Vault::new(Factory::new(MetaKey::new(meta_key).unwrap()), records, fragments)
}

#[tokio::test]
async fn sweep_empty_store() {
    let vault = vault_on("metaKey___", stores());
    assert_eq!(vault.housekeeping(NOW).await.unwrap(), SweepReport::default());
}

#[tokio::test]
async fn sweep_purges_dead_and_keeps_live() {
    let stores = stores();
    let vault = vault_on("metaKey___", stores.clone());
    let foreign = vault_on("otherKey__", stores);

    let live = vault.encrypt("live", Some(NOW + 60), None).await.unwrap();
    let boundary = vault.encrypt("boundary", Some(NOW), None).await.unwrap();
    let expired = vault.encrypt("expired", Some(NOW - 1), None).await.unwrap();
    let exhausted = vault.encrypt("exhausted", Some(NOW + 60), Some(0)).await.unwrap();
    let orphan = vault.encrypt("orphan", Some(NOW + 60), None).await.unwrap();
    vault.fragments().delete(&orphan.id).await.unwrap();
    let other = foreign.encrypt("foreign", Some(NOW - 1), None).await.unwrap();

    let mut events = vault.subscribe();
    let report = vault.housekeeping(NOW).await.unwrap();

    assert_eq!(
        report,
        SweepReport {
            scanned: 6,
            destroyed: 2,
            orphaned: 1,
            failed: 1,
        }
    );

    for kept in [&live.id, &boundary.id, &other.id] {
        assert!(vault.records().exists(kept).await.unwrap(), "{kept} must be kept");
    }
    for gone in [&expired.id, &exhausted.id, &orphan.id] {
        assert!(!vault.records().exists(gone).await.unwrap(), "{gone} must be purged");
        assert!(!vault.fragments().exists(gone).await.unwrap());
    }

    let mut destroyed = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let VaultEvent::Destroyed { id } = event {
            destroyed.push(id);
        }
    }
    destroyed.sort();
    let mut expected = vec![expired.id.clone(), exhausted.id.clone(), orphan.id.clone()];
    expected.sort();
    assert_eq!(destroyed, expected);
}

#[tokio::test]
async fn sweep_is_idempotent() {
    let vault = vault_on("metaKey___", stores());
    vault.encrypt("expired", Some(NOW - 1), None).await.unwrap();
    vault.encrypt("live", Some(NOW + 1), None).await.unwrap();

    let first = vault.housekeeping(NOW).await.unwrap();
    assert_eq!(first.destroyed, 1);

    let second = vault.housekeeping(NOW).await.unwrap();
    assert_eq!(
        second,
        SweepReport {
            scanned: 1,
            ..SweepReport::default()
        }
    );
}

#[tokio::test]
async fn sweep_after_spent_hit_points() {
    let vault = vault_on("metaKey___", stores());
    // Reads go through the real clock, so the message must be live right now
    let expires_at = sdmsg_crypto::unix_now() + 3600;
    let created = vault.encrypt("hello", Some(expires_at), Some(2)).await.unwrap();

    // One wrong code leaves a live message with one hit point
    assert!(vault.decrypt(&created.id, "0000000000").await.is_err());
    let report = vault.housekeeping(expires_at - 1).await.unwrap();
    assert_eq!(report.destroyed, 0);
    assert_eq!(vault.get_meta(&created.id).await.unwrap().hit_points, 1);

    let report = vault.housekeeping(expires_at + 1).await.unwrap();
    assert_eq!(report.destroyed, 1);
}
