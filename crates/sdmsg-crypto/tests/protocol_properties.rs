//! End-to-end properties of the encrypt/decrypt protocol.
//!
//! Each test simulates the storage split: after encryption the sealed halves
//! and fragments are copied into a fresh message, the way a caller rebuilds
//! one from its record store, fragment store and the recipient's code.

use proptest::prelude::*;
use sdmsg_crypto::{Clock, CryptoError, Engine, SecureMessage};

const NOW: i64 = 1_700_000_000;
const FUTURE: i64 = 4_823_435_472;

struct FixedClock(i64);

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0
    }
}

fn engine() -> Engine {
    Engine::with_clock(FixedClock(NOW))
}

fn seal_unit_test(hit_points: u32, expires_at: i64) -> SecureMessage {
    let mut message = SecureMessage::new();
    message
        .set_content("Unit Test")
        .set_hit_points(hit_points)
        .set_expires_at(expires_at)
        .set_database_key("databaseKey")
        .set_storage_key("storageKey_")
        .set_verification_code("1234567890")
        .set_meta_key("metaKey___");
    engine().encrypt(message).expect("encrypt")
}

fn rebuild(stored: &SecureMessage, verification_code: &str) -> SecureMessage {
    let mut message = SecureMessage::new();
    message
        .set_encrypted_content(stored.encrypted_content().expect("sealed content"))
        .set_encrypted_meta(stored.encrypted_meta().expect("sealed meta"))
        .set_database_key("databaseKey")
        .set_storage_key("storageKey_")
        .set_verification_code(verification_code)
        .set_meta_key("metaKey___");
    message
}

fn stored_hit_points(stored: &SecureMessage) -> u32 {
    engine()
        .decrypt_meta(rebuild(stored, "1234567890"))
        .expect("meta opens")
        .hit_points()
}

#[test]
fn unit_test_scenario() {
    let stored = seal_unit_test(3, FUTURE);
    let decrypted = engine().decrypt(rebuild(&stored, "1234567890")).unwrap();

    assert_eq!(decrypted.content(), Some(&b"Unit Test"[..]));
    assert_eq!(decrypted.hit_points(), 3);
    assert_eq!(decrypted.expires_at(), FUTURE);
}

#[test]
fn hit_points_drain_one_per_failure_until_exhausted() {
    let mut stored = seal_unit_test(3, FUTURE);

    for expected in [2, 1] {
        let err = engine().decrypt(rebuild(&stored, "0000000000")).unwrap_err();
        assert!(matches!(err, CryptoError::DecryptFailure(_)));
        stored = err.into_message().unwrap();
        assert_eq!(stored_hit_points(&stored), expected);
    }

    let err = engine().decrypt(rebuild(&stored, "0000000000")).unwrap_err();
    assert!(err.is_terminal());
    assert!(matches!(err, CryptoError::HitPointsExhausted(_)));
    stored = err.into_message().unwrap();
    assert_eq!(stored_hit_points(&stored), 0);

    // Zero is terminal even for the right code, and never underflows
    let err = engine().decrypt(rebuild(&stored, "1234567890")).unwrap_err();
    assert!(matches!(err, CryptoError::HitPointsExhausted(_)));
    assert_eq!(stored_hit_points(err.message().unwrap()), 0);
}

#[test]
fn single_hit_point_exhausts_on_first_failure() {
    let stored = seal_unit_test(1, FUTURE);
    let err = engine().decrypt(rebuild(&stored, "0000000000")).unwrap_err();

    assert!(matches!(err, CryptoError::HitPointsExhausted(_)));
    assert_eq!(stored_hit_points(err.message().unwrap()), 0);
}

#[test]
fn expiry_wins_over_hit_points_and_keeps_the_count() {
    let stored = seal_unit_test(3, NOW - 1);

    for code in ["1234567890", "0000000000"] {
        let err = engine().decrypt(rebuild(&stored, code)).unwrap_err();
        assert!(matches!(err, CryptoError::Expired(_)), "code {code}");
        assert_eq!(stored_hit_points(err.message().unwrap()), 3);
    }
}

#[test]
fn key_length_guard() {
    let mut message = SecureMessage::new();
    message
        .set_content("Unit Test")
        .set_database_key("databaseKey")
        .set_storage_key("storageKey_")
        .set_verification_code("123")
        .set_meta_key("metaKey___");
    assert!(matches!(
        engine().encrypt(message),
        Err(CryptoError::InvalidKeyLength { expected: 32, actual: 25 })
    ));

    let stored = seal_unit_test(3, FUTURE);
    let err = engine().decrypt(rebuild(&stored, "123")).unwrap_err();
    assert!(matches!(err, CryptoError::DecryptFailure(_)));
}

#[test]
fn validate_never_touches_hit_points() {
    let stored = seal_unit_test(2, FUTURE);

    for code in ["1234567890", "0000000000", "12"] {
        let probe = rebuild(&stored, code);
        let expected = code == "1234567890";
        assert_eq!(engine().validate_encryption_key(&probe), expected, "code {code}");
    }

    assert_eq!(stored_hit_points(&stored), 2);
}

#[test]
fn reencrypting_a_sealed_message_is_a_noop() {
    let stored = seal_unit_test(3, FUTURE);
    let again = engine().encrypt(rebuild(&stored, "1234567890")).unwrap();

    assert_eq!(again.encrypted_content(), stored.encrypted_content());
    assert_eq!(again.encrypted_meta(), stored.encrypted_meta());
}

#[test]
fn failure_reseals_meta_under_a_fresh_nonce() {
    let stored = seal_unit_test(3, FUTURE);
    let first = engine()
        .decrypt(rebuild(&stored, "0000000000"))
        .unwrap_err()
        .into_message()
        .unwrap();
    let second = engine()
        .decrypt(rebuild(&stored, "0000000000"))
        .unwrap_err()
        .into_message()
        .unwrap();

    // Same plaintext meta (hit_points = 2), different sealed values
    assert_ne!(first.encrypted_meta(), second.encrypted_meta());
    assert_eq!(stored_hit_points(&first), stored_hit_points(&second));
}

proptest! {
    #[test]
    fn roundtrip_any_content(
        content in prop::collection::vec(any::<u8>(), 0..2048),
        hit_points in 1u32..100,
        code in "[0-9a-f]{10}",
    ) {
        let mut message = SecureMessage::new();
        message
            .set_content(content.clone())
            .set_hit_points(hit_points)
            .set_expires_at(FUTURE)
            .set_database_key("databaseKey")
            .set_storage_key("storageKey_")
            .set_verification_code(code.as_str())
            .set_meta_key("metaKey___");
        let stored = engine().encrypt(message).unwrap();

        let decrypted = engine().decrypt(rebuild(&stored, &code)).unwrap();
        prop_assert_eq!(decrypted.content(), Some(content.as_slice()));
        prop_assert_eq!(decrypted.hit_points(), hit_points);
        prop_assert_eq!(decrypted.expires_at(), FUTURE);
        prop_assert!(decrypted.encrypted_content().is_none());
        prop_assert!(decrypted.encrypted_meta().is_none());
        prop_assert!(decrypted.verification_code().is_none());
        prop_assert!(decrypted.metadata_key().is_none());
    }
}
