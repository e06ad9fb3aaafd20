use challenge::{
    ChallengeCodec, ChallengeError, ChallengeService, ChallengeStore, Clock, DerivedKeyResolver,
    ErrorKind, FixedRandom, HmacDigestProvider, ManualClock, OsRandom, PersistentChallengeStore,
    StatelessChallengeSigner, StorageConfig, TenantId,
};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::tempdir;

fn tenant(id: &str) -> TenantId {
    TenantId::new(id).expect("valid tenant id")
}

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 5, h, m, s).unwrap()
}

fn stateless_signer(delta: u32, clock: &ManualClock) -> StatelessChallengeSigner {
    let resolver = DerivedKeyResolver::from_bytes(&[0x5a; 32]).expect("32-byte master key");
    StatelessChallengeSigner::with_parts(
        delta,
        Arc::new(HmacDigestProvider::new(resolver)),
        Arc::new(OsRandom),
        Arc::new(clock.clone()),
    )
    .expect("valid bucket width")
}

async fn sqlite_store(dir: &std::path::Path, ttl_ms: u64) -> PersistentChallengeStore {
    let store = ChallengeStore::from_config(&StorageConfig::default(), dir)
        .await
        .expect("sqlite store");
    PersistentChallengeStore::new(store, ttl_ms)
}

fn flip_bit(token: &str, expected_len: usize, bit: usize) -> String {
    let mut payload = ChallengeCodec::decode(token, expected_len).expect("decodable token");
    payload[bit / 8] ^= 1 << (bit % 8);
    ChallengeCodec::encode(&payload).expect("re-encodable payload")
}

#[tokio::test]
async fn test_round_trip_both_backends() {
    let temp_dir = tempdir().unwrap();
    let persistent = ChallengeService::Persistent(sqlite_store(temp_dir.path(), 900_000).await);
    let clock = ManualClock::at(at(8, 0, 0));
    let stateless = ChallengeService::Stateless(stateless_signer(900, &clock));

    for service in [&persistent, &stateless] {
        for id in ["z1verifier", "z2verifier", "did:key:verifier"] {
            let t = tenant(id);
            let token = service.issue(&t).await.unwrap();
            let outcome = service.verify(&t, &token).await.unwrap();
            assert!(outcome.verified, "{} should verify for {id}", service.backend_name());
            assert!(outcome.error.is_none());
        }
    }

    persistent.close().await;
}

#[tokio::test]
async fn test_stateless_quarter_hour_scenario() {
    let clock = ManualClock::at(at(17, 4, 0));
    let signer = stateless_signer(900, &clock);
    let t = tenant("z1verifier");
    let token = signer.issue(&t).await.unwrap();

    for (time, expected) in [
        (at(17, 10, 0), true),
        (at(17, 20, 0), true),
        (at(16, 50, 0), false),
    ] {
        clock.set(time);
        assert_eq!(
            signer.verify(&t, &token).await.unwrap().verified,
            expected,
            "verify at {time}"
        );
    }
}

#[tokio::test]
async fn test_stateless_effective_validity_depends_on_issue_offset() {
    let clock = ManualClock::at(at(17, 14, 59));
    let signer = stateless_signer(900, &clock);
    let t = tenant("z1verifier");

    // 桶末尾签发：有效期略长于一个桶
    let late = signer.issue(&t).await.unwrap();
    // 桶起点签发：有效期为两个桶
    clock.set(at(17, 0, 0));
    let early = signer.issue(&t).await.unwrap();

    clock.set(at(17, 29, 59));
    assert!(signer.verify(&t, &late).await.unwrap().verified);
    assert!(signer.verify(&t, &early).await.unwrap().verified);

    clock.set(at(17, 30, 0));
    assert!(!signer.verify(&t, &late).await.unwrap().verified);
    assert!(!signer.verify(&t, &early).await.unwrap().verified);
}

#[tokio::test]
async fn test_stateless_window_boundaries() {
    let delta: u32 = 300;
    let issued = at(23, 55, 0);
    let clock = ManualClock::at(issued);
    let signer = stateless_signer(delta, &clock);
    let t = tenant("verifier");
    let token = signer.issue(&t).await.unwrap();
    let issued_secs = issued.timestamp();

    // 跨越零点
    for offset in [0, 1, 299, 300, 599] {
        clock.set_secs(issued_secs + offset);
        assert!(
            signer.verify(&t, &token).await.unwrap().verified,
            "T+{offset} should verify"
        );
    }
    for offset in [-1, 600, 601] {
        clock.set_secs(issued_secs + offset);
        assert!(
            !signer.verify(&t, &token).await.unwrap().verified,
            "T{offset:+} should not verify"
        );
    }
}

#[tokio::test]
async fn test_stateless_tamper_every_bit() {
    let clock = ManualClock::at(at(9, 30, 0));
    let signer = stateless_signer(900, &clock);
    let t = tenant("verifier");
    let token = signer.issue(&t).await.unwrap();
    assert!(signer.verify(&t, &token).await.unwrap().verified);

    for bit in 0..48 * 8 {
        let tampered = flip_bit(&token, 48, bit);
        let outcome = signer.verify(&t, &tampered).await.unwrap();
        assert!(!outcome.verified, "flipped bit {bit} must not verify");
        assert_eq!(outcome.error, Some(ErrorKind::InvalidOrExpired));
    }
}

#[tokio::test]
async fn test_persistent_tamper_every_bit() {
    let store = PersistentChallengeStore::new(ChallengeStore::memory(), 900_000);
    let t = tenant("verifier");
    let token = store.create(&t).await.unwrap();

    for bit in 0..16 * 8 {
        let tampered = flip_bit(&token, 16, bit);
        assert!(!store.verify(&t, &tampered).await.unwrap().verified);
    }

    // 篡改尝试不计入原 challenge 的使用次数
    assert_eq!(store.verify(&t, &token).await.unwrap().uses, Some(1));
}

#[tokio::test]
async fn test_cross_tenant_isolation() {
    let temp_dir = tempdir().unwrap();
    let clock = ManualClock::at(at(12, 0, 0));
    let services = [
        ChallengeService::Persistent(sqlite_store(temp_dir.path(), 900_000).await),
        ChallengeService::Stateless(stateless_signer(900, &clock)),
    ];

    let a = tenant("verifier-a");
    let b = tenant("verifier-b");
    for service in &services {
        let token = service.issue(&a).await.unwrap();

        let outcome = service.verify(&b, &token).await.unwrap();
        assert!(!outcome.verified);
        assert_eq!(outcome.error, Some(ErrorKind::InvalidOrExpired));
        assert_eq!(
            outcome.message(),
            Some(challenge::INVALID_OR_EXPIRED_MESSAGE)
        );

        assert!(service.verify(&a, &token).await.unwrap().verified);
    }
}

#[tokio::test]
async fn test_tokens_are_not_interchangeable_between_backends() {
    let clock = ManualClock::at(at(12, 0, 0));
    let signer = stateless_signer(900, &clock);
    let store = PersistentChallengeStore::new(ChallengeStore::memory(), 900_000);
    let t = tenant("verifier");

    let stateful_token = store.create(&t).await.unwrap();
    let stateless_token = signer.issue(&t).await.unwrap();

    let outcome = signer.verify(&t, &stateful_token).await.unwrap();
    assert_eq!(outcome.error, Some(ErrorKind::MalformedToken));

    let outcome = store.verify(&t, &stateless_token).await.unwrap();
    assert_eq!(outcome.error, Some(ErrorKind::MalformedToken));
}

#[tokio::test]
async fn test_persistent_duplicate_value_sqlite() {
    let temp_dir = tempdir().unwrap();
    let store = sqlite_store(temp_dir.path(), 900_000)
        .await
        .with_random(Arc::new(FixedRandom::repeating([0x11; 16])));
    let t = tenant("verifier");

    let token = store.create(&t).await.unwrap();
    let duplicate = store.create(&tenant("other")).await;
    assert!(matches!(duplicate, Err(ChallengeError::DuplicateChallenge)));
    assert!(duplicate.unwrap_err().is_retryable());

    // 原记录不受影响
    assert_eq!(store.verify(&t, &token).await.unwrap().uses, Some(1));
    store.close().await;
}

#[tokio::test]
async fn test_persistent_expiry_sqlite() {
    let temp_dir = tempdir().unwrap();
    let clock = ManualClock::at(at(10, 0, 0));
    let store = sqlite_store(temp_dir.path(), 60_000)
        .await
        .with_clock(Arc::new(clock.clone()));
    let t = tenant("verifier");

    let zero_ttl = store.create_with_ttl(&t, 0).await.unwrap();
    assert!(!store.verify(&t, &zero_ttl).await.unwrap().verified);

    let token = store.create(&t).await.unwrap();
    clock.advance_millis(59_999);
    assert_eq!(store.verify(&t, &token).await.unwrap().uses, Some(1));

    clock.advance_millis(1);
    let outcome = store.verify(&t, &token).await.unwrap();
    assert!(!outcome.verified);
    assert_eq!(outcome.error, Some(ErrorKind::InvalidOrExpired));

    // ttl = 0 的记录已在下一次插入时清理
    assert_eq!(store.store().count().await.unwrap(), 1);
    assert_eq!(store.store().purge_expired(clock.now_millis()).await.unwrap(), 1);
    assert_eq!(store.store().count().await.unwrap(), 0);
    store.close().await;
}

#[tokio::test]
async fn test_closed_store_fails_hard_instead_of_rejecting() {
    let temp_dir = tempdir().unwrap();
    let service = ChallengeService::Persistent(sqlite_store(temp_dir.path(), 900_000).await);
    let t = tenant("verifier");

    let token = service.issue(&t).await.unwrap();
    service.close().await;

    let verify = service.verify(&t, &token).await;
    assert!(
        matches!(verify, Err(ChallengeError::BackendUnavailable(_))),
        "store failure must not be reported as verified=false: {verify:?}"
    );

    let issue = service.issue(&t).await;
    assert!(
        matches!(issue, Err(ChallengeError::BackendUnavailable(_))),
        "unexpected issue result: {issue:?}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_verifies_count_each_use_once() {
    const N: u64 = 24;

    let temp_dir = tempdir().unwrap();
    let store = sqlite_store(temp_dir.path(), 900_000).await;
    let t = tenant("verifier");
    let token = store.create(&t).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..N {
        let store = store.clone();
        let t = t.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            store.verify(&t, &token).await.unwrap()
        }));
    }

    let mut uses = HashSet::new();
    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(outcome.verified);
        assert!(uses.insert(outcome.uses.unwrap()), "each use count returned once");
    }
    assert_eq!(uses, (1..=N).collect::<HashSet<_>>());

    store.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_verifies_memory_backend() {
    const N: u64 = 64;

    let store = PersistentChallengeStore::new(ChallengeStore::memory(), 900_000);
    let t = tenant("verifier");
    let token = store.create(&t).await.unwrap();

    let handles: Vec<_> = (0..N)
        .map(|_| {
            let store = store.clone();
            let t = t.clone();
            let token = token.clone();
            tokio::spawn(async move { store.verify(&t, &token).await.unwrap().uses })
        })
        .collect();

    let mut uses = Vec::new();
    for handle in handles {
        uses.push(handle.await.unwrap().unwrap());
    }
    uses.sort_unstable();
    assert_eq!(uses, (1..=N).collect::<Vec<_>>());
}
