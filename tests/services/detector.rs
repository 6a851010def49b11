//! Integration tests for the duplicate detector.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use receipt_guard::error::{Error, Result};
use receipt_guard::services::detector::{
    DetectorConfig, DuplicateDetector, DuplicateVerdict, MatchKind, Submission,
};
use receipt_guard::services::hasher::{self, ImageHasher, ReceiptHasher};
use receipt_guard::services::record::{
    ImageHashRecord, NewImageHashRecord, Provenance, SimilarityMatch,
};
use receipt_guard::services::store::{HashStore, MemoryHashStore};

use crate::common::{receipt_png, resave_jpeg};

/// Memory store that counts calls to each operation.
#[derive(Default)]
struct CountingStore {
    inner: MemoryHashStore,
    exact_lookups: AtomicUsize,
    nearest_lookups: AtomicUsize,
    inserts: AtomicUsize,
}

#[async_trait]
impl HashStore for CountingStore {
    async fn exact_lookup(&self, cryptographic_hash: &str) -> Result<Option<ImageHashRecord>> {
        self.exact_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.exact_lookup(cryptographic_hash).await
    }

    async fn nearest_lookup(
        &self,
        perceptual_hash: &str,
        max_hamming_distance: u32,
        limit: usize,
    ) -> Result<Vec<SimilarityMatch>> {
        self.nearest_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner
            .nearest_lookup(perceptual_hash, max_hamming_distance, limit)
            .await
    }

    async fn insert(&self, record: NewImageHashRecord) -> Result<ImageHashRecord> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(record).await
    }

    async fn len(&self) -> Result<usize> {
        self.inner.len().await
    }

    async fn records(&self) -> Result<Vec<ImageHashRecord>> {
        self.inner.records().await
    }
}

/// Default hasher that counts perceptual hash computations.
#[derive(Clone, Default)]
struct CountingHasher {
    perceptual_calls: Arc<AtomicUsize>,
}

impl ImageHasher for CountingHasher {
    fn cryptographic_hash(&self, image: &[u8]) -> Result<String> {
        ReceiptHasher.cryptographic_hash(image)
    }

    fn perceptual_hash(&self, image: &[u8]) -> Result<String> {
        self.perceptual_calls.fetch_add(1, Ordering::SeqCst);
        ReceiptHasher.perceptual_hash(image)
    }
}

/// Hasher whose perceptual step takes longer than any test deadline.
struct SlowHasher;

impl ImageHasher for SlowHasher {
    fn cryptographic_hash(&self, image: &[u8]) -> Result<String> {
        hasher::sha256_hash(image)
    }

    fn perceptual_hash(&self, image: &[u8]) -> Result<String> {
        std::thread::sleep(Duration::from_millis(300));
        hasher::perceptual_hash(image)
    }
}

/// Store that hides a record written by a concurrent writer until this
/// caller's own insert collides with it.
struct RacingStore {
    inner: MemoryHashStore,
    hidden: AtomicBool,
}

#[async_trait]
impl HashStore for RacingStore {
    async fn exact_lookup(&self, cryptographic_hash: &str) -> Result<Option<ImageHashRecord>> {
        if self.hidden.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.exact_lookup(cryptographic_hash).await
    }

    async fn nearest_lookup(
        &self,
        perceptual_hash: &str,
        max_hamming_distance: u32,
        limit: usize,
    ) -> Result<Vec<SimilarityMatch>> {
        if self.hidden.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        self.inner
            .nearest_lookup(perceptual_hash, max_hamming_distance, limit)
            .await
    }

    async fn insert(&self, record: NewImageHashRecord) -> Result<ImageHashRecord> {
        self.hidden.store(false, Ordering::SeqCst);
        self.inner.insert(record).await
    }

    async fn len(&self) -> Result<usize> {
        self.inner.len().await
    }

    async fn records(&self) -> Result<Vec<ImageHashRecord>> {
        self.inner.records().await
    }
}

/// Memory store whose exact lookup always misses, as if a concurrent
/// writer committed between the exact and perceptual stages.
#[derive(Default)]
struct BlindExactStore {
    inner: MemoryHashStore,
}

#[async_trait]
impl HashStore for BlindExactStore {
    async fn exact_lookup(&self, _: &str) -> Result<Option<ImageHashRecord>> {
        Ok(None)
    }

    async fn nearest_lookup(
        &self,
        perceptual_hash: &str,
        max_hamming_distance: u32,
        limit: usize,
    ) -> Result<Vec<SimilarityMatch>> {
        self.inner
            .nearest_lookup(perceptual_hash, max_hamming_distance, limit)
            .await
    }

    async fn insert(&self, record: NewImageHashRecord) -> Result<ImageHashRecord> {
        self.inner.insert(record).await
    }

    async fn len(&self) -> Result<usize> {
        self.inner.len().await
    }

    async fn records(&self) -> Result<Vec<ImageHashRecord>> {
        self.inner.records().await
    }
}

/// Store whose backend is down.
struct UnavailableStore;

#[async_trait]
impl HashStore for UnavailableStore {
    async fn exact_lookup(&self, _: &str) -> Result<Option<ImageHashRecord>> {
        Err(Error::StoreUnavailable("connection refused".into()))
    }

    async fn nearest_lookup(&self, _: &str, _: u32, _: usize) -> Result<Vec<SimilarityMatch>> {
        Err(Error::StoreUnavailable("connection refused".into()))
    }

    async fn insert(&self, _: NewImageHashRecord) -> Result<ImageHashRecord> {
        Err(Error::StoreUnavailable("connection refused".into()))
    }

    async fn len(&self) -> Result<usize> {
        Err(Error::StoreUnavailable("connection refused".into()))
    }

    async fn records(&self) -> Result<Vec<ImageHashRecord>> {
        Err(Error::StoreUnavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn test_new_then_exact_resubmission() {
    let detector = DuplicateDetector::new(MemoryHashStore::new());
    let image = receipt_png(1);

    let first = detector.check(&image, &Submission::new()).await.unwrap();
    assert!(!first.is_duplicate());
    assert_eq!(first.kind(), None);

    let second = detector.check(&image, &Submission::new()).await.unwrap();
    assert!(second.is_duplicate());
    assert_eq!(second.kind(), Some(MatchKind::Exact));
    assert_eq!(second.hamming_distance(), Some(0));
    assert_eq!(second.confidence(), Some(1.0));

    let DuplicateVerdict::Unique { record } = first else {
        panic!("First submission should be unique");
    };
    assert_eq!(second.matched(), Some(&record));
    assert_eq!(detector.store().len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_jpeg_resave_is_reported_as_similar() {
    let detector = DuplicateDetector::new(MemoryHashStore::new());
    let original = receipt_png(2);
    let resaved = resave_jpeg(&original, 70);

    detector.check(&original, &Submission::new()).await.unwrap();
    let verdict = detector
        .check(&resaved, &Submission::new().with_max_hamming_distance(5))
        .await
        .unwrap();

    // Usually distance 0: the canonical q85 round-trip absorbs a q70 re-save.
    // The bytes differ, so it is still reported as similar rather than exact.
    assert!(verdict.is_duplicate());
    assert_eq!(verdict.kind(), Some(MatchKind::Similar));
    let distance = verdict.hamming_distance().unwrap();
    assert!(distance <= 5, "distance {} above threshold", distance);
    let confidence = verdict.confidence().unwrap();
    assert!((0.0..=1.0).contains(&confidence));
    assert_eq!(detector.store().len().await.unwrap(), 1, "Similar images are not stored");
}

#[tokio::test]
async fn test_unrelated_image_is_stored_separately() {
    let detector = DuplicateDetector::new(MemoryHashStore::new());

    let a = detector.check(&receipt_png(3), &Submission::new()).await.unwrap();
    let b = detector.check(&receipt_png(4), &Submission::new()).await.unwrap();

    assert!(!a.is_duplicate());
    assert!(!b.is_duplicate());
    assert_eq!(detector.store().len().await.unwrap(), 2);
}

#[tokio::test]
async fn test_exact_hit_skips_perceptual_stage() {
    let hasher = CountingHasher::default();
    let calls = Arc::clone(&hasher.perceptual_calls);
    let detector = DuplicateDetector::with_config(
        CountingStore::default(),
        hasher,
        DetectorConfig::default(),
    );
    let image = receipt_png(5);

    detector.check(&image, &Submission::new()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(detector.store().nearest_lookups.load(Ordering::SeqCst), 1);

    let verdict = detector.check(&image, &Submission::new()).await.unwrap();
    assert_eq!(verdict.kind(), Some(MatchKind::Exact));
    assert_eq!(calls.load(Ordering::SeqCst), 1, "No perceptual hash on exact hit");
    assert_eq!(
        detector.store().nearest_lookups.load(Ordering::SeqCst),
        1,
        "No perceptual query on exact hit"
    );
    assert_eq!(detector.store().exact_lookups.load(Ordering::SeqCst), 2);
    assert_eq!(detector.store().inserts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lost_insert_race_reports_exact_duplicate() {
    let image = receipt_png(6);
    let inner = MemoryHashStore::new();
    inner
        .insert(NewImageHashRecord {
            cryptographic_hash: hasher::sha256_hash(&image).unwrap(),
            perceptual_hash: hasher::perceptual_hash(&image).unwrap(),
            image_url: None,
            provenance: Provenance::default(),
            metadata: Default::default(),
        })
        .await
        .unwrap();
    let detector = DuplicateDetector::new(RacingStore {
        inner,
        hidden: AtomicBool::new(true),
    });

    let verdict = detector.check(&image, &Submission::new()).await.unwrap();

    assert_eq!(verdict.kind(), Some(MatchKind::Exact));
    assert_eq!(detector.store().len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_identical_bytes_found_by_perceptual_lookup_are_exact() {
    let detector = DuplicateDetector::new(BlindExactStore::default());
    let image = receipt_png(21);

    let first = detector.check(&image, &Submission::new()).await.unwrap();
    assert!(!first.is_duplicate());

    let second = detector.check(&image, &Submission::new()).await.unwrap();
    assert_eq!(second.kind(), Some(MatchKind::Exact));
    assert_eq!(second.hamming_distance(), Some(0));
    assert_eq!(second.confidence(), Some(1.0));
    assert_eq!(second.matched().map(|r| r.id), first.summary().stored.map(|r| r.id));
    assert_eq!(detector.store().len().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_identical_submissions_store_one_record() {
    let detector = Arc::new(DuplicateDetector::new(MemoryHashStore::new()));
    let image = Arc::new(receipt_png(7));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let detector = Arc::clone(&detector);
            let image = Arc::clone(&image);
            tokio::spawn(async move { detector.check(&image, &Submission::new()).await })
        })
        .collect();

    let mut unique = 0;
    for handle in handles {
        let verdict = handle.await.unwrap().unwrap();
        if verdict.is_duplicate() {
            assert_eq!(
                verdict.kind(),
                Some(MatchKind::Exact),
                "Identical bytes must never be reported as similar"
            );
        } else {
            unique += 1;
        }
    }

    assert_eq!(unique, 1, "Exactly one submission should be accepted as new");
    assert_eq!(detector.store().len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_corrupt_image_aborts_without_insert() {
    let detector = DuplicateDetector::new(MemoryHashStore::new());
    let mut corrupt = receipt_png(8);
    corrupt.truncate(100);

    let err = detector.check(&corrupt, &Submission::new()).await.unwrap_err();

    assert!(matches!(err, Error::PerceptualHash(_)));
    assert!(err.is_hashing_failure());
    assert_eq!(detector.store().len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_empty_buffer_is_invalid_input() {
    let detector = DuplicateDetector::new(CountingStore::default());

    let err = detector.check(&[], &Submission::new()).await.unwrap_err();

    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(
        detector.store().exact_lookups.load(Ordering::SeqCst),
        0,
        "Invalid input never reaches the store"
    );
}

#[tokio::test]
async fn test_store_failure_is_propagated() {
    let detector = DuplicateDetector::new(UnavailableStore);

    let err = detector
        .check(&receipt_png(9), &Submission::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::StoreUnavailable(_)));
    assert!(!err.is_hashing_failure());
}

#[tokio::test]
async fn test_timeout_abandons_check_without_insert() {
    let detector = DuplicateDetector::with_config(
        MemoryHashStore::new(),
        SlowHasher,
        DetectorConfig::default(),
    );

    let err = detector
        .check_with_timeout(&receipt_png(10), &Submission::new(), Duration::from_millis(20))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout(_)));
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(detector.store().len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_new_record_carries_provenance_and_metadata() {
    let detector = DuplicateDetector::new(MemoryHashStore::new());
    let image = receipt_png(11);
    let submission = Submission::new()
        .with_image_url("https://blobs.example/receipt-11.png")
        .with_provenance(Provenance {
            transaction_id: Some("tx-42".into()),
            message_id: Some("wamid.123".into()),
            ..Provenance::default()
        })
        .with_max_hamming_distance(3);

    let verdict = detector.check(&image, &submission).await.unwrap();

    let DuplicateVerdict::Unique { record } = verdict else {
        panic!("Expected a new record");
    };
    assert_eq!(record.cryptographic_hash, hasher::sha256_hash(&image).unwrap());
    assert_eq!(
        record.image_url.as_deref(),
        Some("https://blobs.example/receipt-11.png")
    );
    assert_eq!(record.provenance.transaction_id.as_deref(), Some("tx-42"));
    assert_eq!(record.provenance.user_id, None);
    assert_eq!(record.metadata.image_size, Some(image.len()));
    assert_eq!(record.metadata.threshold, Some(3));
    assert_eq!(
        record.metadata.hash_algorithm_version,
        Some(hasher::HASH_ALGORITHM_VERSION)
    );
    assert_eq!(
        record.metadata.detection_method.as_deref(),
        Some(hasher::DETECTION_METHOD)
    );
}

#[tokio::test]
async fn test_zero_hash_permits_still_progress() {
    let detector = DuplicateDetector::with_config(
        MemoryHashStore::new(),
        ReceiptHasher,
        DetectorConfig {
            max_concurrent_hashes: 0,
        },
    );

    let verdict = detector
        .check(&receipt_png(12), &Submission::new())
        .await
        .unwrap();
    assert!(!verdict.is_duplicate());
}

#[tokio::test]
async fn test_verdict_summary_json_shape() {
    let detector = DuplicateDetector::new(MemoryHashStore::new());
    let image = receipt_png(13);

    let first = detector.check(&image, &Submission::new()).await.unwrap();
    let json = serde_json::to_value(first.summary()).unwrap();
    assert_eq!(json["isDuplicate"], false);
    assert!(json.get("kind").is_none());
    assert!(json.get("stored").is_some());

    let second = detector.check(&image, &Submission::new()).await.unwrap();
    let json = serde_json::to_value(second.summary()).unwrap();
    assert_eq!(json["isDuplicate"], true);
    assert_eq!(json["kind"], "exact");
    assert_eq!(json["hammingDistance"], 0);
    assert_eq!(json["confidence"], 1.0);
    assert_eq!(json["confidenceBand"], "Very High");
    assert!(json["match"]["cryptographicHash"].is_string());
}
