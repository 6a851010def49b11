//! Duplicate detection service.
//!
//! Implements a two-stage check for an incoming receipt image:
//! 1. **Fast path**: SHA256 digest looked up in the store (exact re-submission)
//! 2. **Slow path**: Perceptual hash nearest-neighbour lookup (re-saved or resized copy)
//!
//! The slow path decodes the image, so it only runs when the fast path misses.
//! An image that survives both stages is recorded as new.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;

use super::confidence::{self, ConfidenceBand};
use super::hasher::{self, ImageHasher, ReceiptHasher};
use super::record::{ImageHashRecord, NewImageHashRecord, Provenance, RecordMetadata};
use super::store::HashStore;
use crate::error::{Error, Result};

/// Hamming distance at or below which two perceptual hashes count as the same image.
pub const DEFAULT_MAX_HAMMING_DISTANCE: u32 = 5;

/// Default number of perceptual hashes computed concurrently.
pub const DEFAULT_MAX_CONCURRENT_HASHES: usize = 4;

/// Process-wide detector settings.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Upper bound on concurrent CPU-bound perceptual hashing jobs.
    pub max_concurrent_hashes: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_hashes: DEFAULT_MAX_CONCURRENT_HASHES,
        }
    }
}

/// Per-call parameters of a duplicate check.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Where the caller stored the original, recorded for audit.
    pub image_url: Option<String>,
    pub provenance: Provenance,
    /// Largest perceptual distance still reported as a duplicate.
    pub max_hamming_distance: u32,
}

impl Default for Submission {
    fn default() -> Self {
        Self {
            image_url: None,
            provenance: Provenance::default(),
            max_hamming_distance: DEFAULT_MAX_HAMMING_DISTANCE,
        }
    }
}

impl Submission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    pub fn with_max_hamming_distance(mut self, max_hamming_distance: u32) -> Self {
        self.max_hamming_distance = max_hamming_distance;
        self
    }
}

/// How a duplicate was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Byte-identical to a stored image.
    Exact,
    /// Visually similar to a stored image.
    Similar,
}

/// Outcome of a duplicate check.
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateVerdict {
    /// No match; the image has been stored as a new record.
    Unique { record: ImageHashRecord },
    /// The exact bytes were seen before.
    Exact { record: ImageHashRecord },
    /// A visually similar image was seen before.
    Similar {
        record: ImageHashRecord,
        hamming_distance: u32,
        confidence: f64,
    },
}

impl DuplicateVerdict {
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, DuplicateVerdict::Unique { .. })
    }

    pub fn kind(&self) -> Option<MatchKind> {
        match self {
            DuplicateVerdict::Unique { .. } => None,
            DuplicateVerdict::Exact { .. } => Some(MatchKind::Exact),
            DuplicateVerdict::Similar { .. } => Some(MatchKind::Similar),
        }
    }

    /// The previously stored record this image matched.
    pub fn matched(&self) -> Option<&ImageHashRecord> {
        match self {
            DuplicateVerdict::Unique { .. } => None,
            DuplicateVerdict::Exact { record } | DuplicateVerdict::Similar { record, .. } => {
                Some(record)
            }
        }
    }

    pub fn confidence(&self) -> Option<f64> {
        match self {
            DuplicateVerdict::Unique { .. } => None,
            DuplicateVerdict::Exact { .. } => Some(1.0),
            DuplicateVerdict::Similar { confidence, .. } => Some(*confidence),
        }
    }

    pub fn confidence_band(&self) -> Option<ConfidenceBand> {
        self.confidence().map(confidence::describe)
    }

    pub fn hamming_distance(&self) -> Option<u32> {
        match self {
            DuplicateVerdict::Unique { .. } => None,
            DuplicateVerdict::Exact { .. } => Some(0),
            DuplicateVerdict::Similar {
                hamming_distance, ..
            } => Some(*hamming_distance),
        }
    }

    /// Flattened, serializable view of the verdict.
    pub fn summary(&self) -> VerdictSummary {
        VerdictSummary {
            is_duplicate: self.is_duplicate(),
            kind: self.kind(),
            matched: self.matched().cloned(),
            confidence: self.confidence(),
            confidence_band: self.confidence_band(),
            hamming_distance: self.hamming_distance(),
            stored: match self {
                DuplicateVerdict::Unique { record } => Some(record.clone()),
                _ => None,
            },
        }
    }
}

/// JSON shape of a verdict handed to callers outside the crate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictSummary {
    pub is_duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<MatchKind>,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub matched: Option<ImageHashRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_band: Option<ConfidenceBand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hamming_distance: Option<u32>,
    /// Record created for a new image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored: Option<ImageHashRecord>,
}

/// Checks incoming images against a [`HashStore`] and records new ones.
///
/// Each call is independent; the detector holds no per-check state and does
/// not serialize concurrent checks. The store's unique key on the
/// cryptographic hash is what prevents two records for the same bytes.
pub struct DuplicateDetector<S, H = ReceiptHasher> {
    store: S,
    hasher: Arc<H>,
    hash_permits: Arc<Semaphore>,
}

impl<S: HashStore> DuplicateDetector<S> {
    /// Creates a detector with the default hasher and settings.
    pub fn new(store: S) -> Self {
        Self::with_config(store, ReceiptHasher, DetectorConfig::default())
    }
}

impl<S: HashStore, H: ImageHasher> DuplicateDetector<S, H> {
    pub fn with_config(store: S, hasher: H, config: DetectorConfig) -> Self {
        Self {
            store,
            hasher: Arc::new(hasher),
            hash_permits: Arc::new(Semaphore::new(config.max_concurrent_hashes.max(1))),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs the two-stage duplicate check on `image`.
    ///
    /// Hashing failures abort the check before anything is written. A lost
    /// insert race on the same bytes is reported as an exact duplicate.
    pub async fn check(&self, image: &[u8], submission: &Submission) -> Result<DuplicateVerdict> {
        let max_distance = submission.max_hamming_distance;
        let cryptographic_hash = self.hasher.cryptographic_hash(image)?;
        log::debug!("Checking image {} ({} bytes)", cryptographic_hash, image.len());
        if submission.provenance.is_empty() {
            log::debug!("No provenance supplied for {}", cryptographic_hash);
        }

        if let Some(record) = self.store.exact_lookup(&cryptographic_hash).await? {
            log::info!(
                "Exact duplicate of record {} ({})",
                record.id,
                cryptographic_hash
            );
            return Ok(DuplicateVerdict::Exact { record });
        }

        let perceptual_hash = self.perceptual_hash(image).await?;
        log::debug!("Perceptual hash {} for {}", perceptual_hash, cryptographic_hash);

        let closest = self
            .store
            .nearest_lookup(&perceptual_hash, max_distance, 1)
            .await?
            .into_iter()
            .next();

        if let Some(candidate) = closest.filter(|c| c.hamming_distance <= max_distance) {
            // Committed by a concurrent check after our exact lookup missed.
            if candidate.record.cryptographic_hash == cryptographic_hash {
                log::info!(
                    "Exact duplicate of record {} found by perceptual lookup ({})",
                    candidate.record.id,
                    cryptographic_hash
                );
                return Ok(DuplicateVerdict::Exact {
                    record: candidate.record,
                });
            }

            let confidence = confidence::score(candidate.hamming_distance, max_distance);
            log::info!(
                "Similar to record {} at distance {} (confidence {:.2}, {})",
                candidate.record.id,
                candidate.hamming_distance,
                confidence,
                confidence::describe(confidence)
            );
            return Ok(DuplicateVerdict::Similar {
                record: candidate.record,
                hamming_distance: candidate.hamming_distance,
                confidence,
            });
        }

        let new_record = NewImageHashRecord {
            cryptographic_hash,
            perceptual_hash,
            image_url: submission.image_url.clone(),
            provenance: submission.provenance.clone(),
            metadata: RecordMetadata {
                image_size: Some(image.len()),
                detection_method: Some(hasher::DETECTION_METHOD.to_string()),
                threshold: Some(max_distance),
                hash_algorithm_version: Some(hasher::HASH_ALGORITHM_VERSION),
                ..RecordMetadata::default()
            },
        };

        match self.store.insert(new_record).await {
            Ok(record) => {
                log::info!("New image stored as record {}", record.id);
                Ok(DuplicateVerdict::Unique { record })
            }
            Err(Error::DuplicateCryptographicHash(hash)) => {
                log::warn!("Lost insert race for {}, re-reading stored record", hash);
                match self.store.exact_lookup(&hash).await? {
                    Some(record) => Ok(DuplicateVerdict::Exact { record }),
                    None => Err(Error::DuplicateCryptographicHash(hash)),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// [`check`](Self::check) bounded by `deadline`.
    ///
    /// On expiry the check is abandoned. Nothing is written before the final
    /// insert, and the insert itself is atomic, so no partial record remains.
    pub async fn check_with_timeout(
        &self,
        image: &[u8],
        submission: &Submission,
        deadline: Duration,
    ) -> Result<DuplicateVerdict> {
        tokio::time::timeout(deadline, self.check(image, submission))
            .await
            .map_err(|_| Error::Timeout(deadline))?
    }

    /// Computes the perceptual hash on the blocking pool, bounded by the semaphore.
    async fn perceptual_hash(&self, image: &[u8]) -> Result<String> {
        let _permit = self
            .hash_permits
            .acquire()
            .await
            .map_err(|e| Error::PerceptualHash(format!("Hashing pool closed: {}", e)))?;

        let hasher = Arc::clone(&self.hasher);
        let bytes = image.to_vec();
        tokio::task::spawn_blocking(move || hasher.perceptual_hash(&bytes))
            .await
            .map_err(|e| Error::PerceptualHash(format!("Hashing task failed: {}", e)))?
    }
}
