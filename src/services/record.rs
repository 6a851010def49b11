//! Stored hash records and the provenance carried with them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Optional identifiers describing where a submitted image came from.
///
/// None of these take part in matching; they are kept for audit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    /// Transaction the receipt was submitted for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    /// Payment reference quoted by the submitter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
    /// User who submitted the image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Message the image was attached to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl Provenance {
    /// Returns `true` when no identifier is set.
    pub fn is_empty(&self) -> bool {
        self.transaction_id.is_none()
            && self.payment_reference.is_none()
            && self.user_id.is_none()
            && self.message_id.is_none()
    }
}

/// Extensible metadata stored alongside a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    /// Size of the submitted image in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size: Option<usize>,
    /// Tag describing how the hashes were produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_method: Option<String>,
    /// Hamming threshold in force when the record was inserted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,
    /// Version of the perceptual hash pipeline that produced `perceptual_hash`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_algorithm_version: Option<u32>,
    /// Caller-defined fields.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Fields supplied by the caller when inserting a record.
///
/// The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewImageHashRecord {
    pub cryptographic_hash: String,
    pub perceptual_hash: String,
    pub image_url: Option<String>,
    pub provenance: Provenance,
    pub metadata: RecordMetadata,
}

/// One entry per distinct image ever accepted by the detector.
///
/// Records are immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageHashRecord {
    /// Store-assigned identifier, increasing with insertion order.
    pub id: u64,
    /// Hex SHA-256 digest of the raw image bytes.
    pub cryptographic_hash: String,
    /// Hex-encoded perceptual hash bits.
    pub perceptual_hash: String,
    /// Location of the stored original, if the caller keeps one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: RecordMetadata,
}

impl ImageHashRecord {
    pub(crate) fn from_new(id: u64, created_at: DateTime<Utc>, new: NewImageHashRecord) -> Self {
        Self {
            id,
            cryptographic_hash: new.cryptographic_hash,
            perceptual_hash: new.perceptual_hash,
            image_url: new.image_url,
            provenance: new.provenance,
            created_at,
            metadata: new.metadata,
        }
    }
}

/// A stored record together with its distance from a query hash.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatch {
    pub record: ImageHashRecord,
    pub hamming_distance: u32,
}
