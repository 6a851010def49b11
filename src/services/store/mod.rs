//! Persistence for image hash records.
//!
//! A [`HashStore`] offers three operations: exact lookup by cryptographic hash,
//! threshold-bounded nearest lookup by perceptual hash, and insert-if-absent.
//! Two backends are provided:
//! - [`MemoryHashStore`]: process-local, used by tests and embedding callers
//! - [`JsonFileHashStore`]: the same index persisted to a JSON snapshot file

mod file;
mod index;
mod memory;

pub use file::JsonFileHashStore;
pub use memory::MemoryHashStore;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::services::record::{ImageHashRecord, NewImageHashRecord, SimilarityMatch};

/// Durable index over [`ImageHashRecord`]s.
#[async_trait]
pub trait HashStore: Send + Sync {
    /// Returns the record with this cryptographic hash, if any.
    async fn exact_lookup(&self, cryptographic_hash: &str) -> Result<Option<ImageHashRecord>>;

    /// Returns records within `max_hamming_distance` of `perceptual_hash`.
    ///
    /// Results are ordered by ascending distance, ties broken by insertion
    /// order, and truncated to `limit`. Records whose hash length differs from
    /// the query are never returned.
    async fn nearest_lookup(
        &self,
        perceptual_hash: &str,
        max_hamming_distance: u32,
        limit: usize,
    ) -> Result<Vec<SimilarityMatch>>;

    /// Stores a new record.
    ///
    /// Fails with [`Error::DuplicateCryptographicHash`](crate::error::Error::DuplicateCryptographicHash)
    /// if the cryptographic hash is already present.
    async fn insert(&self, record: NewImageHashRecord) -> Result<ImageHashRecord>;

    /// Number of stored records.
    async fn len(&self) -> Result<usize>;

    /// All stored records in insertion order.
    async fn records(&self) -> Result<Vec<ImageHashRecord>>;
}

#[async_trait]
impl<S: HashStore + ?Sized> HashStore for Arc<S> {
    async fn exact_lookup(&self, cryptographic_hash: &str) -> Result<Option<ImageHashRecord>> {
        (**self).exact_lookup(cryptographic_hash).await
    }

    async fn nearest_lookup(
        &self,
        perceptual_hash: &str,
        max_hamming_distance: u32,
        limit: usize,
    ) -> Result<Vec<SimilarityMatch>> {
        (**self)
            .nearest_lookup(perceptual_hash, max_hamming_distance, limit)
            .await
    }

    async fn insert(&self, record: NewImageHashRecord) -> Result<ImageHashRecord> {
        (**self).insert(record).await
    }

    async fn len(&self) -> Result<usize> {
        (**self).len().await
    }

    async fn records(&self) -> Result<Vec<ImageHashRecord>> {
        (**self).records().await
    }
}
