use async_trait::async_trait;
use tokio::sync::RwLock;

use super::HashStore;
use super::index::RecordIndex;
use crate::error::Result;
use crate::services::record::{ImageHashRecord, NewImageHashRecord, SimilarityMatch};

/// Process-local hash store. Contents are lost when it is dropped.
#[derive(Debug, Default)]
pub struct MemoryHashStore {
    index: RwLock<RecordIndex>,
}

impl MemoryHashStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with previously exported records.
    pub fn from_records(records: Vec<ImageHashRecord>) -> Result<Self> {
        Ok(Self {
            index: RwLock::new(RecordIndex::from_records(records)?),
        })
    }
}

#[async_trait]
impl HashStore for MemoryHashStore {
    async fn exact_lookup(&self, cryptographic_hash: &str) -> Result<Option<ImageHashRecord>> {
        Ok(self.index.read().await.get(cryptographic_hash).cloned())
    }

    async fn nearest_lookup(
        &self,
        perceptual_hash: &str,
        max_hamming_distance: u32,
        limit: usize,
    ) -> Result<Vec<SimilarityMatch>> {
        self.index
            .read()
            .await
            .nearest(perceptual_hash, max_hamming_distance, limit)
    }

    async fn insert(&self, record: NewImageHashRecord) -> Result<ImageHashRecord> {
        let record = self.index.write().await.insert(record)?;
        log::debug!(
            "Stored record {} for {}",
            record.id,
            record.cryptographic_hash
        );
        Ok(record)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.index.read().await.len())
    }

    async fn records(&self) -> Result<Vec<ImageHashRecord>> {
        Ok(self.index.read().await.records().to_vec())
    }
}
