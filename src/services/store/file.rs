use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::HashStore;
use super::index::RecordIndex;
use crate::error::{Error, Result};
use crate::services::record::{ImageHashRecord, NewImageHashRecord, SimilarityMatch};

/// Version of the snapshot file layout.
const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Deserialize)]
struct Snapshot {
    format_version: u32,
    records: Vec<ImageHashRecord>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    format_version: u32,
    records: &'a [ImageHashRecord],
}

/// Hash store persisted to a single JSON file.
///
/// The whole snapshot is rewritten on every insert through a temporary file
/// and a rename, so readers of the file never observe a partial write. Inserts
/// run on their own task: a caller that abandons an insert midway does not
/// leave the in-memory index and the file out of step.
#[derive(Debug)]
pub struct JsonFileHashStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    index: RwLock<RecordIndex>,
}

impl JsonFileHashStore {
    /// Opens the store at `path`. A missing file yields an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let index = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::StoreUnavailable(format!("Corrupt store {}: {}", path.display(), e))
                })?;
                if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
                    return Err(Error::StoreUnavailable(format!(
                        "Unsupported store format version {} in {}",
                        snapshot.format_version,
                        path.display()
                    )));
                }
                log::debug!(
                    "Loaded {} records from {}",
                    snapshot.records.len(),
                    path.display()
                );
                RecordIndex::from_records(snapshot.records)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No store at {}, starting empty", path.display());
                RecordIndex::default()
            }
            Err(e) => {
                return Err(Error::StoreUnavailable(format!(
                    "Could not read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        Ok(Self {
            inner: Arc::new(Inner {
                path,
                index: RwLock::new(index),
            }),
        })
    }

    /// Returns the path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }
}

impl Inner {
    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn persist(&self, records: &[ImageHashRecord]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&SnapshotRef {
            format_version: SNAPSHOT_FORMAT_VERSION,
            records,
        })?;

        let staging = self.staging_path();
        tokio::fs::write(&staging, &bytes).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }

    async fn insert(&self, record: NewImageHashRecord) -> Result<ImageHashRecord> {
        let mut index = self.index.write().await;
        let record = index.insert(record)?;

        if let Err(e) = self.persist(index.records()).await {
            log::error!(
                "Failed to persist {}, rolling back record {}: {}",
                self.path.display(),
                record.id,
                e
            );
            index.rollback_last();
            let _ = tokio::fs::remove_file(self.staging_path()).await;
            return Err(Error::StoreUnavailable(format!(
                "Could not write {}: {}",
                self.path.display(),
                e
            )));
        }

        log::debug!(
            "Stored record {} for {} in {}",
            record.id,
            record.cryptographic_hash,
            self.path.display()
        );
        Ok(record)
    }
}

#[async_trait]
impl HashStore for JsonFileHashStore {
    async fn exact_lookup(&self, cryptographic_hash: &str) -> Result<Option<ImageHashRecord>> {
        Ok(self.inner.index.read().await.get(cryptographic_hash).cloned())
    }

    async fn nearest_lookup(
        &self,
        perceptual_hash: &str,
        max_hamming_distance: u32,
        limit: usize,
    ) -> Result<Vec<SimilarityMatch>> {
        self.inner
            .index
            .read()
            .await
            .nearest(perceptual_hash, max_hamming_distance, limit)
    }

    async fn insert(&self, record: NewImageHashRecord) -> Result<ImageHashRecord> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.insert(record).await })
            .await
            .map_err(|e| Error::StoreUnavailable(format!("Insert task failed: {}", e)))?
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.inner.index.read().await.len())
    }

    async fn records(&self) -> Result<Vec<ImageHashRecord>> {
        Ok(self.inner.index.read().await.records().to_vec())
    }
}
