//! In-process record index shared by the store backends.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::services::hasher;
use crate::services::record::{ImageHashRecord, NewImageHashRecord, SimilarityMatch};

/// Records in insertion order plus a unique index on the cryptographic hash.
#[derive(Debug, Default)]
pub(crate) struct RecordIndex {
    records: Vec<ImageHashRecord>,
    by_cryptographic_hash: HashMap<String, usize>,
    next_id: u64,
}

impl RecordIndex {
    /// Rebuilds an index from persisted records.
    ///
    /// Records are ordered by id; a repeated cryptographic hash is rejected.
    pub(crate) fn from_records(mut records: Vec<ImageHashRecord>) -> Result<Self> {
        records.sort_by_key(|r| r.id);

        let mut index = Self::default();
        for record in records {
            if index
                .by_cryptographic_hash
                .contains_key(&record.cryptographic_hash)
            {
                return Err(Error::DuplicateCryptographicHash(record.cryptographic_hash));
            }
            index.next_id = record.id + 1;
            index
                .by_cryptographic_hash
                .insert(record.cryptographic_hash.clone(), index.records.len());
            index.records.push(record);
        }

        Ok(index)
    }

    pub(crate) fn get(&self, cryptographic_hash: &str) -> Option<&ImageHashRecord> {
        self.by_cryptographic_hash
            .get(cryptographic_hash)
            .map(|&position| &self.records[position])
    }

    /// Linear scan over every record, closest first, ties in insertion order.
    pub(crate) fn nearest(
        &self,
        perceptual_hash: &str,
        max_hamming_distance: u32,
        limit: usize,
    ) -> Result<Vec<SimilarityMatch>> {
        if limit == 0 {
            return Err(Error::InvalidInput("limit must be at least 1".into()));
        }
        let query = hasher::decode_perceptual_hash(perceptual_hash)?;

        let mut incompatible = 0usize;
        let mut candidates: Vec<(u32, usize)> = Vec::new();

        for (position, record) in self.records.iter().enumerate() {
            let distance = hasher::decode_perceptual_hash(&record.perceptual_hash)
                .ok()
                .and_then(|stored| hasher::hamming_distance(&query, &stored));

            match distance {
                Some(d) if d <= max_hamming_distance => candidates.push((d, position)),
                Some(_) => {}
                None => incompatible += 1,
            }
        }

        if incompatible > 0 {
            log::warn!(
                "Skipped {} records with perceptual hashes incompatible with {}",
                incompatible,
                perceptual_hash
            );
        }

        // Stable sort keeps insertion order between equal distances.
        candidates.sort_by_key(|&(distance, _)| distance);
        candidates.truncate(limit);

        Ok(candidates
            .into_iter()
            .map(|(hamming_distance, position)| SimilarityMatch {
                record: self.records[position].clone(),
                hamming_distance,
            })
            .collect())
    }

    pub(crate) fn insert(&mut self, new: NewImageHashRecord) -> Result<ImageHashRecord> {
        if new.cryptographic_hash.is_empty() {
            return Err(Error::InvalidInput("cryptographic hash is empty".into()));
        }
        hasher::decode_perceptual_hash(&new.perceptual_hash)?;

        if self
            .by_cryptographic_hash
            .contains_key(&new.cryptographic_hash)
        {
            return Err(Error::DuplicateCryptographicHash(new.cryptographic_hash));
        }

        let record = ImageHashRecord::from_new(self.next_id, self.next_timestamp(), new);
        self.next_id += 1;
        self.by_cryptographic_hash
            .insert(record.cryptographic_hash.clone(), self.records.len());
        self.records.push(record.clone());

        Ok(record)
    }

    /// Undoes the most recent insert. Used when persisting it failed.
    pub(crate) fn rollback_last(&mut self) {
        if let Some(record) = self.records.pop() {
            self.by_cryptographic_hash.remove(&record.cryptographic_hash);
            self.next_id = record.id;
        }
    }

    pub(crate) fn records(&self) -> &[ImageHashRecord] {
        &self.records
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// `created_at` never goes backwards, even if the wall clock does.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.records.last() {
            Some(last) if last.created_at >= now => {
                last.created_at + chrono::Duration::microseconds(1)
            }
            _ => now,
        }
    }
}
