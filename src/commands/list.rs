use std::path::PathBuf;

use async_trait::async_trait;
use console::style;

use super::{Command, INFO_PREFIX};
use crate::error::Result;
use crate::services::store::{HashStore, JsonFileHashStore};

/// Prints every stored record in insertion order.
pub struct Lister {
    store: PathBuf,
    json: bool,
}

impl Lister {
    pub fn new(store: PathBuf, json: bool) -> Self {
        Self { store, json }
    }
}

#[async_trait]
impl Command for Lister {
    async fn execute(&self) -> Result<()> {
        let store = JsonFileHashStore::open(&self.store).await?;
        let records = store.records().await?;
        log::debug!("Listing {} records from {:?}", records.len(), self.store);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&records)?);
            return Ok(());
        }

        if records.is_empty() {
            println!(
                "{} No records in: {}",
                style(INFO_PREFIX).blue().bold(),
                style(self.store.display()).cyan()
            );
            return Ok(());
        }

        for record in &records {
            println!(
                "{:>5}  {}  {}  {}",
                style(record.id).bold(),
                record.created_at.format("%Y-%m-%d %H:%M:%S"),
                style(short_hash(&record.cryptographic_hash)).cyan(),
                style(&record.perceptual_hash).yellow()
            );
            if let Some(url) = &record.image_url {
                println!("       {}", url);
            }
        }
        println!("{} records", style(records.len()).cyan().bold());

        Ok(())
    }
}

// Utils

/// First 16 characters of a hex hash; hand-edited stores may hold anything.
fn short_hash(hash: &str) -> &str {
    hash.get(..16).unwrap_or(hash)
}
