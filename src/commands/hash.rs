use std::path::PathBuf;

use async_trait::async_trait;
use console::style;
use serde::Serialize;

use super::Command;
use crate::error::{Error, Result};
use crate::services::hasher;

/// Both fingerprints of one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprints {
    pub cryptographic_hash: String,
    pub perceptual_hash: String,
    pub hash_algorithm_version: u32,
}

/// Prints an image's hashes without touching any store.
pub struct Fingerprinter {
    image: PathBuf,
    json: bool,
}

impl Fingerprinter {
    pub fn new(image: PathBuf, json: bool) -> Self {
        Self { image, json }
    }

    pub async fn fingerprints(&self) -> Result<Fingerprints> {
        if !self.image.exists() {
            return Err(Error::PathNotFound(self.image.clone()));
        }

        let bytes = tokio::fs::read(&self.image).await?;
        let cryptographic_hash = hasher::sha256_hash(&bytes)?;
        let perceptual_hash = tokio::task::spawn_blocking(move || hasher::perceptual_hash(&bytes))
            .await
            .map_err(|e| Error::PerceptualHash(format!("Hashing task failed: {}", e)))??;

        Ok(Fingerprints {
            cryptographic_hash,
            perceptual_hash,
            hash_algorithm_version: hasher::HASH_ALGORITHM_VERSION,
        })
    }
}

#[async_trait]
impl Command for Fingerprinter {
    async fn execute(&self) -> Result<()> {
        let fingerprints = self.fingerprints().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&fingerprints)?);
        } else {
            println!("{}", style(self.image.display()).bold());
            println!("  sha256: {}", style(&fingerprints.cryptographic_hash).cyan());
            println!(
                "  phash:  {} (v{})",
                style(&fingerprints.perceptual_hash).yellow(),
                fingerprints.hash_algorithm_version
            );
        }

        Ok(())
    }
}
