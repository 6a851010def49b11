use std::path::PathBuf;

use async_trait::async_trait;
use console::style;

use super::{Command, SUCCESS_PREFIX, WARNING_PREFIX};
use crate::error::{Error, Result};
use crate::services::detector::{DuplicateDetector, DuplicateVerdict, Submission};
use crate::services::store::JsonFileHashStore;

/// Runs a single duplicate check against the store file.
pub struct Checker {
    image: PathBuf,
    store: PathBuf,
    submission: Submission,
    json: bool,
    quiet: bool,
}

impl Checker {
    pub fn new(
        image: PathBuf,
        store: PathBuf,
        submission: Submission,
        json: bool,
        quiet: bool,
    ) -> Self {
        Self {
            image,
            store,
            submission,
            json,
            quiet,
        }
    }

    /// Checks the image and returns the verdict without printing it.
    pub async fn run(&self) -> Result<DuplicateVerdict> {
        if !self.image.exists() {
            return Err(Error::PathNotFound(self.image.clone()));
        }

        let bytes = tokio::fs::read(&self.image).await?;
        let store = JsonFileHashStore::open(&self.store).await?;
        let detector = DuplicateDetector::new(store);

        log::info!("Checking {:?} against {:?}", self.image, self.store);
        detector.check(&bytes, &self.submission).await
    }
}

#[async_trait]
impl Command for Checker {
    async fn execute(&self) -> Result<()> {
        let verdict = self.run().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&verdict.summary())?);
            return Ok(());
        }
        if self.quiet {
            return Ok(());
        }

        match &verdict {
            DuplicateVerdict::Unique { record } => println!(
                "{} New receipt, stored as record {}",
                style(SUCCESS_PREFIX).green().bold(),
                style(record.id).cyan()
            ),
            DuplicateVerdict::Exact { record } => println!(
                "{} {} exact duplicate of record {} (first seen {})",
                style(WARNING_PREFIX).red().bold(),
                style("[EXACT]").cyan().bold(),
                style(record.id).cyan(),
                record.created_at.to_rfc3339()
            ),
            DuplicateVerdict::Similar {
                record,
                hamming_distance,
                confidence,
            } => println!(
                "{} {} similar to record {} (distance {}, confidence {:.2} - {})",
                style(WARNING_PREFIX).yellow().bold(),
                style("[SIMILAR]").yellow().bold(),
                style(record.id).cyan(),
                hamming_distance,
                confidence,
                style(crate::services::confidence::describe(*confidence)).bold()
            ),
        }

        Ok(())
    }
}
