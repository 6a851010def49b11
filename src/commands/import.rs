use std::path::{Path, PathBuf};

use async_trait::async_trait;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use walkdir::WalkDir;

use super::{Command, INFO_PREFIX, SUCCESS_PREFIX, WARNING_PREFIX};
use crate::error::{Error, Result};
use crate::services::detector::{DuplicateDetector, DuplicateVerdict, Submission};
use crate::services::hasher;
use crate::services::store::JsonFileHashStore;

/// Counts produced by an import run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    /// Files considered, including skipped ones.
    pub total_files: usize,
    /// Images stored as new records.
    pub new: usize,
    /// Images matching a stored record byte for byte.
    pub exact: usize,
    /// Images visually similar to a stored record.
    pub similar: usize,
    /// Files not recognised as images.
    pub skipped: usize,
    /// Images that could not be hashed or stored.
    pub errors: usize,
}

impl ImportReport {
    pub fn duplicate_count(&self) -> usize {
        self.exact + self.similar
    }
}

/// Seeds the store by checking every image under a directory.
///
/// Files are processed one at a time in path order, so a copy inside the
/// directory is reported against whichever file sorts first.
pub struct Importer {
    path: PathBuf,
    store: PathBuf,
    recursive: bool,
    include_hidden: bool,
    max_hamming_distance: u32,
    quiet: bool,
}

impl Importer {
    pub fn new(
        path: PathBuf,
        store: PathBuf,
        recursive: bool,
        include_hidden: bool,
        max_hamming_distance: u32,
        quiet: bool,
    ) -> Self {
        Self {
            path,
            store,
            recursive,
            include_hidden,
            max_hamming_distance,
            quiet,
        }
    }

    pub async fn run(&self) -> Result<ImportReport> {
        log::info!("Starting import of directory: {:?}", self.path);
        log::debug!(
            "Path: {:?}, recursive: {}, include_hidden: {}, store: {:?}, max distance: {}",
            self.path,
            self.recursive,
            self.include_hidden,
            self.store,
            self.max_hamming_distance
        );

        let files = list_files(&self.path, self.recursive, self.include_hidden)?;
        log::info!("Found {} files to import", files.len());

        let mut report = ImportReport {
            total_files: files.len(),
            ..ImportReport::default()
        };
        if files.is_empty() {
            return Ok(report);
        }

        let detector = DuplicateDetector::new(JsonFileHashStore::open(&self.store).await?);

        let progress_bar = if !self.quiet {
            let pb = ProgressBar::new(files.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            pb.set_message("Importing...");
            Some(pb)
        } else {
            None
        };

        for path in &files {
            let bytes = match tokio::fs::read(path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("Could not read {:?}: {}", path, e);
                    report.errors += 1;
                    advance(&progress_bar);
                    continue;
                }
            };

            if !hasher::is_supported_format(&bytes) {
                log::debug!("Skipping non-image file: {:?}", path);
                report.skipped += 1;
                advance(&progress_bar);
                continue;
            }

            let submission = Submission::new()
                .with_image_url(path.to_string_lossy())
                .with_max_hamming_distance(self.max_hamming_distance);

            match detector.check(&bytes, &submission).await {
                Ok(DuplicateVerdict::Unique { .. }) => report.new += 1,
                Ok(DuplicateVerdict::Exact { record }) => {
                    log::info!("{:?} is an exact duplicate of record {}", path, record.id);
                    report.exact += 1;
                }
                Ok(DuplicateVerdict::Similar {
                    record,
                    hamming_distance,
                    ..
                }) => {
                    log::info!(
                        "{:?} is similar to record {} (distance {})",
                        path,
                        record.id,
                        hamming_distance
                    );
                    report.similar += 1;
                }
                Err(e) if e.is_hashing_failure() => {
                    log::warn!("Could not hash {:?}: {}", path, e);
                    report.errors += 1;
                }
                Err(e) => return Err(e),
            }
            advance(&progress_bar);
        }

        if let Some(pb) = progress_bar {
            pb.finish_and_clear();
        }

        log::info!(
            "Import complete: {} new, {} exact, {} similar, {} skipped, {} errors",
            report.new,
            report.exact,
            report.similar,
            report.skipped,
            report.errors
        );
        Ok(report)
    }
}

#[async_trait]
impl Command for Importer {
    async fn execute(&self) -> Result<()> {
        let report = self.run().await?;
        print_report(&report, &self.store, self.quiet);
        Ok(())
    }
}

fn advance(progress_bar: &Option<ProgressBar>) {
    if let Some(pb) = progress_bar {
        pb.inc(1);
    }
}

fn print_report(report: &ImportReport, store: &Path, quiet: bool) {
    if quiet {
        return;
    }

    println!();
    println!("{}", style("=== Receipt Import Report ===").bold().cyan());
    println!("Total files: {}", style(report.total_files).cyan());
    println!("Skipped (not images): {}", report.skipped);
    println!("Errors encountered: {}", report.errors);
    println!();

    if report.total_files == 0 {
        println!("{} No files found to import.", style(INFO_PREFIX).blue().bold());
        return;
    }

    println!(
        "{} {} new receipts stored in {}",
        style(SUCCESS_PREFIX).green().bold(),
        style(report.new).cyan().bold(),
        style(store.display()).cyan()
    );
    if report.duplicate_count() > 0 {
        println!(
            "{} {} duplicates ({} exact, {} similar)",
            style(WARNING_PREFIX).yellow().bold(),
            style(report.duplicate_count()).bold(),
            style(report.exact).cyan(),
            style(report.similar).yellow()
        );
    }
}

// Utils

fn list_files(path: &Path, recursive: bool, include_hidden: bool) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(Error::PathNotFound(path.to_path_buf()));
    }

    let mut files = Vec::new();

    let walker = if recursive {
        WalkDir::new(path)
    } else {
        WalkDir::new(path).max_depth(1)
    };

    let walker = walker
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || include_hidden || !is_hidden(e));

    for entry in walker {
        let entry = entry?;

        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}
