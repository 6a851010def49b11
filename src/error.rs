//! Error types for the receipt-guard engine.
//!
//! This module provides a unified error type [`Error`] and a convenient
//! [`Result`] type alias used throughout the crate.

use std::path::PathBuf;
use std::time::Duration;

/// A type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the crate.
///
/// Hashing failures and store failures are kept as distinct variants so that
/// callers can tell "could not verify" apart from "verified, not a duplicate".
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The caller supplied unusable input (empty image buffer, malformed hash).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The image could not be decoded or normalized for perceptual hashing.
    #[error("Perceptual hash error: {0}")]
    PerceptualHash(String),

    /// A record with this cryptographic hash already exists in the store.
    #[error("Duplicate cryptographic hash: {0}")]
    DuplicateCryptographicHash(String),

    /// The hash store could not be read or written.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The check did not finish before the caller's deadline.
    #[error("Duplicate check timed out after {0:?}")]
    Timeout(Duration),

    /// An I/O error occurred.
    ///
    /// This variant wraps [`std::io::Error`] and is automatically
    /// converted via the `#[from]` attribute.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A store snapshot or report could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error occurred while traversing directories.
    #[error("Directory traversal error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// The specified path does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl Error {
    /// Returns `true` for errors raised while hashing the submitted image.
    ///
    /// These mean the image could not be verified; the submitter should be
    /// asked to resend it.
    pub fn is_hashing_failure(&self) -> bool {
        matches!(self, Error::InvalidInput(_) | Error::PerceptualHash(_))
    }
}
