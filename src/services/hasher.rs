//! Hashing utilities for duplicate detection.
//!
//! This module provides two types of hashing:
//! - **Cryptographic (SHA256)**: For detecting byte-identical re-submissions
//! - **Perceptual (pHash)**: For detecting re-saved, resized or screenshotted copies
//!
//! Perceptual hashes are only comparable when produced by the same pipeline.
//! The normalization constants below are part of that pipeline: changing any of
//! them requires bumping [`HASH_ALGORITHM_VERSION`] and migrating stored records.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use image_hasher::{HashAlg, HasherConfig};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Edge length of the square canonical image every input is resized to.
pub const CANONICAL_EDGE: u32 = 256;

/// JPEG quality used when re-encoding the canonical image.
pub const CANONICAL_JPEG_QUALITY: u8 = 85;

/// Side length of the pHash grid; the hash has `HASH_GRID * HASH_GRID` bits.
const HASH_GRID: u32 = 8;

/// Bit length of every perceptual hash produced by this pipeline.
pub const PERCEPTUAL_HASH_BITS: usize = (HASH_GRID * HASH_GRID) as usize;

/// Version tag stored with each record's perceptual hash.
pub const HASH_ALGORITHM_VERSION: u32 = 1;

/// Tag stored in record metadata describing how the hashes were produced.
pub const DETECTION_METHOD: &str = "sha256+phash";

/// Source of the two fingerprints the detector needs.
///
/// [`ReceiptHasher`] is the production implementation; the trait exists so a
/// detector can be driven with an instrumented hasher.
pub trait ImageHasher: Send + Sync + 'static {
    /// Hex digest identifying the exact byte sequence.
    fn cryptographic_hash(&self, image: &[u8]) -> Result<String>;

    /// Hex-encoded perceptual hash of the normalized image.
    fn perceptual_hash(&self, image: &[u8]) -> Result<String>;
}

/// Default hasher: SHA-256 plus a DCT perceptual hash over a canonical image.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiptHasher;

impl ImageHasher for ReceiptHasher {
    fn cryptographic_hash(&self, image: &[u8]) -> Result<String> {
        sha256_hash(image)
    }

    fn perceptual_hash(&self, image: &[u8]) -> Result<String> {
        perceptual_hash(image)
    }
}

/// Computes the SHA256 hash of an image buffer.
///
/// This is used for detecting exact duplicates (byte-identical files).
pub fn sha256_hash(image: &[u8]) -> Result<String> {
    if image.is_empty() {
        return Err(Error::InvalidInput("image buffer is empty".into()));
    }

    let mut hasher = Sha256::new();
    hasher.update(image);
    let result = hasher.finalize();
    Ok(format!("{:x}", result))
}

/// Decodes an image and reduces it to the canonical form fed to the hasher.
///
/// The image is resized to `CANONICAL_EDGE` x `CANONICAL_EDGE`, stripped to
/// luminance, then passed through a JPEG round-trip at a fixed quality so that
/// copies saved with different codecs converge before hashing.
pub fn normalize(image: &[u8]) -> Result<DynamicImage> {
    if image.is_empty() {
        return Err(Error::InvalidInput("image buffer is empty".into()));
    }

    let decoded = image::load_from_memory(image)
        .map_err(|e| Error::PerceptualHash(format!("Failed to decode image: {}", e)))?;

    let gray = decoded
        .resize_exact(CANONICAL_EDGE, CANONICAL_EDGE, FilterType::Triangle)
        .to_luma8();

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, CANONICAL_JPEG_QUALITY)
        .encode_image(&gray)
        .map_err(|e| Error::PerceptualHash(format!("Failed to re-encode image: {}", e)))?;

    image::load_from_memory_with_format(&encoded, ImageFormat::Jpeg)
        .map_err(|e| Error::PerceptualHash(format!("Failed to reload canonical image: {}", e)))
}

/// Computes the perceptual hash (pHash) of an image buffer.
///
/// The result is a hex string of exactly `PERCEPTUAL_HASH_BITS / 4` characters.
pub fn perceptual_hash(image: &[u8]) -> Result<String> {
    let canonical = normalize(image)?;

    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::Mean)
        .hash_size(HASH_GRID, HASH_GRID)
        .preproc_dct()
        .to_hasher();

    let hash = hasher.hash_image(&canonical);
    let bytes = hash.as_bytes();
    if bytes.len() * 8 != PERCEPTUAL_HASH_BITS {
        return Err(Error::PerceptualHash(format!(
            "expected a {}-bit hash, got {} bits",
            PERCEPTUAL_HASH_BITS,
            bytes.len() * 8
        )));
    }

    Ok(hex::encode(bytes))
}

/// Parses a hex-encoded perceptual hash back into its bits.
pub fn decode_perceptual_hash(hash: &str) -> Result<Vec<u8>> {
    let bytes = hex::decode(hash)
        .map_err(|e| Error::InvalidInput(format!("Invalid perceptual hash {:?}: {}", hash, e)))?;
    if bytes.is_empty() {
        return Err(Error::InvalidInput("perceptual hash is empty".into()));
    }
    Ok(bytes)
}

/// Calculates the Hamming distance between two perceptual hashes.
///
/// Returns `None` when the hashes have different lengths, since such hashes
/// come from incompatible pipelines and cannot be compared.
pub fn hamming_distance(hash1: &[u8], hash2: &[u8]) -> Option<u32> {
    if hash1.len() != hash2.len() {
        return None;
    }

    Some(
        hash1
            .iter()
            .zip(hash2)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum(),
    )
}

/// Checks if the bytes look like an image format the decoder understands.
pub fn is_supported_format(image: &[u8]) -> bool {
    image::guess_format(image).is_ok()
}
