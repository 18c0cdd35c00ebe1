//! Archive fingerprint calculation.
//!
//! This module provides SHA256 checksum calculation for release archives.

use crate::error::{ErrorExt, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Calculates the SHA256 checksum of a file.
///
/// Reads the file in 8KB chunks to handle large files efficiently.
///
/// # Arguments
///
/// * `file_path` - Path to file to hash
///
/// # Returns
///
/// * `Ok(String)` - Lowercase hex-encoded SHA-256 hash (64 characters)
/// * `Err` - If file cannot be read
pub async fn calculate_sha256(file_path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(file_path)
        .await
        .fs_context("opening file for hashing", file_path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .fs_context("reading file for hash calculation", file_path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
