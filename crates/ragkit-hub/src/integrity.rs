use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{HubError, HubResult};

/// SHA-256 hex digest of a file, streamed so multi-gigabyte weight shards
/// never have to fit in memory.
pub fn sha256_file(path: &Path) -> HubResult<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Check `path` against an expected SHA-256 hex string (case-insensitive).
pub fn verify_integrity(path: &Path, expected_sha256: &str) -> HubResult<()> {
    let actual = sha256_file(path)?;
    debug!(path = %path.display(), expected = expected_sha256, actual = %actual, "Verifying file integrity");
    if actual.eq_ignore_ascii_case(expected_sha256) {
        return Ok(());
    }
    Err(HubError::IntegrityMismatch {
        file: path.display().to_string(),
        expected: expected_sha256.to_string(),
        actual,
    })
}
