//! Checksum validation for migrations
//!
//! SHA-256 of the migration SQL, recorded when applied and compared on
//! every later open to detect edits to already-applied migrations.

use sha2::{Digest, Sha256};

/// Compute the hex SHA-256 of a string
pub fn compute_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_checksum() {
        let checksum = compute_checksum("SELECT 1");
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, compute_checksum("SELECT 1"));
        assert_ne!(checksum, compute_checksum("SELECT 2"));
    }
}
