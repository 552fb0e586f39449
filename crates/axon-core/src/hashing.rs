//! Streaming SHA256 digests for packages and downloaded files.

use crate::error::{AxonError, IoResultExt, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Chunk size for reading files (8MB).
const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Digest and byte length of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// SHA256 as lowercase hex.
    pub sha256: String,
    pub size: u64,
}

/// Compute the SHA256 digest and size of a file in one pass.
pub fn compute_sha256(path: impl AsRef<Path>) -> Result<FileDigest> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path).with_path(path)?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut size: u64 = 0;

    loop {
        let bytes_read = file.read(&mut buffer).with_path(path)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
        size += bytes_read as u64;
    }

    Ok(FileDigest {
        sha256: hex::encode(hasher.finalize()),
        size,
    })
}

/// Compute the digest on the blocking pool.
pub async fn compute_sha256_async(path: impl AsRef<Path>) -> Result<FileDigest> {
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || compute_sha256(&path))
        .await
        .map_err(|e| AxonError::Other(format!("Hash computation task failed: {}", e)))?
}

/// SHA256 of an in-memory buffer as lowercase hex.
pub fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Case-insensitive comparison of two hex digests.
pub fn digests_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

/// Verify a file's SHA256 against an expected hex digest.
pub fn verify_sha256(path: impl AsRef<Path>, expected: &str) -> Result<()> {
    let actual = compute_sha256(path)?.sha256;
    if digests_match(expected, &actual) {
        Ok(())
    } else {
        Err(AxonError::ChecksumMismatch {
            expected: expected.trim().to_lowercase(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let digest = compute_sha256(file.path()).unwrap();
        assert_eq!(digest.sha256, EMPTY_SHA256);
        assert_eq!(digest.size, 0);
    }

    #[test]
    fn test_bytes_and_file_agree() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"Hello, World!").unwrap();
        file.flush().unwrap();

        let digest = compute_sha256(file.path()).unwrap();
        assert_eq!(digest.sha256, sha256_bytes(b"Hello, World!"));
        assert_eq!(digest.size, 13);
    }

    #[test]
    fn test_verify_is_case_insensitive() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"test content").unwrap();
        file.flush().unwrap();

        let expected = sha256_bytes(b"test content").to_uppercase();
        assert!(verify_sha256(file.path(), &expected).is_ok());
    }

    #[test]
    fn test_single_byte_corruption_flips_verification() {
        let original = vec![7u8; 4096];
        let expected = sha256_bytes(&original);

        let mut corrupted = original.clone();
        corrupted[2048] ^= 0x01;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&corrupted).unwrap();
        file.flush().unwrap();

        match verify_sha256(file.path(), &expected) {
            Err(AxonError::ChecksumMismatch { expected: e, actual }) => {
                assert_eq!(e, expected);
                assert_ne!(actual, expected);
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_async_matches_sync() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&vec![1u8; 100_000]).unwrap();
        file.flush().unwrap();

        let sync = compute_sha256(file.path()).unwrap();
        let async_digest = compute_sha256_async(file.path()).await.unwrap();
        assert_eq!(sync, async_digest);
    }
}
