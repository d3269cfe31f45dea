//! Content digests for change detection.
//!
//! Files are streamed through the digest in fixed-size chunks so large
//! assets never load fully into memory.

use crate::error::Result;
use std::fmt;
use std::path::Path;
use tokio::io::AsyncReadExt;

const CHUNK_SIZE: usize = 64 * 1024;

/// Digest algorithm used for manifest hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum HashAlgo {
    /// Fast cryptographic hash (default).
    Blake3,
    /// Faster non-cryptographic hash; fine when the remote is trusted.
    Xxh3,
}

impl HashAlgo {
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgo::Blake3 => "blake3",
            HashAlgo::Xxh3 => "xxh3",
        }
    }
}

impl fmt::Display for HashAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Streams the file through `algo` and returns the lowercase hex digest.
///
/// I/O errors propagate; an unreadable file is a hard failure, not a
/// "changed" signal.
pub async fn compute_hash(path: &Path, algo: HashAlgo) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut buf = vec![0u8; CHUNK_SIZE];

    match algo {
        HashAlgo::Blake3 => {
            let mut hasher = blake3::Hasher::new();
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(hex::encode(hasher.finalize().as_bytes()))
        }
        HashAlgo::Xxh3 => {
            let mut hasher = xxhash_rust::xxh3::Xxh3::new();
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(format!("{:016x}", hasher.digest()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blake3_matches_direct_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello world").unwrap();

        let streamed = compute_hash(&path, HashAlgo::Blake3).await.unwrap();
        let direct = hex::encode(blake3::hash(b"hello world").as_bytes());
        assert_eq!(streamed, direct);
    }

    #[tokio::test]
    async fn test_xxh3_is_16_hex_chars() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello world").unwrap();

        let digest = compute_hash(&path, HashAlgo::Xxh3).await.unwrap();
        assert_eq!(digest.len(), 16);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_different_content_different_hash() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, b"xxxxxxxxxx").unwrap();
        std::fs::write(&b, b"yyyyyyyyyy").unwrap();

        let ha = compute_hash(&a, HashAlgo::Blake3).await.unwrap();
        let hb = compute_hash(&b, HashAlgo::Blake3).await.unwrap();
        assert_ne!(ha, hb);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(compute_hash(&missing, HashAlgo::Blake3).await.is_err());
    }
}
