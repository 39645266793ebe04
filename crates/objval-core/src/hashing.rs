//! Streaming file digests for the supported checksum algorithms.
//!
//! Files are read in fixed-size blocks so memory stays bounded regardless of
//! file size.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{Result, ValidatorError};

/// Default block size for streaming reads (64 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 1 << 16;

/// Supported checksum algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// All supported algorithms.
    pub const ALL: [HashAlgorithm; 4] = [Self::Md5, Self::Sha1, Self::Sha256, Self::Sha512];

    /// Strongest first; the order in which BagIt manifests are searched.
    pub const STRONGEST_FIRST: [HashAlgorithm; 4] =
        [Self::Sha512, Self::Sha256, Self::Sha1, Self::Md5];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Length of the hex-encoded digest.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha1 => 40,
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    /// Infer the algorithm from a hex digest by its length.
    ///
    /// Returns `None` for non-hex input or a length that maps to no
    /// supported algorithm. Algorithms sharing a digest length cannot be
    /// told apart; the first entry of the table wins.
    pub fn infer(digest: &str) -> Option<Self> {
        if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Self::ALL.into_iter().find(|alg| alg.hex_len() == digest.len())
    }

    /// Hex digest of `path` using the default block size.
    pub fn hash_file(&self, path: &Path) -> Result<String> {
        self.hash_file_with_block(path, DEFAULT_BLOCK_SIZE)
    }

    /// Hex digest of `path`, streamed in blocks of `block` bytes.
    pub fn hash_file_with_block(&self, path: &Path, block: usize) -> Result<String> {
        match self {
            Self::Md5 => stream_digest::<Md5>(path, block),
            Self::Sha1 => stream_digest::<Sha1>(path, block),
            Self::Sha256 => stream_digest::<Sha256>(path, block),
            Self::Sha512 => stream_digest::<Sha512>(path, block),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = ValidatorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.as_str() == s)
            .ok_or_else(|| ValidatorError::UnsupportedAlgorithm(s.to_string()))
    }
}

fn stream_digest<D: Digest>(path: &Path, block: usize) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; block.max(1)];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_infer_by_length() {
        assert_eq!(HashAlgorithm::infer(&"a".repeat(32)), Some(HashAlgorithm::Md5));
        assert_eq!(HashAlgorithm::infer(&"b".repeat(40)), Some(HashAlgorithm::Sha1));
        assert_eq!(HashAlgorithm::infer(&"c".repeat(64)), Some(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::infer(&"d".repeat(128)), Some(HashAlgorithm::Sha512));
    }

    #[test]
    fn test_infer_rejects_other_lengths() {
        for len in [0, 1, 31, 33, 39, 41, 63, 65, 96, 127, 129, 256] {
            assert_eq!(HashAlgorithm::infer(&"0".repeat(len)), None, "length {len}");
        }
    }

    #[test]
    fn test_infer_rejects_non_hex() {
        let digest = format!("{}xy", "0".repeat(30));
        assert_eq!(digest.len(), 32);
        assert_eq!(HashAlgorithm::infer(&digest), None);
    }

    #[test]
    fn test_known_digests() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, b"abc").expect("write");

        assert_eq!(
            HashAlgorithm::Md5.hash_file(&path).expect("md5"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            HashAlgorithm::Sha1.hash_file(&path).expect("sha1"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            HashAlgorithm::Sha256.hash_file(&path).expect("sha256"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_block_size_does_not_change_digest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.bin");
        let mut file = File::create(&path).expect("create");
        for i in 0..10_000u32 {
            file.write_all(&i.to_le_bytes()).expect("write");
        }
        drop(file);

        let small = HashAlgorithm::Sha512
            .hash_file_with_block(&path, 7)
            .expect("small blocks");
        let large = HashAlgorithm::Sha512.hash_file(&path).expect("default blocks");
        assert_eq!(small, large);
        assert_eq!(small.len(), HashAlgorithm::Sha512.hex_len());
    }

    #[test]
    fn test_from_str_round_trip() {
        for alg in HashAlgorithm::ALL {
            assert_eq!(alg.as_str().parse::<HashAlgorithm>().expect("parse"), alg);
        }
        assert!("crc32".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(HashAlgorithm::Md5.hash_file(&dir.path().join("nope")).is_err());
    }
}
