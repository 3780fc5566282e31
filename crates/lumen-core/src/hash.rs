//! SHA-256 digests for downloaded weight files

use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// A SHA-256 content hash.
///
/// Recorded when a model or adapter file is fetched so that the log carries
/// the exact bytes a prediction ran with.
#[derive(Clone, Copy, Hash, Eq, PartialEq)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Compute a hash from bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Compute a hash from a file, streaming it in chunks.
    ///
    /// Model weights run to several gigabytes, so the file is never read
    /// into memory whole.
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 1 << 20];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hasher.finalize().into()))
    }

    /// Get the hash as a hex string
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Get the hash as a prefixed hex string (e.g., "sha256:abcdef...")
    pub fn to_prefixed_hex(&self) -> String {
        format!("sha256:{}", self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        let h = ContentHash::from_bytes(b"hello");
        assert_eq!(
            h.to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(h.to_string(), "2cf24dba5fb0a30e");
    }

    #[test]
    fn test_file_matches_bytes() {
        let path = std::env::temp_dir().join(format!(
            "lumen_hash_test_{}.bin",
            std::process::id()
        ));
        let data: Vec<u8> = (0..3_000_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let from_file = ContentHash::from_file(&path).unwrap();
        assert_eq!(from_file, ContentHash::from_bytes(&data));
        assert!(from_file.to_prefixed_hex().starts_with("sha256:"));

        std::fs::remove_file(&path).ok();
    }
}
