//! SHA-1 / SHA-256 checksums for download verification.
//!
//! Game metadata publishes SHA-1 digests for libraries and assets; mod
//! loaders sometimes publish SHA-256. Both are compared as lowercase hex.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha1::Sha1;
use sha2::{Digest, Sha256};

use super::error::DownloadError;

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// An expected digest.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Checksum {
    Sha1(String),
    Sha256(String),
}

impl Checksum {
    /// Creates an expected SHA-1 digest from hex.
    pub fn sha1(hex: impl AsRef<str>) -> Self {
        Self::Sha1(hex.as_ref().trim().to_ascii_lowercase())
    }

    /// Creates an expected SHA-256 digest from hex.
    pub fn sha256(hex: impl AsRef<str>) -> Self {
        Self::Sha256(hex.as_ref().trim().to_ascii_lowercase())
    }

    /// Returns the algorithm name.
    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::Sha1(_) => "SHA-1",
            Self::Sha256(_) => "SHA-256",
        }
    }

    /// Returns the expected hex digest.
    pub fn expected(&self) -> &str {
        match self {
            Self::Sha1(hex) | Self::Sha256(hex) => hex.as_str(),
        }
    }

    /// Computes this checksum's algorithm over `data`.
    pub fn digest(&self, data: &[u8]) -> String {
        match self {
            Self::Sha1(_) => format!("{:x}", Sha1::digest(data)),
            Self::Sha256(_) => format!("{:x}", Sha256::digest(data)),
        }
    }

    /// Computes this checksum's algorithm over a file's contents.
    pub fn file_digest(&self, path: &Path) -> io::Result<String> {
        match self {
            Self::Sha1(_) => hash_file::<Sha1>(path),
            Self::Sha256(_) => hash_file::<Sha256>(path),
        }
    }

    /// Verifies in-memory data. `name` identifies the data in the error.
    pub fn verify(&self, data: &[u8], name: &str) -> Result<(), DownloadError> {
        let actual = self.digest(data);
        if actual != self.expected() {
            return Err(DownloadError::ChecksumMismatch {
                file: name.to_string(),
                expected: self.expected().to_string(),
                actual,
            });
        }
        Ok(())
    }

    /// Returns true if the file exists and matches.
    ///
    /// A missing or unreadable file does not match.
    pub fn matches_file(&self, path: &Path) -> bool {
        self.file_digest(path)
            .map(|actual| actual == self.expected())
            .unwrap_or(false)
    }
}

fn hash_file<D: Digest>(path: &Path) -> io::Result<String>
where
    sha2::digest::Output<D>: std::fmt::LowerHex,
{
    let mut file = File::open(path)?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HELLO_SHA1: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";
    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_digest_known_values() {
        assert_eq!(Checksum::sha1(HELLO_SHA1).digest(b"hello"), HELLO_SHA1);
        assert_eq!(Checksum::sha256(HELLO_SHA256).digest(b"hello"), HELLO_SHA256);
    }

    #[test]
    fn test_hex_is_normalised() {
        let checksum = Checksum::sha1(format!("  {}\n", HELLO_SHA1.to_uppercase()));
        assert_eq!(checksum.expected(), HELLO_SHA1);
        assert!(checksum.verify(b"hello", "hello.txt").is_ok());
    }

    #[test]
    fn test_verify_mismatch() {
        let err = Checksum::sha1(HELLO_SHA1).verify(b"goodbye", "hello.txt").unwrap_err();
        match err {
            DownloadError::ChecksumMismatch { file, expected, .. } => {
                assert_eq!(file, "hello.txt");
                assert_eq!(expected, HELLO_SHA1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_file_digest_matches_memory_digest() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();

        let checksum = Checksum::sha256(HELLO_SHA256);
        assert_eq!(checksum.file_digest(file.path()).unwrap(), HELLO_SHA256);
        assert!(checksum.matches_file(file.path()));
        assert!(!Checksum::sha1("00").matches_file(file.path()));
    }

    #[test]
    fn test_missing_file_does_not_match() {
        assert!(!Checksum::sha1(HELLO_SHA1).matches_file(Path::new("/nonexistent/file")));
    }
}
