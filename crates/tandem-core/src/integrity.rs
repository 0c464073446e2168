//! Content hashing.
//!
//! Two digests are used throughout tandem:
//! - [`ContentHash`] (SHA-256, lowercase hex) names files on disk: state
//!   files, cached tarballs, packager directories.
//! - [`Integrity`] (SHA-512, subresource-integrity form) is what npm records
//!   in `package-lock.json` for every tarball it installs.

use base64::prelude::{Engine as _, BASE64_STANDARD};
use sha2::{Digest, Sha256, Sha512};

/// A content hash (SHA-256 hex digest).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Compute the SHA-256 hash of the given data.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let result = hasher.finalize();
        ContentHash(hex_encode(&result))
    }

    /// Get the hex string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `len` hex characters, for use in directory names.
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encode bytes as lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A subresource-integrity string such as `sha512-<base64>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Integrity(String);

impl Integrity {
    /// Compute the SHA-512 integrity of the given data.
    pub fn compute(data: &[u8]) -> Self {
        let digest = Sha512::digest(data);
        Integrity(format!("sha512-{}", BASE64_STANDARD.encode(digest)))
    }

    /// Wrap an integrity string read from a lockfile.
    pub fn from_string(value: impl Into<String>) -> Self {
        Integrity(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this integrity covers the given data.
    ///
    /// Lockfiles may list several space-separated hashes; any SHA-512 entry
    /// that matches is enough.
    pub fn matches(&self, other: &Integrity) -> bool {
        self.0
            .split_whitespace()
            .any(|entry| other.0.split_whitespace().any(|o| o == entry))
    }
}

impl std::fmt::Display for Integrity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_deterministic() {
        let data = b"hello world";
        assert_eq!(ContentHash::compute(data), ContentHash::compute(data));
    }

    #[test]
    fn hash_format() {
        let hash = ContentHash::compute(b"");
        // SHA-256 of empty is well-known
        assert_eq!(
            hash.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(hash.short(8), "e3b0c442");
        assert_eq!(hash.short(100).len(), 64);
    }

    #[test]
    fn integrity_format() {
        let integrity = Integrity::compute(b"");
        assert_eq!(
            integrity.as_str(),
            "sha512-z4PhNX7vuL3xVChQ1m2AB9Yg5AULVxXcg/SpIdNs6c5H0NE8XYXysP+DGNKHfuwvY7kxvUdBeoGlODJ6+SfaPg=="
        );
    }

    #[test]
    fn integrity_matches_any_listed_hash() {
        let actual = Integrity::compute(b"tarball");
        let recorded = Integrity::from_string(format!("sha1-deadbeef {}", actual));
        assert!(recorded.matches(&actual));
        assert!(!Integrity::compute(b"other").matches(&actual));
    }
}
