//! SHA-256 content hashing, hex encoded
//!
//! The sender hashes the uncompressed bytes (or the whole archive); the
//! receiver recomputes after inflating and refuses to hand out bytes that
//! do not match.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of a byte slice (64 chars).
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        assert_eq!(
            hash_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_empty() {
        assert_eq!(
            hash_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
