//! The 256-bit symmetric key type shared by all three key layers

use hkdf::Hkdf;
use murmur_core::CryptoError;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// A 256-bit key for the envelope codec. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::KeyDerivation(format!(
                "key must be {KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::from_bytes(arr))
    }

    /// A fresh random key (transport secrets).
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_bytes(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Lowercase hex, the form the MAC key is derived from.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// HKDF-SHA256 (no salt) with a domain-specific info string.
pub(crate) fn hkdf_derive(ikm: &[u8], info: &[u8]) -> Result<[u8; KEY_SIZE], CryptoError> {
    let hkdf = Hkdf::<Sha256>::new(None, ikm);
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(info, &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(format!("HKDF expand failed: {e}")))?;
    Ok(okm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let key = SymmetricKey::from_bytes([0x42; KEY_SIZE]);
        let dbg = format!("{key:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains("42"));
    }

    #[test]
    fn test_hex_is_lowercase() {
        let key = SymmetricKey::from_bytes([0xAB; KEY_SIZE]);
        assert_eq!(key.to_hex(), "ab".repeat(KEY_SIZE));
    }

    #[test]
    fn test_from_slice_length_checked() {
        assert!(SymmetricKey::from_slice(&[0u8; 31]).is_err());
        assert!(SymmetricKey::from_slice(&[0u8; 32]).is_ok());
    }

    #[test]
    fn test_generate_is_random() {
        assert_ne!(SymmetricKey::generate(), SymmetricKey::generate());
    }

    #[test]
    fn test_hkdf_domain_separation() {
        let ikm = [7u8; 32];
        let a = hkdf_derive(&ikm, b"one").unwrap();
        let b = hkdf_derive(&ikm, b"two").unwrap();
        assert_ne!(a, b);
        assert_eq!(a, hkdf_derive(&ikm, b"one").unwrap());
    }
}
