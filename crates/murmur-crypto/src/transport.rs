//! Transport keys: one random 32-byte secret per connection, wrapped to the
//! relay's RSA public key with OAEP-SHA256.
//!
//! The relay advertises its key as base64 SubjectPublicKeyInfo DER in the
//! plaintext hello. The secret only protects the outer envelope of that one
//! connection.

use base64::{engine::general_purpose::STANDARD, Engine};
use murmur_core::CryptoError;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use crate::keys::SymmetricKey;
use crate::KEY_SIZE;

/// The relay's long-lived keypair, generated once at startup.
pub struct RelayKeyPair {
    private: RsaPrivateKey,
    public_b64: String,
}

impl RelayKeyPair {
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::Rsa(format!("key generation: {e}")))?;
        let der = RsaPublicKey::from(&private)
            .to_public_key_der()
            .map_err(|e| CryptoError::Rsa(format!("SPKI encode: {e}")))?;
        let public_b64 = STANDARD.encode(der.as_bytes());
        debug!(bits, "generated relay transport keypair");
        Ok(Self {
            private,
            public_b64,
        })
    }

    /// base64 SPKI DER, as sent in the hello frame.
    pub fn public_key_base64(&self) -> &str {
        &self.public_b64
    }

    /// Recover a client's transport secret. Anything other than exactly
    /// 32 bytes of OAEP plaintext is rejected.
    pub fn unwrap_secret(&self, wrapped_b64: &str) -> Result<SymmetricKey, CryptoError> {
        let ciphertext = STANDARD
            .decode(wrapped_b64)
            .map_err(|e| CryptoError::Base64(format!("wrapped secret: {e}")))?;
        let plaintext = Zeroizing::new(
            self.private
                .decrypt(Oaep::new::<Sha256>(), &ciphertext)
                .map_err(|e| CryptoError::Rsa(format!("OAEP decrypt: {e}")))?,
        );
        if plaintext.len() != KEY_SIZE {
            return Err(CryptoError::Rsa(format!(
                "transport secret is {} bytes, expected {KEY_SIZE}",
                plaintext.len()
            )));
        }
        SymmetricKey::from_slice(&plaintext)
    }
}

impl std::fmt::Debug for RelayKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayKeyPair")
            .field("public", &self.public_b64)
            .field("private", &"[REDACTED]")
            .finish()
    }
}

/// Client side: generate a transport secret and wrap it to the relay key.
///
/// Returns the secret and the base64 ciphertext to send back.
pub fn wrap_transport_secret(
    relay_public_b64: &str,
) -> Result<(SymmetricKey, String), CryptoError> {
    let der = STANDARD
        .decode(relay_public_b64)
        .map_err(|e| CryptoError::Base64(format!("relay public key: {e}")))?;
    let public = RsaPublicKey::from_public_key_der(&der)
        .map_err(|e| CryptoError::InvalidPublicKey(format!("relay SPKI: {e}")))?;

    let secret = SymmetricKey::generate();
    let wrapped = public
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), secret.as_bytes())
        .map_err(|e| CryptoError::Rsa(format!("OAEP encrypt: {e}")))?;
    Ok((secret, STANDARD.encode(wrapped)))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Small modulus keeps key generation fast; OAEP-SHA256 still fits 32 bytes.
    fn relay() -> RelayKeyPair {
        RelayKeyPair::generate(1024).unwrap()
    }

    #[test]
    fn test_wrap_unwrap() {
        let relay = relay();
        let (secret, wrapped) = wrap_transport_secret(relay.public_key_base64()).unwrap();
        let recovered = relay.unwrap_secret(&wrapped).unwrap();
        assert_eq!(secret, recovered);
    }

    #[test]
    fn test_wrong_relay_key_fails() {
        let a = relay();
        let b = relay();
        let (_, wrapped) = wrap_transport_secret(a.public_key_base64()).unwrap();
        assert!(matches!(b.unwrap_secret(&wrapped), Err(CryptoError::Rsa(_))));
    }

    #[test]
    fn test_garbage_rejected() {
        let relay = relay();
        assert!(matches!(
            relay.unwrap_secret("not base64!"),
            Err(CryptoError::Base64(_))
        ));
        assert!(relay.unwrap_secret(&STANDARD.encode([0u8; 128])).is_err());
    }

    #[test]
    fn test_short_secret_rejected() {
        let relay = relay();
        let der = STANDARD.decode(relay.public_key_base64()).unwrap();
        let public = RsaPublicKey::from_public_key_der(&der).unwrap();
        let wrapped = public
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &[9u8; 16])
            .unwrap();
        assert!(relay.unwrap_secret(&STANDARD.encode(wrapped)).is_err());
    }

    #[test]
    fn test_bad_public_key() {
        assert!(wrap_transport_secret("AAAA").is_err());
        assert!(wrap_transport_secret("***").is_err());
    }
}
