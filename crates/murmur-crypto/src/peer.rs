//! Pairwise keys between two clients via X25519.
//!
//! Each client holds one [`PeerKeyPair`] per connection. Public keys are
//! exchanged inside room-encrypted `key_share` messages, so the relay never
//! sees them. Both sides compute the same key:
//! `HKDF-SHA256(ikm = X25519(a, B), info = "murmur-pairwise")`.

use base64::{engine::general_purpose::STANDARD, Engine};
use murmur_core::CryptoError;
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::keys::{hkdf_derive, SymmetricKey};

const PAIRWISE_INFO: &[u8] = b"murmur-pairwise";

pub struct PeerKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl PeerKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.public.as_bytes())
    }

    /// Derive the pairwise key with a peer's base64 public key.
    ///
    /// Low-order points yield an all-zero shared secret and are rejected.
    pub fn derive_shared(&self, remote_b64: &str) -> Result<SymmetricKey, CryptoError> {
        let raw = STANDARD
            .decode(remote_b64)
            .map_err(|e| CryptoError::InvalidPublicKey(format!("base64: {e}")))?;
        let bytes: [u8; 32] = raw.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidPublicKey(format!("expected 32 bytes, got {}", raw.len()))
        })?;
        self.derive_shared_raw(&PublicKey::from(bytes))
    }

    pub fn derive_shared_raw(&self, remote: &PublicKey) -> Result<SymmetricKey, CryptoError> {
        let shared = self.secret.diffie_hellman(remote);
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidPublicKey(
                "non-contributory X25519 public key".into(),
            ));
        }
        Ok(SymmetricKey::from_bytes(hkdf_derive(
            shared.as_bytes(),
            PAIRWISE_INFO,
        )?))
    }
}

impl std::fmt::Debug for PeerKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerKeyPair")
            .field("public", &self.public_key_base64())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ecdh_symmetry() {
        let alice = PeerKeyPair::generate();
        let bob = PeerKeyPair::generate();

        let ab = alice.derive_shared(&bob.public_key_base64()).unwrap();
        let ba = bob.derive_shared(&alice.public_key_base64()).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_distinct_pairs_distinct_keys() {
        let alice = PeerKeyPair::generate();
        let bob = PeerKeyPair::generate();
        let carol = PeerKeyPair::generate();

        let ab = alice.derive_shared(&bob.public_key_base64()).unwrap();
        let ac = alice.derive_shared(&carol.public_key_base64()).unwrap();
        assert_ne!(ab, ac);
    }

    #[test]
    fn test_low_order_point_rejected() {
        let alice = PeerKeyPair::generate();
        let zero = STANDARD.encode([0u8; 32]);
        assert!(matches!(
            alice.derive_shared(&zero),
            Err(CryptoError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn test_malformed_public_key() {
        let alice = PeerKeyPair::generate();
        assert!(alice.derive_shared("%%%").is_err());
        assert!(alice.derive_shared(&STANDARD.encode([1u8; 16])).is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let kp = PeerKeyPair::generate();
        assert!(format!("{kp:?}").contains("REDACTED"));
    }
}
