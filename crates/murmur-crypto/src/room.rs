//! Room keys: (room name, password) → room key + public room id
//!
//! ```text
//! salt    = SHA-256("murmur-room-salt" || u32le(len(name)) || name)[..16]
//! stretch = Argon2id(password, salt, m=8 MiB, t=2, p=1) → 32 bytes
//! key     = HKDF-SHA256(stretch, info="murmur-room-key")
//! room_id = hex(HKDF-SHA256(stretch, info="murmur-room-id"))
//! ```
//!
//! The Argon2id parameters are part of the protocol: every client in a room
//! must use the same ones or they will derive different keys.

use argon2::{Algorithm, Argon2, Params, Version};
use murmur_core::{CryptoError, RoomId};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::keys::{hkdf_derive, SymmetricKey};
use crate::KEY_SIZE;

pub const ARGON2_MEM_COST_KIB: u32 = 8192;
pub const ARGON2_TIME_COST: u32 = 2;
pub const ARGON2_PARALLELISM: u32 = 1;

const SALT_DOMAIN: &[u8] = b"murmur-room-salt";
const KEY_INFO: &[u8] = b"murmur-room-key";
const ID_INFO: &[u8] = b"murmur-room-id";

/// Both outputs of one derivation, so Argon2id only runs once per join.
#[derive(Debug, Clone)]
pub struct RoomSecrets {
    pub key: SymmetricKey,
    pub id: RoomId,
}

impl RoomSecrets {
    pub fn derive(name: &str, password: &str) -> Result<Self, CryptoError> {
        let stretched = stretch(name, password)?;
        let key = SymmetricKey::from_bytes(hkdf_derive(stretched.as_slice(), KEY_INFO)?);
        let id_bytes = hkdf_derive(stretched.as_slice(), ID_INFO)?;
        let id = RoomId::parse(&hex::encode(id_bytes))
            .ok_or_else(|| CryptoError::KeyDerivation("room id is not 64 hex chars".into()))?;
        Ok(Self { key, id })
    }
}

pub fn derive_room_key(name: &str, password: &str) -> Result<SymmetricKey, CryptoError> {
    Ok(RoomSecrets::derive(name, password)?.key)
}

pub fn derive_room_id(name: &str, password: &str) -> Result<RoomId, CryptoError> {
    Ok(RoomSecrets::derive(name, password)?.id)
}

fn room_salt(name: &str) -> [u8; 16] {
    let mut hasher = Sha256::new();
    hasher.update(SALT_DOMAIN);
    hasher.update((name.len() as u32).to_le_bytes());
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    let mut salt = [0u8; 16];
    salt.copy_from_slice(&digest[..16]);
    salt
}

fn stretch(name: &str, password: &str) -> Result<Zeroizing<[u8; KEY_SIZE]>, CryptoError> {
    let params = Params::new(
        ARGON2_MEM_COST_KIB,
        ARGON2_TIME_COST,
        ARGON2_PARALLELISM,
        Some(KEY_SIZE),
    )
    .map_err(|e| CryptoError::KeyDerivation(format!("invalid Argon2id params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut out = Zeroizing::new([0u8; KEY_SIZE]);
    argon2
        .hash_password_into(password.as_bytes(), &room_salt(name), &mut out[..])
        .map_err(|e| CryptoError::KeyDerivation(format!("Argon2id failed: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = RoomSecrets::derive("lobby", "hunter2").unwrap();
        let b = RoomSecrets::derive("lobby", "hunter2").unwrap();
        assert_eq!(a.key, b.key);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_different_password_different_key() {
        let a = RoomSecrets::derive("lobby", "hunter2").unwrap();
        let b = RoomSecrets::derive("lobby", "hunter3").unwrap();
        assert_ne!(a.key, b.key);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_different_name_different_key() {
        let a = derive_room_key("lobby", "pw").unwrap();
        let b = derive_room_key("lobby2", "pw").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_name_is_length_framed() {
        assert_ne!(room_salt("ab"), room_salt("a"));
        assert_ne!(
            derive_room_id("ab", "c").unwrap(),
            derive_room_id("a", "bc").unwrap()
        );
    }

    #[test]
    fn test_empty_password_allowed() {
        let secrets = RoomSecrets::derive("open-room", "").unwrap();
        assert_eq!(secrets.id.as_str().len(), 64);
    }

    #[test]
    fn test_room_id_is_not_the_key() {
        let secrets = RoomSecrets::derive("lobby", "pw").unwrap();
        assert_ne!(secrets.id.as_str(), secrets.key.to_hex());
    }

    #[test]
    fn test_helpers_agree_with_combined() {
        let secrets = RoomSecrets::derive("x", "y").unwrap();
        assert_eq!(derive_room_key("x", "y").unwrap(), secrets.key);
        assert_eq!(derive_room_id("x", "y").unwrap(), secrets.id);
    }
}
