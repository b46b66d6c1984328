//! Envelope codec: AES-256-CBC + HMAC-SHA256, encrypt-then-MAC
//!
//! Wire format (all ASCII):
//! ```text
//! base64(iv) "|" base64(ciphertext) "|" hex(mac)
//! mac = HMAC-SHA256(mac_key, base64(iv) "|" base64(ciphertext))
//! ```
//! where `mac_key` is the 64 ASCII bytes of `hex(SHA-256(hex(key) + "mac"))`.
//! The plaintext is JSON, zero-padded to the block size.

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use murmur_core::CryptoError;
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::keys::SymmetricKey;
use crate::padding::{pad, unpad};
use crate::BLOCK_SIZE;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Seals and opens envelopes under one key. The MAC key is derived once.
#[derive(Clone)]
pub struct EnvelopeCodec {
    key: SymmetricKey,
    mac_key: Zeroizing<String>,
}

impl EnvelopeCodec {
    pub fn new(key: SymmetricKey) -> Self {
        let mac_key = Zeroizing::new(derive_mac_key(&key));
        Self { key, mac_key }
    }

    pub fn key(&self) -> &SymmetricKey {
        &self.key
    }

    /// Serialize `value` to JSON and seal it.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<String, CryptoError> {
        let json = serde_json::to_vec(value).map_err(|e| CryptoError::Json(e.to_string()))?;
        self.seal(&json)
    }

    /// Open an envelope and parse its JSON payload.
    pub fn decode<T: DeserializeOwned>(&self, wire: &str) -> Result<T, CryptoError> {
        let plaintext = self.open(wire)?;
        serde_json::from_slice(&plaintext).map_err(|e| CryptoError::Json(e.to_string()))
    }

    /// Seal raw bytes. Callers should pass text that does not end in NUL.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let padded = Zeroizing::new(pad(plaintext));

        let mut iv = [0u8; BLOCK_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new_from_slices(self.key.as_bytes(), &iv)
            .map_err(|e| CryptoError::Decrypt(format!("cipher init: {e}")))?
            .encrypt_padded_vec_mut::<NoPadding>(&padded);

        let payload = format!("{}|{}", STANDARD.encode(iv), STANDARD.encode(&ciphertext));
        let mac = self.mac(payload.as_bytes())?.finalize().into_bytes();
        Ok(format!("{payload}|{}", hex::encode(mac)))
    }

    /// Verify and decrypt an envelope. The MAC is checked before any
    /// decryption is attempted.
    pub fn open(&self, wire: &str) -> Result<Vec<u8>, CryptoError> {
        let fields: Vec<&str> = wire.split('|').collect();
        let [iv_b64, ct_b64, mac_hex] = fields.as_slice() else {
            return Err(CryptoError::MalformedEnvelope(fields.len()));
        };

        // Only the canonical lowercase form is accepted
        if !mac_hex
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(CryptoError::MacMismatch);
        }
        let payload_len = iv_b64.len() + 1 + ct_b64.len();
        let tag = hex::decode(mac_hex).map_err(|_| CryptoError::MacMismatch)?;
        self.mac(&wire.as_bytes()[..payload_len])?
            .verify_slice(&tag)
            .map_err(|_| CryptoError::MacMismatch)?;

        let iv = STANDARD
            .decode(iv_b64)
            .map_err(|e| CryptoError::Base64(format!("iv: {e}")))?;
        let ciphertext = STANDARD
            .decode(ct_b64)
            .map_err(|e| CryptoError::Base64(format!("ciphertext: {e}")))?;

        if iv.len() != BLOCK_SIZE {
            return Err(CryptoError::Decrypt(format!(
                "IV is {} bytes, expected {BLOCK_SIZE}",
                iv.len()
            )));
        }
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CryptoError::Decrypt(format!(
                "ciphertext length {} is not a non-empty multiple of {BLOCK_SIZE}",
                ciphertext.len()
            )));
        }

        let padded = Zeroizing::new(
            Aes256CbcDec::new_from_slices(self.key.as_bytes(), &iv)
                .map_err(|e| CryptoError::Decrypt(format!("cipher init: {e}")))?
                .decrypt_padded_vec_mut::<NoPadding>(&ciphertext)
                .map_err(|e| CryptoError::Decrypt(e.to_string()))?,
        );
        Ok(unpad(&padded).to_vec())
    }

    fn mac(&self, payload: &[u8]) -> Result<HmacSha256, CryptoError> {
        let mut mac = HmacSha256::new_from_slice(self.mac_key.as_bytes())
            .map_err(|e| CryptoError::KeyDerivation(format!("HMAC init: {e}")))?;
        mac.update(payload);
        Ok(mac)
    }
}

impl std::fmt::Debug for EnvelopeCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeCodec")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// `hex(SHA-256(hex(key) + "mac"))`. The hex string itself is the HMAC key.
fn derive_mac_key(key: &SymmetricKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.to_hex().as_bytes());
    hasher.update(b"mac");
    hex::encode(hasher.finalize())
}
