//! murmur-crypto: client-side and relay-side cryptography for murmur
//!
//! Every frame carries two envelopes sealed with the same codec:
//!
//! ```text
//! wire = base64(iv) | base64(AES-256-CBC(zero_pad(json))) | hex(HMAC-SHA256(mac_key, iv|ct))
//!
//! outer: transport key (random 32 bytes, RSA-OAEP wrapped to the relay, one per connection)
//! inner: room key      (Argon2id(password, salt(name)) → HKDF "murmur-room-key")
//!        pairwise key  (X25519 between two clients → HKDF "murmur-pairwise")
//! ```
//!
//! The relay only ever holds transport keys.

pub mod envelope;
pub mod keys;
pub mod padding;
pub mod peer;
pub mod room;
pub mod transport;

pub use envelope::EnvelopeCodec;
pub use keys::SymmetricKey;
pub use peer::PeerKeyPair;
pub use room::{derive_room_id, derive_room_key, RoomSecrets};
pub use transport::{wrap_transport_secret, RelayKeyPair};

/// Size of every symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// AES block and IV size
pub const BLOCK_SIZE: usize = 16;
