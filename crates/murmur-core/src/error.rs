use thiserror::Error;

pub type MurmurResult<T> = Result<T, MurmurError>;

/// Failures decoding or producing encrypted material. The receiver discards
/// the offending message and keeps the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("malformed envelope: expected 3 fields, got {0}")]
    MalformedEnvelope(usize),

    #[error("envelope MAC mismatch")]
    MacMismatch,

    #[error("base64 decode: {0}")]
    Base64(String),

    #[error("decrypt: {0}")]
    Decrypt(String),

    #[error("payload JSON: {0}")]
    Json(String),

    #[error("RSA: {0}")]
    Rsa(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("key derivation: {0}")]
    KeyDerivation(String),
}

/// Private sends that cannot be addressed. Returned to the caller before
/// anything hits the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("no shared secret with peer {0}; key exchange has not completed")]
    NoSharedSecret(String),

    #[error("peer {0} is not in this room")]
    UnknownPeer(String),

    #[error("not in a room")]
    NotInRoom,
}

#[derive(Debug, Error)]
pub enum MurmurError {
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("integrity check failed for {file_id}: expected {expected}, got {actual}")]
    Integrity {
        file_id: String,
        expected: String,
        actual: String,
    },

    #[error("compression error: {0}")]
    Compression(String),

    #[error("transfer error: {0}")]
    Transfer(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MurmurError {
    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::Transfer(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}
