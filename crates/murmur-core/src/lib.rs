//! murmur-core: types shared by the relay and the client
//!
//! - [`protocol`]: outer [`Envelope`] frames and decrypted [`InnerMessage`]s
//! - [`config`]: the `murmur.toml` schema
//! - [`error`]: crate-wide error enums

pub mod config;
pub mod error;
pub mod protocol;

pub use config::{ClientConfig, MurmurConfig, RelayConfig, TransferConfig};
pub use error::{CryptoError, MurmurError, MurmurResult, RoutingError};
pub use protocol::{
    Action, ClientId, Envelope, FileComplete, FileControl, FileStart, FileVolume, ImagePayload,
    InnerMessage, KeyShare, ManifestEntry, RoomId, Route,
};
