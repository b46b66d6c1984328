//! murmur-client: the client half of murmur
//!
//! [`session::ClientSession`] holds everything one connection knows: the
//! transport key, the room key, per-peer pairwise keys and in-flight
//! transfers. [`connector`] wires a session to a relay WebSocket.

pub mod connector;
pub mod session;

pub use connector::{connect, Connection, PeerInfo, SentFiles};
pub use session::{ClientSession, PeerState, SessionEvent};
