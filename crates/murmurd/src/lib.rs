//! murmurd: zero-knowledge WebSocket relay
//!
//! The relay terminates only the transport layer. Each connection wraps a
//! random secret to the relay's RSA key; the relay decodes outer frames with
//! it, routes them by room membership, and re-encodes them for each recipient
//! with the recipient's own secret. Room and pairwise keys never reach it.
//!
//! - [`connection`]: handshake state machine and socket tasks
//! - [`hub`]: the actor that owns routing state
//! - [`router`]: membership and routing rules
//! - [`server`]: axum wiring for `/ws`, `/healthz`, `/metrics`

pub mod connection;
pub mod hub;
pub mod metrics;
pub mod router;
pub mod server;

pub use connection::{ConnectionState, Handshake};
pub use router::{ChannelRouter, Delivery, DropReason};
pub use server::{run, BoundRelay, RelayState};
