//! Per-connection lifecycle: handshake, then a reader loop feeding the hub
//! and a writer task draining the connection's FIFO queue.
//!
//! ```text
//! Connected ──k (wrapped secret)──▶ Authenticated ──j──▶ Active ──close──▶ Closed
//!     │                                                            ▲
//!     └── any handshake failure ───────────────────────────────────┘
//! ```

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use murmur_core::{Action, ClientId, Envelope, MurmurError, MurmurResult};
use murmur_crypto::{EnvelopeCodec, RelayKeyPair};
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::hub::HubHandle;
use crate::metrics::RelayMetrics;

/// How long a client may take to answer the hello.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Hello sent, waiting for the wrapped transport secret
    Connected,
    /// Transport key established, not in a room
    Authenticated,
    /// Member of a room
    Active,
    Closed,
}

/// 8 random bytes as 16 lowercase hex chars.
pub fn new_client_id() -> ClientId {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// The relay side of the transport handshake for one socket.
pub struct Handshake {
    id: ClientId,
    keys: Arc<RelayKeyPair>,
    state: ConnectionState,
}

impl Handshake {
    pub fn new(keys: Arc<RelayKeyPair>) -> Self {
        Self {
            id: new_client_id(),
            keys,
            state: ConnectionState::Connected,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Plaintext hello: relay public key and the assigned client id.
    pub fn hello(&self) -> MurmurResult<String> {
        let hello = Envelope::new(Action::Handshake)
            .with_payload(self.keys.public_key_base64())
            .with_client(self.id.clone());
        serde_json::to_string(&hello).map_err(|e| MurmurError::protocol(e.to_string()))
    }

    /// Consume the client's reply. On success returns the connection's codec
    /// and the encrypted ready frame; on any failure the state is Closed.
    pub fn accept(&mut self, frame: &str) -> MurmurResult<(EnvelopeCodec, String)> {
        let result = self.try_accept(frame);
        self.state = if result.is_ok() {
            ConnectionState::Authenticated
        } else {
            ConnectionState::Closed
        };
        result
    }

    fn try_accept(&self, frame: &str) -> MurmurResult<(EnvelopeCodec, String)> {
        if self.state != ConnectionState::Connected {
            return Err(MurmurError::protocol("handshake already processed"));
        }
        let envelope: Envelope = serde_json::from_str(frame)
            .map_err(|e| MurmurError::protocol(format!("handshake frame: {e}")))?;
        if envelope.action != Action::Handshake {
            return Err(MurmurError::protocol(format!(
                "expected handshake, got action {}",
                envelope.action.code()
            )));
        }
        let wrapped = envelope
            .payload
            .ok_or_else(|| MurmurError::protocol("handshake without payload"))?;
        let key = self.keys.unwrap_secret(&wrapped)?;
        let codec = EnvelopeCodec::new(key);
        let ready = codec.encode(&Envelope::new(Action::Ready))?;
        Ok((codec, ready))
    }
}

/// Drive one WebSocket from hello to close.
pub async fn run_connection(
    socket: WebSocket,
    keys: Arc<RelayKeyPair>,
    hub: HubHandle,
    metrics: RelayMetrics,
    outbound_queue: usize,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut handshake = Handshake::new(keys);
    let id = handshake.client_id().to_string();

    let hello = match handshake.hello() {
        Ok(hello) => hello,
        Err(e) => {
            warn!(client = %id, error = %e, "could not build hello");
            return;
        }
    };
    if ws_tx.send(Message::Text(hello.into())).await.is_err() {
        return;
    }

    let reply = match tokio::time::timeout(HANDSHAKE_TIMEOUT, next_text(&mut ws_rx)).await {
        Ok(Some(text)) => text,
        Ok(None) => {
            debug!(client = %id, "closed before handshake");
            return;
        }
        Err(_) => {
            warn!(client = %id, "handshake timed out");
            metrics.handshake_failures.inc();
            let _ = ws_tx.close().await;
            return;
        }
    };

    // RSA decryption is CPU-bound
    let accepted = tokio::task::spawn_blocking(move || {
        let result = handshake.accept(&reply);
        (handshake, result)
    })
    .await;
    let (codec, ready) = match accepted {
        Ok((_, Ok(pair))) => pair,
        Ok((_, Err(e))) => {
            warn!(client = %id, error = %e, "handshake rejected");
            metrics.handshake_failures.inc();
            let _ = ws_tx.close().await;
            return;
        }
        Err(e) => {
            warn!(client = %id, error = %e, "handshake task failed");
            return;
        }
    };

    // Ready goes first in the queue so it precedes any routed frame
    let (out_tx, mut out_rx) = mpsc::channel::<String>(outbound_queue.max(1));
    if out_tx.try_send(ready).is_err() || !hub.register(id.clone(), codec.clone(), out_tx).await {
        return;
    }

    let writer_id = id.clone();
    let writer = tokio::spawn(async move {
        while let Some(wire) = out_rx.recv().await {
            if let Err(e) = ws_tx.send(Message::Text(wire.into())).await {
                debug!(client = %writer_id, error = %e, "write failed");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    while let Some(text) = next_text(&mut ws_rx).await {
        match codec.decode::<Envelope>(&text) {
            Ok(envelope) => {
                if !hub.frame(id.clone(), envelope).await {
                    break;
                }
            }
            Err(e) => {
                warn!(client = %id, error = %e, "dropping undecodable frame");
                metrics.dropped("undecodable");
            }
        }
    }

    hub.unregister(id.clone()).await;
    writer.abort();
    info!(client = %id, "connection closed");
}

/// Next text frame; binary frames are ignored, close or error ends the stream.
async fn next_text<S>(rx: &mut S) -> Option<String>
where
    S: futures::Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(msg) = rx.next().await {
        match msg {
            Ok(Message::Text(text)) => return Some(text.as_str().to_owned()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(Message::Binary(_)) => debug!("ignoring binary frame"),
            Ok(_) => {}
        }
    }
    None
}
