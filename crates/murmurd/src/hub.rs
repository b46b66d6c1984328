//! The hub actor: the one task that owns routing state.
//!
//! Connection tasks talk to it over an mpsc channel. Commands are handled one
//! at a time, so membership changes and fan-out are serialized without locks,
//! and every connection's outbound queue receives frames in routing order.

use murmur_core::{Action, ClientId, Envelope};
use murmur_crypto::EnvelopeCodec;
use std::collections::HashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::metrics::RelayMetrics;
use crate::router::{ChannelRouter, Delivery};

pub enum HubCommand {
    /// A connection finished its handshake.
    Register {
        id: ClientId,
        codec: EnvelopeCodec,
        outbound: mpsc::Sender<String>,
    },
    /// A decoded outer frame from a registered connection.
    Frame { id: ClientId, envelope: Envelope },
    /// The socket closed.
    Unregister { id: ClientId },
}

/// Encoder and queue for one connection. Only transport keys live here.
struct Link {
    codec: EnvelopeCodec,
    outbound: mpsc::Sender<String>,
}

pub struct Hub {
    router: ChannelRouter,
    links: HashMap<ClientId, Link>,
    metrics: RelayMetrics,
}

impl Hub {
    pub fn new(metrics: RelayMetrics) -> Self {
        Self {
            router: ChannelRouter::new(),
            links: HashMap::new(),
            metrics,
        }
    }

    pub fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register {
                id,
                codec,
                outbound,
            } => {
                self.router.connect(&id);
                self.links.insert(id.clone(), Link { codec, outbound });
                self.metrics.connections.set(self.links.len() as i64);
                info!(client = %id, "client connected");
            }
            HubCommand::Frame { id, envelope } => {
                let action = envelope.action;
                match self.router.route(&id, envelope) {
                    Ok(deliveries) => {
                        debug!(
                            client = %id,
                            action = action.code(),
                            fanout = deliveries.len(),
                            "routed"
                        );
                        if action == Action::Join {
                            if let Some(room) = self.router.room_of(&id) {
                                info!(client = %id, room = %room.short(), "joined room");
                            }
                        }
                        self.deliver(deliveries);
                    }
                    Err(reason) => {
                        warn!(client = %id, action = action.code(), %reason, "dropping frame");
                        self.metrics.dropped(reason.as_str());
                    }
                }
            }
            HubCommand::Unregister { id } => {
                let deliveries = self.router.disconnect(&id);
                self.links.remove(&id);
                self.deliver(deliveries);
                self.metrics.connections.set(self.links.len() as i64);
                info!(client = %id, "client disconnected");
            }
        }
        self.metrics.rooms.set(self.router.room_count() as i64);
    }

    fn deliver(&self, deliveries: Vec<Delivery>) {
        for Delivery { to, envelope } in deliveries {
            let Some(link) = self.links.get(&to) else {
                continue;
            };
            let action = envelope.action.code();
            let wire = match link.codec.encode(&envelope) {
                Ok(wire) => wire,
                Err(e) => {
                    warn!(client = %to, error = %e, "encode failed");
                    self.metrics.dropped("encode_failed");
                    continue;
                }
            };
            match link.outbound.try_send(wire) {
                Ok(()) => self.metrics.relayed(action),
                Err(TrySendError::Full(_)) => {
                    warn!(client = %to, action, "outbound queue full, frame dropped");
                    self.metrics.dropped("queue_full");
                }
                // Writer already gone; Unregister follows
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }

    pub fn router(&self) -> &ChannelRouter {
        &self.router
    }
}

/// Sender half used by connection tasks.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    pub async fn register(
        &self,
        id: ClientId,
        codec: EnvelopeCodec,
        outbound: mpsc::Sender<String>,
    ) -> bool {
        self.tx
            .send(HubCommand::Register {
                id,
                codec,
                outbound,
            })
            .await
            .is_ok()
    }

    pub async fn frame(&self, id: ClientId, envelope: Envelope) -> bool {
        self.tx.send(HubCommand::Frame { id, envelope }).await.is_ok()
    }

    pub async fn unregister(&self, id: ClientId) {
        let _ = self.tx.send(HubCommand::Unregister { id }).await;
    }
}

/// Spawn the hub task. It runs until every handle is dropped.
pub fn spawn_hub(
    metrics: RelayMetrics,
    capacity: usize,
) -> (HubHandle, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(capacity.max(1));
    let mut hub = Hub::new(metrics);
    let task = tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            hub.handle(command);
        }
        debug!("hub stopped");
    });
    (HubHandle { tx }, task)
}
