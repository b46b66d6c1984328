//! Per-connection client state: transport key, room key, peer keys and the
//! transfer table.
//!
//! `ClientSession` does no I/O. Frames from the relay go in through
//! [`ClientSession::handle_frame`], which returns events for the UI and
//! queues any frames the protocol answers with (handshake reply, join,
//! key shares); the connector drains those with
//! [`ClientSession::take_outbound`]. Everything here is dropped on
//! [`ClientSession::teardown`].

use murmur_core::{
    Action, ClientId, Envelope, FileControl, InnerMessage, KeyShare, MurmurError, MurmurResult,
    RoomId, Route, RoutingError, TransferConfig,
};
use murmur_crypto::{wrap_transport_secret, EnvelopeCodec, PeerKeyPair, RoomSecrets};
use murmur_transfer::{TransferTable, TransferUpdate};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// What the UI hears about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Transport handshake finished; the join request is queued.
    Ready { client_id: ClientId },
    /// The relay accepted the join. `members` are the others already there.
    Joined { room_id: RoomId, members: Vec<ClientId> },
    PeerJoined { client: ClientId },
    /// A pairwise key with this peer exists; private sends will work.
    PeerReady { client: ClientId, name: String },
    PeerLeft {
        client: ClientId,
        /// Unfinished incoming transfers from this peer that were dropped
        dropped_transfers: Vec<String>,
    },
    /// The relay could not deliver a private frame to `target`.
    Undeliverable { target: ClientId },
    /// A decrypted chat message. File offers arrive here too, as the
    /// `file_start` (or `file_private`) message that opened the transfer.
    Message {
        room_id: RoomId,
        sender: ClientId,
        message: InnerMessage,
    },
    TransferProgress {
        file_id: String,
        done: usize,
        total: usize,
    },
    TransferComplete { file_id: String },
    /// The socket closed and the session was torn down.
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingHello,
    AwaitingReady,
    Ready,
    Joined,
}

/// What we know about one remote member.
#[derive(Debug, Default)]
pub struct PeerState {
    pub name: Option<String>,
    /// base64 X25519 public key from their key share
    pub public_key: Option<String>,
    codec: Option<EnvelopeCodec>,
}

impl PeerState {
    pub fn has_shared_secret(&self) -> bool {
        self.codec.is_some()
    }
}

pub struct ClientSession {
    user_name: String,
    room_id: RoomId,
    room_codec: EnvelopeCodec,
    peer_keys: PeerKeyPair,
    phase: Phase,
    client_id: Option<ClientId>,
    transport: Option<EnvelopeCodec>,
    peers: HashMap<ClientId, PeerState>,
    transfers: TransferTable,
    transfer_config: TransferConfig,
    outbound: Vec<String>,
}

impl ClientSession {
    pub fn new(room: RoomSecrets, user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            room_id: room.id,
            room_codec: EnvelopeCodec::new(room.key),
            peer_keys: PeerKeyPair::generate(),
            phase: Phase::AwaitingHello,
            client_id: None,
            transport: None,
            peers: HashMap::new(),
            transfers: TransferTable::new(),
            transfer_config: TransferConfig::default(),
            outbound: Vec::new(),
        }
    }

    pub fn with_transfer_config(mut self, config: TransferConfig) -> Self {
        self.transfer_config = config;
        self
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn transfer_config(&self) -> &TransferConfig {
        &self.transfer_config
    }

    pub fn is_joined(&self) -> bool {
        self.phase == Phase::Joined
    }

    pub fn peer(&self, id: &str) -> Option<&PeerState> {
        self.peers.get(id)
    }

    pub fn peers(&self) -> impl Iterator<Item = (&ClientId, &PeerState)> {
        self.peers.iter()
    }

    pub fn transfers(&self) -> &TransferTable {
        &self.transfers
    }

    pub fn transfers_mut(&mut self) -> &mut TransferTable {
        &mut self.transfers
    }

    /// Frames queued by the protocol itself, in send order.
    pub fn take_outbound(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outbound)
    }

    /// Process one frame from the relay.
    ///
    /// Errors mean the connection cannot continue (bad hello, or a ready
    /// frame our transport key cannot open). Anything wrong with a single
    /// later frame is logged and discarded.
    pub fn handle_frame(&mut self, wire: &str) -> MurmurResult<Vec<SessionEvent>> {
        let Some(transport) = &self.transport else {
            return self.handle_hello(wire);
        };
        let envelope: Envelope = match transport.decode(wire) {
            Ok(envelope) => envelope,
            Err(e) if self.phase == Phase::AwaitingReady => {
                return Err(MurmurError::Transport(format!(
                    "relay ready frame did not decode: {e}"
                )))
            }
            Err(e) => {
                warn!(error = %e, "discarding undecodable frame");
                return Ok(Vec::new());
            }
        };
        self.handle_envelope(envelope)
    }

    fn handle_hello(&mut self, wire: &str) -> MurmurResult<Vec<SessionEvent>> {
        let hello: Envelope = serde_json::from_str(wire)
            .map_err(|e| MurmurError::protocol(format!("relay hello: {e}")))?;
        if hello.action != Action::Handshake {
            return Err(MurmurError::protocol(format!(
                "expected hello, got action {}",
                hello.action.code()
            )));
        }
        let (Some(relay_key), Some(client_id)) = (hello.payload, hello.client) else {
            return Err(MurmurError::protocol("hello without relay key or client id"));
        };

        let (secret, wrapped) = wrap_transport_secret(&relay_key)?;
        let reply = Envelope::new(Action::Handshake).with_payload(wrapped);
        let reply =
            serde_json::to_string(&reply).map_err(|e| MurmurError::protocol(e.to_string()))?;
        self.outbound.push(reply);

        debug!(client = %client_id, "transport secret sent");
        self.transport = Some(EnvelopeCodec::new(secret));
        self.client_id = Some(client_id);
        self.phase = Phase::AwaitingReady;
        Ok(Vec::new())
    }

    fn handle_envelope(&mut self, envelope: Envelope) -> MurmurResult<Vec<SessionEvent>> {
        match envelope.action {
            Action::Ready => {
                if self.phase != Phase::AwaitingReady {
                    warn!("duplicate ready frame ignored");
                    return Ok(Vec::new());
                }
                self.phase = Phase::Ready;
                let join = Envelope::join(&self.room_id);
                self.queue(&join)?;
                let client_id = self.client_id.clone().unwrap_or_default();
                info!(client = %client_id, room = %self.room_id.short(), "connected, joining room");
                Ok(vec![SessionEvent::Ready { client_id }])
            }
            Action::Members => {
                self.phase = Phase::Joined;
                for member in &envelope.members {
                    self.peers.entry(member.clone()).or_default();
                }
                for member in &envelope.members {
                    self.queue_key_share(member, false)?;
                }
                info!(room = %self.room_id.short(), members = envelope.members.len(), "joined");
                Ok(vec![SessionEvent::Joined {
                    room_id: self.room_id.clone(),
                    members: envelope.members,
                }])
            }
            Action::PeerJoined => {
                let Some(client) = envelope.client else {
                    return Ok(Vec::new());
                };
                self.peers.entry(client.clone()).or_default();
                Ok(vec![SessionEvent::PeerJoined { client }])
            }
            Action::PeerLeft => {
                let Some(client) = envelope.client else {
                    return Ok(Vec::new());
                };
                self.peers.remove(&client);
                let dropped_transfers = self.transfers.drop_sender(&client);
                info!(peer = %client, dropped = dropped_transfers.len(), "peer left");
                Ok(vec![SessionEvent::PeerLeft {
                    client,
                    dropped_transfers,
                }])
            }
            Action::Undeliverable => Ok(envelope
                .client
                .map(|target| SessionEvent::Undeliverable { target })
                .into_iter()
                .collect()),
            action @ (Action::Broadcast | Action::Private | Action::KeyExchange) => {
                let (Some(route), Some(sender), Some(payload)) =
                    (Route::for_action(action), envelope.client, envelope.payload)
                else {
                    warn!(action = action.code(), "relay frame without sender or payload");
                    return Ok(Vec::new());
                };
                self.handle_inner(route, sender, &payload)
            }
            other => {
                warn!(action = other.code(), "unexpected action from relay");
                Ok(Vec::new())
            }
        }
    }

    fn handle_inner(
        &mut self,
        route: Route,
        sender: ClientId,
        payload: &str,
    ) -> MurmurResult<Vec<SessionEvent>> {
        let decoded = match route {
            Route::Broadcast | Route::KeyExchange => {
                self.room_codec.decode::<InnerMessage>(payload)
            }
            Route::Private => match self.peers.get(&sender).and_then(|p| p.codec.as_ref()) {
                Some(codec) => codec.decode::<InnerMessage>(payload),
                None => {
                    warn!(from = %sender, "private frame from peer without a shared secret");
                    return Ok(Vec::new());
                }
            },
        };
        let message = match decoded {
            Ok(message) => message,
            Err(e) => {
                warn!(from = %sender, error = %e, "discarding inner message");
                return Ok(Vec::new());
            }
        };
        if !message.accepted_on(route) {
            warn!(
                from = %sender,
                kind = message.kind(),
                route = route.action().code(),
                "message kind not allowed on this route"
            );
            return Ok(Vec::new());
        }

        if let InnerMessage::KeyShare(share) = message {
            return self.accept_key_share(sender, share);
        }
        let private = message.is_private();
        match message.into_file_control() {
            Ok(control) => Ok(self.handle_file(sender, control, private)),
            Err(message) => Ok(vec![SessionEvent::Message {
                room_id: self.room_id.clone(),
                sender,
                message,
            }]),
        }
    }

    fn accept_key_share(
        &mut self,
        sender: ClientId,
        share: KeyShare,
    ) -> MurmurResult<Vec<SessionEvent>> {
        let peer = self.peers.entry(sender.clone()).or_default();
        if !share.name.is_empty() {
            peer.name = Some(share.name.clone());
        }
        // One pairwise key per peer per session
        if let Some(existing) = &peer.public_key {
            if existing != &share.public_key {
                warn!(peer = %sender, "ignoring key share with a different key");
            }
            return Ok(Vec::new());
        }
        let key = match self.peer_keys.derive_shared(&share.public_key) {
            Ok(key) => key,
            Err(e) => {
                warn!(peer = %sender, error = %e, "rejecting key share");
                return Ok(Vec::new());
            }
        };
        peer.public_key = Some(share.public_key);
        peer.codec = Some(EnvelopeCodec::new(key));

        if !share.reply {
            self.queue_key_share(&sender, true)?;
        }
        info!(peer = %sender, name = %share.name, "pairwise key established");
        Ok(vec![SessionEvent::PeerReady {
            client: sender,
            name: share.name,
        }])
    }

    fn handle_file(
        &mut self,
        sender: ClientId,
        control: FileControl,
        private: bool,
    ) -> Vec<SessionEvent> {
        let offer = match &control {
            FileControl::FileStart(start) => Some(FileControl::FileStart(start.clone())),
            _ => None,
        };
        let update = match self.transfers.handle(&sender, control, private) {
            Ok(update) => update,
            Err(e) => {
                warn!(from = %sender, error = %e, "discarding file message");
                return Vec::new();
            }
        };
        match update {
            TransferUpdate::Started { file_id, total } => {
                let mut events = Vec::with_capacity(2);
                if let Some(offer) = offer {
                    events.push(SessionEvent::Message {
                        room_id: self.room_id.clone(),
                        sender,
                        message: offer.into_message(private),
                    });
                }
                events.push(SessionEvent::TransferProgress {
                    file_id,
                    done: 0,
                    total,
                });
                events
            }
            TransferUpdate::Progress {
                file_id,
                done,
                total,
            } => vec![SessionEvent::TransferProgress {
                file_id,
                done,
                total,
            }],
            TransferUpdate::Completed { file_id } => {
                vec![SessionEvent::TransferComplete { file_id }]
            }
            TransferUpdate::Incomplete { .. } => Vec::new(),
        }
    }

    fn queue_key_share(&mut self, target: &str, reply: bool) -> MurmurResult<()> {
        let share = InnerMessage::KeyShare(KeyShare {
            public_key: self.peer_keys.public_key_base64(),
            name: self.user_name.clone(),
            reply,
        });
        let inner = self.room_codec.encode(&share)?;
        let outer = Envelope::new(Action::KeyExchange)
            .with_payload(inner)
            .with_client(target);
        self.queue(&outer)
    }

    fn queue(&mut self, envelope: &Envelope) -> MurmurResult<()> {
        let wire = self.outer(envelope)?;
        self.outbound.push(wire);
        Ok(())
    }

    fn outer(&self, envelope: &Envelope) -> MurmurResult<String> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| MurmurError::Transport("not connected".into()))?;
        Ok(transport.encode(envelope)?)
    }

    /// Encode a room-wide message into an outer `m` frame.
    pub fn send_broadcast(&self, message: &InnerMessage) -> MurmurResult<String> {
        if self.phase != Phase::Joined {
            return Err(RoutingError::NotInRoom.into());
        }
        if !message.accepted_on(Route::Broadcast) {
            return Err(MurmurError::protocol(format!(
                "{} cannot be broadcast",
                message.kind()
            )));
        }
        let inner = self.room_codec.encode(message)?;
        self.outer(&Envelope::new(Action::Broadcast).with_payload(inner))
    }

    /// Encode a private message for `target` under our pairwise key.
    /// Never falls back to the room key.
    pub fn send_private(&self, target: &str, message: &InnerMessage) -> MurmurResult<String> {
        let codec = self.pairwise(target)?;
        if !message.accepted_on(Route::Private) {
            return Err(MurmurError::protocol(format!(
                "{} cannot be sent privately",
                message.kind()
            )));
        }
        let inner = codec.encode(message)?;
        self.outer(
            &Envelope::new(Action::Private)
                .with_payload(inner)
                .with_client(target),
        )
    }

    /// `send_private` for `Some(target)`, `send_broadcast` otherwise.
    pub fn encode_for(&self, target: Option<&str>, message: &InnerMessage) -> MurmurResult<String> {
        match target {
            Some(target) => self.send_private(target, message),
            None => self.send_broadcast(message),
        }
    }

    /// Fail fast if a message could not currently be routed.
    pub fn ensure_routable(&self, target: Option<&str>) -> MurmurResult<()> {
        match target {
            Some(target) => self.pairwise(target).map(|_| ()),
            None if self.phase == Phase::Joined => Ok(()),
            None => Err(RoutingError::NotInRoom.into()),
        }
    }

    fn pairwise(&self, target: &str) -> MurmurResult<&EnvelopeCodec> {
        if self.phase != Phase::Joined {
            return Err(RoutingError::NotInRoom.into());
        }
        let peer = self
            .peers
            .get(target)
            .ok_or_else(|| RoutingError::UnknownPeer(target.to_string()))?;
        peer.codec
            .as_ref()
            .ok_or_else(|| RoutingError::NoSharedSecret(target.to_string()).into())
    }

    /// Leave the room. Peers and transfers go with it.
    pub fn leave(&mut self) -> MurmurResult<String> {
        let wire = self.outer(&Envelope::new(Action::Leave))?;
        if self.phase == Phase::Joined {
            self.phase = Phase::Ready;
        }
        self.peers.clear();
        self.transfers.clear();
        Ok(wire)
    }

    /// Forget everything tied to the connection. A fresh peer keypair is
    /// generated for the next one.
    pub fn teardown(&mut self) {
        if !self.peers.is_empty() || !self.transfers.is_empty() {
            info!(
                peers = self.peers.len(),
                transfers = self.transfers.len(),
                "session torn down"
            );
        }
        self.phase = Phase::AwaitingHello;
        self.client_id = None;
        self.transport = None;
        self.peers.clear();
        self.transfers.clear();
        self.outbound.clear();
        self.peer_keys = PeerKeyPair::generate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::{FileComplete, ImagePayload};
    use murmur_crypto::{RelayKeyPair, SymmetricKey};
    use std::sync::OnceLock;

    fn relay_keys() -> &'static RelayKeyPair {
        static KEYS: OnceLock<RelayKeyPair> = OnceLock::new();
        KEYS.get_or_init(|| RelayKeyPair::generate(1024).unwrap())
    }

    fn secrets() -> RoomSecrets {
        static SECRETS: OnceLock<RoomSecrets> = OnceLock::new();
        SECRETS
            .get_or_init(|| RoomSecrets::derive("lobby", "pw").unwrap())
            .clone()
    }

    /// Drive a session through hello and ready; returns the relay-side codec.
    fn connected(name: &str, id: &str) -> (ClientSession, EnvelopeCodec) {
        let mut session = ClientSession::new(secrets(), name);
        let hello = Envelope::new(Action::Handshake)
            .with_payload(relay_keys().public_key_base64())
            .with_client(id);
        let events = session
            .handle_frame(&serde_json::to_string(&hello).unwrap())
            .unwrap();
        assert!(events.is_empty());

        let reply: Envelope = serde_json::from_str(&session.take_outbound()[0]).unwrap();
        let secret = relay_keys().unwrap_secret(&reply.payload.unwrap()).unwrap();
        let relay = EnvelopeCodec::new(secret);

        let ready = relay.encode(&Envelope::new(Action::Ready)).unwrap();
        let events = session.handle_frame(&ready).unwrap();
        assert_eq!(events, vec![SessionEvent::Ready { client_id: id.into() }]);
        let join: Envelope = relay.decode(&session.take_outbound()[0]).unwrap();
        assert_eq!(join, Envelope::join(session.room_id()));
        (session, relay)
    }

    fn joined(
        session: &mut ClientSession,
        relay: &EnvelopeCodec,
        members: &[&str],
    ) -> Vec<Envelope> {
        let list = Envelope::new(Action::Members)
            .with_members(members.iter().map(|m| m.to_string()).collect());
        session.handle_frame(&relay.encode(&list).unwrap()).unwrap();
        session
            .take_outbound()
            .iter()
            .map(|w| relay.decode(w).unwrap())
            .collect()
    }

    #[test]
    fn test_hello_must_be_handshake() {
        let mut session = ClientSession::new(secrets(), "a");
        assert!(session.handle_frame(r#"{"a":"o"}"#).is_err());
        assert!(session.handle_frame("garbage").is_err());
    }

    #[test]
    fn test_ready_under_wrong_key_fails() {
        let mut session = ClientSession::new(secrets(), "a");
        let hello = Envelope::new(Action::Handshake)
            .with_payload(relay_keys().public_key_base64())
            .with_client("aaaa");
        session
            .handle_frame(&serde_json::to_string(&hello).unwrap())
            .unwrap();
        let wrong = EnvelopeCodec::new(SymmetricKey::generate());
        let ready = wrong.encode(&Envelope::new(Action::Ready)).unwrap();
        assert!(matches!(
            session.handle_frame(&ready),
            Err(MurmurError::Transport(_))
        ));
    }

    #[test]
    fn test_join_sends_key_share_to_each_member() {
        let (mut session, relay) = connected("alice", "a1");
        let frames = joined(&mut session, &relay, &["b1", "c1"]);
        assert!(session.is_joined());
        assert_eq!(frames.len(), 2);
        for (frame, target) in frames.iter().zip(["b1", "c1"]) {
            assert_eq!(frame.action, Action::KeyExchange);
            assert_eq!(frame.client.as_deref(), Some(target));
            let inner: InnerMessage = EnvelopeCodec::new(secrets().key)
                .decode(frame.payload.as_deref().unwrap())
                .unwrap();
            let InnerMessage::KeyShare(share) = inner else {
                panic!("expected key share");
            };
            assert_eq!(share.name, "alice");
            assert!(!share.reply);
        }
    }

    #[test]
    fn test_send_before_join_is_not_in_room() {
        let (session, _) = connected("alice", "a1");
        let err = session
            .send_broadcast(&InnerMessage::Text("hi".into()))
            .unwrap_err();
        assert!(matches!(err, MurmurError::Routing(RoutingError::NotInRoom)));
    }

    #[test]
    fn test_private_send_errors() {
        let (mut session, relay) = connected("alice", "a1");
        joined(&mut session, &relay, &["b1"]);
        let msg = InnerMessage::TextPrivate("psst".into());

        let err = session.send_private("b1", &msg).unwrap_err();
        assert!(matches!(
            err,
            MurmurError::Routing(RoutingError::NoSharedSecret(ref id)) if id == "b1"
        ));
        let err = session.send_private("zz", &msg).unwrap_err();
        assert!(matches!(
            err,
            MurmurError::Routing(RoutingError::UnknownPeer(ref id)) if id == "zz"
        ));
    }

    #[test]
    fn test_visibility_enforced_on_send() {
        let (mut session, relay) = connected("alice", "a1");
        joined(&mut session, &relay, &[]);
        assert!(session
            .send_broadcast(&InnerMessage::TextPrivate("x".into()))
            .is_err());
        assert!(session
            .send_broadcast(&InnerMessage::Image(ImagePayload::default()))
            .is_ok());
    }

    #[test]
    fn test_private_kind_on_broadcast_dropped() {
        let (mut session, relay) = connected("alice", "a1");
        joined(&mut session, &relay, &["b1"]);
        let room = EnvelopeCodec::new(secrets().key);
        let inner = room.encode(&InnerMessage::TextPrivate("x".into())).unwrap();
        let frame = Envelope::new(Action::Broadcast)
            .with_payload(inner)
            .with_client("b1");
        let events = session.handle_frame(&relay.encode(&frame).unwrap()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_broadcast_delivers_message_event() {
        let (mut session, relay) = connected("alice", "a1");
        joined(&mut session, &relay, &["b1"]);
        let room = EnvelopeCodec::new(secrets().key);
        let inner = room.encode(&InnerMessage::Text("hello".into())).unwrap();
        let frame = Envelope::new(Action::Broadcast)
            .with_payload(inner)
            .with_client("b1");
        let events = session.handle_frame(&relay.encode(&frame).unwrap()).unwrap();
        assert_eq!(
            events,
            vec![SessionEvent::Message {
                room_id: session.room_id().clone(),
                sender: "b1".into(),
                message: InnerMessage::Text("hello".into()),
            }]
        );
    }

    #[test]
    fn test_tampered_frame_is_discarded() {
        let (mut session, relay) = connected("alice", "a1");
        joined(&mut session, &relay, &[]);
        let mut wire = relay
            .encode(&Envelope::new(Action::PeerJoined).with_client("b1"))
            .unwrap();
        wire.insert(0, 'A');
        assert!(session.handle_frame(&wire).unwrap().is_empty());
        assert!(session.peer("b1").is_none());
    }

    #[test]
    fn test_peer_left_drops_its_transfers() {
        let (mut session, relay) = connected("alice", "a1");
        joined(&mut session, &relay, &["b1"]);
        let room = EnvelopeCodec::new(secrets().key);
        let prepared = murmur_transfer::PreparedTransfer::prepare(
            vec![murmur_transfer::SelectedFile::new("f", vec![1; 10])],
            &TransferConfig::default(),
            Some("bob"),
        )
        .unwrap();
        let start = FileControl::FileStart(prepared.start.clone()).into_message(false);
        let frame = Envelope::new(Action::Broadcast)
            .with_payload(room.encode(&start).unwrap())
            .with_client("b1");
        let events = session.handle_frame(&relay.encode(&frame).unwrap()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(session.transfers().len(), 1);

        let left = Envelope::new(Action::PeerLeft).with_client("b1");
        let events = session.handle_frame(&relay.encode(&left).unwrap()).unwrap();
        assert_eq!(
            events,
            vec![SessionEvent::PeerLeft {
                client: "b1".into(),
                dropped_transfers: vec![prepared.file_id().to_string()],
            }]
        );
        assert!(session.transfers().is_empty());
        assert!(session.peer("b1").is_none());
    }

    #[test]
    fn test_file_complete_without_start_is_discarded() {
        let (mut session, relay) = connected("alice", "a1");
        joined(&mut session, &relay, &["b1"]);
        let room = EnvelopeCodec::new(secrets().key);
        let msg = InnerMessage::FileComplete(FileComplete { file_id: "nope".into() });
        let frame = Envelope::new(Action::Broadcast)
            .with_payload(room.encode(&msg).unwrap())
            .with_client("b1");
        assert!(session
            .handle_frame(&relay.encode(&frame).unwrap())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_teardown_clears_everything() {
        let (mut session, relay) = connected("alice", "a1");
        joined(&mut session, &relay, &["b1", "c1"]);
        session.teardown();
        assert_eq!(session.peers().count(), 0);
        assert!(session.client_id().is_none());
        assert!(!session.is_joined());
        assert!(session.take_outbound().is_empty());
        // A new connection starts from the hello again
        let ready = relay.encode(&Envelope::new(Action::Ready)).unwrap();
        assert!(session.handle_frame(&ready).is_err());
    }
}
