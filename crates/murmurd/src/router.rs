//! Room membership and outer-frame routing.
//!
//! The router works purely on decoded [`Envelope`]s: it decides who receives
//! what and returns the deliveries. Encoding for each recipient and queueing
//! happen in the hub. Payloads are forwarded untouched; the router has no key
//! that could open them.

use murmur_core::{Action, ClientId, Envelope, RoomId};
use std::collections::HashMap;
use std::fmt;

use crate::connection::ConnectionState;

/// One outer frame to encode for, and queue to, one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub to: ClientId,
    pub envelope: Envelope,
}

impl Delivery {
    fn new(to: &str, envelope: Envelope) -> Self {
        Self {
            to: to.to_string(),
            envelope,
        }
    }
}

/// Why a frame was dropped instead of routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    UnknownClient,
    NotInRoom,
    BadRoomId,
    MissingPayload,
    MissingTarget,
    UnexpectedAction,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::UnknownClient => "unknown_client",
            DropReason::NotInRoom => "not_in_room",
            DropReason::BadRoomId => "bad_room_id",
            DropReason::MissingPayload => "missing_payload",
            DropReason::MissingTarget => "missing_target",
            DropReason::UnexpectedAction => "unexpected_action",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
pub struct ChannelRouter {
    /// Authenticated connections and the room each one is in
    clients: HashMap<ClientId, Option<RoomId>>,
    /// Members in join order
    rooms: HashMap<RoomId, Vec<ClientId>>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection that finished its handshake.
    pub fn connect(&mut self, id: &str) {
        self.clients.entry(id.to_string()).or_insert(None);
    }

    /// Forget a connection, telling its room it left.
    pub fn disconnect(&mut self, id: &str) -> Vec<Delivery> {
        let out = self.leave(id);
        self.clients.remove(id);
        out
    }

    /// Authenticated until a join, Active while in a room, Closed once gone.
    pub fn state_of(&self, id: &str) -> ConnectionState {
        match self.clients.get(id) {
            None => ConnectionState::Closed,
            Some(None) => ConnectionState::Authenticated,
            Some(Some(_)) => ConnectionState::Active,
        }
    }

    pub fn room_of(&self, id: &str) -> Option<&RoomId> {
        self.clients.get(id).and_then(|r| r.as_ref())
    }

    pub fn members(&self, room: &RoomId) -> &[ClientId] {
        self.rooms.get(room).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Route one frame from `from`.
    pub fn route(&mut self, from: &str, envelope: Envelope) -> Result<Vec<Delivery>, DropReason> {
        if !self.clients.contains_key(from) {
            return Err(DropReason::UnknownClient);
        }
        match envelope.action {
            Action::Join => {
                let room = envelope
                    .payload
                    .as_deref()
                    .and_then(RoomId::parse)
                    .ok_or(DropReason::BadRoomId)?;
                Ok(self.join(from, room))
            }
            Action::Leave => Ok(self.leave(from)),
            Action::Broadcast => self.broadcast(from, envelope),
            Action::Private | Action::KeyExchange => self.private(from, envelope),
            _ => Err(DropReason::UnexpectedAction),
        }
    }

    fn join(&mut self, from: &str, room: RoomId) -> Vec<Delivery> {
        if self.room_of(from) == Some(&room) {
            return Vec::new();
        }
        let mut out = self.leave(from);

        let members = self.rooms.entry(room.clone()).or_default();
        let others = members.clone();
        members.push(from.to_string());

        out.push(Delivery::new(
            from,
            Envelope::new(Action::Members).with_members(others.clone()),
        ));
        for member in &others {
            out.push(Delivery::new(
                member,
                Envelope::new(Action::PeerJoined).with_client(from),
            ));
        }

        if let Some(slot) = self.clients.get_mut(from) {
            *slot = Some(room);
        }
        out
    }

    fn leave(&mut self, from: &str) -> Vec<Delivery> {
        let Some(room) = self.clients.get_mut(from).and_then(Option::take) else {
            return Vec::new();
        };
        let Some(members) = self.rooms.get_mut(&room) else {
            return Vec::new();
        };
        members.retain(|m| m != from);

        let out = members
            .iter()
            .map(|m| Delivery::new(m, Envelope::new(Action::PeerLeft).with_client(from)))
            .collect();
        if members.is_empty() {
            self.rooms.remove(&room);
        }
        out
    }

    fn broadcast(&self, from: &str, envelope: Envelope) -> Result<Vec<Delivery>, DropReason> {
        let room = self.room_of(from).ok_or(DropReason::NotInRoom)?;
        let payload = envelope.payload.ok_or(DropReason::MissingPayload)?;
        Ok(self
            .members(room)
            .iter()
            .filter(|m| m.as_str() != from)
            .map(|m| {
                Delivery::new(
                    m,
                    Envelope::new(Action::Broadcast)
                        .with_payload(payload.clone())
                        .with_client(from),
                )
            })
            .collect())
    }

    /// `c` and `e`: deliver to one member of the sender's room with `c`
    /// rewritten to the sender. Anyone else gets an undeliverable notice back.
    fn private(&self, from: &str, envelope: Envelope) -> Result<Vec<Delivery>, DropReason> {
        let room = self.room_of(from).ok_or(DropReason::NotInRoom)?;
        let target = envelope.client.ok_or(DropReason::MissingTarget)?;
        let payload = envelope.payload.ok_or(DropReason::MissingPayload)?;

        let reachable = target != from && self.members(room).iter().any(|m| *m == target);
        if !reachable {
            return Ok(vec![Delivery::new(
                from,
                Envelope::new(Action::Undeliverable).with_client(target),
            )]);
        }
        Ok(vec![Delivery::new(
            &target,
            Envelope::new(envelope.action)
                .with_payload(payload)
                .with_client(from),
        )])
    }
}
