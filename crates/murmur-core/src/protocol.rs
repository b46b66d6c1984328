//! Wire protocol types shared by the relay and the client.
//!
//! Two layers travel over every socket:
//!
//! - [`Envelope`]: the outer frame `{a, p?, c?, u?}` the relay reads and
//!   routes. Its `p` is opaque to the relay once a room is joined.
//! - [`InnerMessage`]: `{a: "m", t, d}`, the plaintext of `p` after the room or
//!   pairwise layer is removed. Only clients ever see it.

use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Relay-assigned connection id (16 lowercase hex chars).
pub type ClientId = String;

/// Public room identifier: 64 lowercase hex chars derived from the room
/// name and password. Knowing it does not help recover the room key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub const HEX_LEN: usize = 64;

    /// Accepts exactly 64 lowercase hex characters.
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == Self::HEX_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Outer layer ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Transport handshake (plaintext)
    #[serde(rename = "k")]
    Handshake,
    /// Handshake complete
    #[serde(rename = "o")]
    Ready,
    #[serde(rename = "j")]
    Join,
    /// Member list sent to a joiner
    #[serde(rename = "l")]
    Members,
    #[serde(rename = "y")]
    PeerJoined,
    #[serde(rename = "x")]
    PeerLeft,
    #[serde(rename = "q")]
    Leave,
    #[serde(rename = "m")]
    Broadcast,
    #[serde(rename = "c")]
    Private,
    /// Private frame carrying a peer key share
    #[serde(rename = "e")]
    KeyExchange,
    /// A private frame could not be delivered
    #[serde(rename = "u")]
    Undeliverable,
}

impl Action {
    pub fn code(&self) -> &'static str {
        match self {
            Action::Handshake => "k",
            Action::Ready => "o",
            Action::Join => "j",
            Action::Members => "l",
            Action::PeerJoined => "y",
            Action::PeerLeft => "x",
            Action::Leave => "q",
            Action::Broadcast => "m",
            Action::Private => "c",
            Action::KeyExchange => "e",
            Action::Undeliverable => "u",
        }
    }

    /// Frames addressed to one client rather than the whole room.
    pub fn is_targeted(&self) -> bool {
        matches!(self, Action::Private | Action::KeyExchange)
    }
}

/// Outer frame. Field names are single letters on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "a")]
    pub action: Action,
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientId>,
    #[serde(rename = "u", default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<ClientId>,
}

impl Envelope {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            payload: None,
            client: None,
            members: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_client(mut self, client: impl Into<ClientId>) -> Self {
        self.client = Some(client.into());
        self
    }

    pub fn with_members(mut self, members: Vec<ClientId>) -> Self {
        self.members = members;
        self
    }

    pub fn join(room: &RoomId) -> Self {
        Self::new(Action::Join).with_payload(room.as_str())
    }
}

// ── Inner layer ──────────────────────────────────────────────────────────────

/// Which kind of outer frame delivered an inner message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Broadcast,
    Private,
    KeyExchange,
}

impl Route {
    pub fn for_action(action: Action) -> Option<Self> {
        match action {
            Action::Broadcast => Some(Route::Broadcast),
            Action::Private => Some(Route::Private),
            Action::KeyExchange => Some(Route::KeyExchange),
            _ => None,
        }
    }

    pub fn action(&self) -> Action {
        match self {
            Route::Broadcast => Action::Broadcast,
            Route::Private => Action::Private,
            Route::KeyExchange => Action::KeyExchange,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImagePayload {
    #[serde(default)]
    pub text: String,
    /// `data:` URLs
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStart {
    pub file_id: String,
    pub file_name: String,
    pub original_size: u64,
    pub compressed_size: u64,
    pub total_volumes: u32,
    /// SHA-256 hex of the uncompressed bytes (the archive, for archives)
    #[serde(alias = "archiveHash")]
    pub original_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_manifest: Option<Vec<ManifestEntry>>,
    #[serde(default)]
    pub is_archive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVolume {
    pub file_id: String,
    pub volume_index: u32,
    /// base64 of one slice of the compressed stream
    pub volume_data: String,
    #[serde(default)]
    pub is_last: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileComplete {
    pub file_id: String,
}

/// File control message, as carried inside `file_private`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileControl {
    FileStart(FileStart),
    FileVolume(FileVolume),
    FileComplete(FileComplete),
}

impl FileControl {
    pub fn file_id(&self) -> &str {
        match self {
            FileControl::FileStart(s) => &s.file_id,
            FileControl::FileVolume(v) => &v.file_id,
            FileControl::FileComplete(c) => &c.file_id,
        }
    }

    /// Wrap for the wire: private transfers go inside `file_private`.
    pub fn into_message(self, private: bool) -> InnerMessage {
        if private {
            return InnerMessage::FilePrivate(self);
        }
        match self {
            FileControl::FileStart(s) => InnerMessage::FileStart(s),
            FileControl::FileVolume(v) => InnerMessage::FileVolume(v),
            FileControl::FileComplete(c) => InnerMessage::FileComplete(c),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyShare {
    /// base64 X25519 public key
    pub public_key: String,
    #[serde(default)]
    pub name: String,
    /// Set when answering someone else's share, so it is not answered again
    #[serde(default)]
    pub reply: bool,
}

/// Decrypted inner message. Serialized as `{"a":"m","t":<kind>,"d":<data>}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawInner")]
pub enum InnerMessage {
    Text(String),
    TextPrivate(String),
    Image(ImagePayload),
    ImagePrivate(ImagePayload),
    FileStart(FileStart),
    FileVolume(FileVolume),
    FileComplete(FileComplete),
    FilePrivate(FileControl),
    KeyShare(KeyShare),
}

impl InnerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            InnerMessage::Text(_) => "text",
            InnerMessage::TextPrivate(_) => "text_private",
            InnerMessage::Image(_) => "image",
            InnerMessage::ImagePrivate(_) => "image_private",
            InnerMessage::FileStart(_) => "file_start",
            InnerMessage::FileVolume(_) => "file_volume",
            InnerMessage::FileComplete(_) => "file_complete",
            InnerMessage::FilePrivate(_) => "file_private",
            InnerMessage::KeyShare(_) => "key_share",
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(
            self,
            InnerMessage::TextPrivate(_)
                | InnerMessage::ImagePrivate(_)
                | InnerMessage::FilePrivate(_)
        )
    }

    /// Private kinds only arrive through `c` frames, key shares only through
    /// `e` frames, everything else only through room broadcasts.
    pub fn accepted_on(&self, route: Route) -> bool {
        match self {
            InnerMessage::KeyShare(_) => route == Route::KeyExchange,
            m if m.is_private() => route == Route::Private,
            _ => route == Route::Broadcast,
        }
    }

    /// Split off the file control message, for either visibility.
    /// Anything else is handed back unchanged.
    pub fn into_file_control(self) -> Result<FileControl, Self> {
        match self {
            InnerMessage::FileStart(s) => Ok(FileControl::FileStart(s)),
            InnerMessage::FileVolume(v) => Ok(FileControl::FileVolume(v)),
            InnerMessage::FileComplete(c) => Ok(FileControl::FileComplete(c)),
            InnerMessage::FilePrivate(f) => Ok(f),
            other => Err(other),
        }
    }
}

impl Serialize for InnerMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("InnerMessage", 3)?;
        s.serialize_field("a", "m")?;
        s.serialize_field("t", self.kind())?;
        match self {
            InnerMessage::Text(t) | InnerMessage::TextPrivate(t) => s.serialize_field("d", t)?,
            InnerMessage::Image(i) | InnerMessage::ImagePrivate(i) => s.serialize_field("d", i)?,
            InnerMessage::FileStart(f) => s.serialize_field("d", f)?,
            InnerMessage::FileVolume(f) => s.serialize_field("d", f)?,
            InnerMessage::FileComplete(f) => s.serialize_field("d", f)?,
            InnerMessage::FilePrivate(f) => s.serialize_field("d", f)?,
            InnerMessage::KeyShare(k) => s.serialize_field("d", k)?,
        }
        s.end()
    }
}

#[derive(Deserialize)]
struct RawInner {
    a: String,
    t: String,
    #[serde(default)]
    d: serde_json::Value,
}

impl TryFrom<RawInner> for InnerMessage {
    type Error = serde_json::Error;

    fn try_from(raw: RawInner) -> Result<Self, Self::Error> {
        if raw.a != "m" {
            return Err(serde_json::Error::custom(format!(
                "inner action must be \"m\", got {:?}",
                raw.a
            )));
        }
        let d = raw.d;
        let msg = match raw.t.as_str() {
            "text" => InnerMessage::Text(serde_json::from_value(d)?),
            "text_private" => InnerMessage::TextPrivate(serde_json::from_value(d)?),
            "image" => InnerMessage::Image(serde_json::from_value(d)?),
            "image_private" => InnerMessage::ImagePrivate(serde_json::from_value(d)?),
            "file_start" => InnerMessage::FileStart(serde_json::from_value(d)?),
            "file_volume" => InnerMessage::FileVolume(serde_json::from_value(d)?),
            "file_complete" => InnerMessage::FileComplete(serde_json::from_value(d)?),
            "file_private" => InnerMessage::FilePrivate(serde_json::from_value(d)?),
            "key_share" => InnerMessage::KeyShare(serde_json::from_value(d)?),
            other => {
                return Err(serde_json::Error::custom(format!(
                    "unknown message type {other:?}"
                )))
            }
        };
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_start() -> FileStart {
        FileStart {
            file_id: "file_1700000000000_abc123xyz".into(),
            file_name: "notes.txt".into(),
            original_size: 17,
            compressed_size: 19,
            total_volumes: 1,
            original_hash: "ab".repeat(32),
            file_count: None,
            file_manifest: None,
            is_archive: false,
            user_name: Some("alice".into()),
        }
    }

    #[test]
    fn test_envelope_omits_absent_fields() {
        let env = Envelope::new(Action::Ready);
        assert_eq!(serde_json::to_string(&env).unwrap(), r#"{"a":"o"}"#);

        let env = Envelope::new(Action::Private)
            .with_payload("xyz")
            .with_client("0011223344556677");
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({"a": "c", "p": "xyz", "c": "0011223344556677"})
        );
    }

    #[test]
    fn test_envelope_member_list() {
        let env: Envelope = serde_json::from_str(r#"{"a":"l","u":["a","b"]}"#).unwrap();
        assert_eq!(env.action, Action::Members);
        assert_eq!(env.members, vec!["a".to_string(), "b".to_string()]);
        assert!(env.payload.is_none());
    }

    #[test]
    fn test_unknown_action_rejected() {
        assert!(serde_json::from_str::<Envelope>(r#"{"a":"z"}"#).is_err());
    }

    #[test]
    fn test_action_codes_match_serde() {
        for action in [
            Action::Handshake,
            Action::Ready,
            Action::Join,
            Action::Members,
            Action::PeerJoined,
            Action::PeerLeft,
            Action::Leave,
            Action::Broadcast,
            Action::Private,
            Action::KeyExchange,
            Action::Undeliverable,
        ] {
            let s = serde_json::to_string(&action).unwrap();
            assert_eq!(s, format!("\"{}\"", action.code()));
        }
    }

    #[test]
    fn test_text_message_shape() {
        let msg = InnerMessage::Text("hi".into());
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"a": "m", "t": "text", "d": "hi"})
        );
        let back: InnerMessage = serde_json::from_str(r#"{"a":"m","t":"text","d":"hi"}"#).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_file_start_camel_case() {
        let msg = InnerMessage::FileStart(sample_start());
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["t"], "file_start");
        assert_eq!(v["d"]["fileId"], "file_1700000000000_abc123xyz");
        assert_eq!(v["d"]["totalVolumes"], 1);
        assert_eq!(v["d"]["isArchive"], false);
        assert!(v["d"].get("fileManifest").is_none());
    }

    #[test]
    fn test_archive_hash_alias() {
        let d = json!({
            "fileId": "f", "fileName": "2 files", "originalSize": 10,
            "compressedSize": 8, "totalVolumes": 1, "archiveHash": "00",
            "fileCount": 2, "isArchive": true,
            "fileManifest": [{"name": "a", "size": 4}, {"name": "b", "size": 6}]
        });
        let msg: InnerMessage =
            serde_json::from_value(json!({"a": "m", "t": "file_start", "d": d})).unwrap();
        let InnerMessage::FileStart(start) = msg else {
            panic!("expected file_start");
        };
        assert_eq!(start.original_hash, "00");
        assert_eq!(start.file_manifest.unwrap().len(), 2);
    }

    #[test]
    fn test_file_private_is_type_tagged() {
        let msg = FileControl::FileComplete(FileComplete {
            file_id: "f1".into(),
        })
        .into_message(true);
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            v,
            json!({"a": "m", "t": "file_private", "d": {"type": "file_complete", "fileId": "f1"}})
        );

        let back: InnerMessage = serde_json::from_value(v).unwrap();
        assert_eq!(back.into_file_control().unwrap().file_id(), "f1");
    }

    #[test]
    fn test_visibility_rules() {
        let text = InnerMessage::Text("x".into());
        let private = InnerMessage::TextPrivate("x".into());
        let share = InnerMessage::KeyShare(KeyShare {
            public_key: String::new(),
            name: String::new(),
            reply: false,
        });

        assert!(text.accepted_on(Route::Broadcast));
        assert!(!text.accepted_on(Route::Private));
        assert!(private.accepted_on(Route::Private));
        assert!(!private.accepted_on(Route::Broadcast));
        assert!(share.accepted_on(Route::KeyExchange));
        assert!(!share.accepted_on(Route::Broadcast));
        assert!(!share.accepted_on(Route::Private));
    }

    #[test]
    fn test_unknown_inner_type_rejected() {
        let r = serde_json::from_str::<InnerMessage>(r#"{"a":"m","t":"poke","d":null}"#);
        assert!(r.is_err());
        let r = serde_json::from_str::<InnerMessage>(r#"{"a":"x","t":"text","d":"hi"}"#);
        assert!(r.is_err());
    }

    #[test]
    fn test_room_id_parse() {
        let hex = "a".repeat(64);
        assert!(RoomId::parse(&hex).is_some());
        assert!(RoomId::parse(&"A".repeat(64)).is_none());
        assert!(RoomId::parse("abc").is_none());
        assert_eq!(RoomId::parse(&hex).unwrap().short(), "aaaaaaaaaaaa");
    }
}
