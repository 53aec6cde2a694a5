//! Wire protocol: frame decoding, outbound commands and close-code rules.

use std::ops::{BitOr, BitOrAssign};

use pushgate_core::{CloseFrame, Dispatch, Id, WireMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway API version requested in the connection URL.
pub const API_VERSION: u8 = 10;

/// Close code sent when we drop a connection we intend to resume.
pub const CLOSE_RESUMABLE: u16 = 4000;

/// Close code sent on caller-initiated shutdown. The remote discards the session.
pub const CLOSE_NORMAL: u16 = 1000;

/// Gateway opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Dispatch = 0,
    Heartbeat = 1,
    Identify = 2,
    PresenceUpdate = 3,
    VoiceStateUpdate = 4,
    Resume = 6,
    Reconnect = 7,
    RequestGuildMembers = 8,
    InvalidSession = 9,
    Hello = 10,
    HeartbeatAck = 11,
}

impl TryFrom<u8> for OpCode {
    type Error = CodecError;

    fn try_from(op: u8) -> Result<Self, Self::Error> {
        Ok(match op {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            3 => Self::PresenceUpdate,
            4 => Self::VoiceStateUpdate,
            6 => Self::Resume,
            7 => Self::Reconnect,
            8 => Self::RequestGuildMembers,
            9 => Self::InvalidSession,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            other => return Err(CodecError::UnknownOpcode(other)),
        })
    }
}

/// Codec error.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Binary frames are not supported (compression is disabled)")]
    Binary,
    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unknown opcode: {0}")]
    UnknownOpcode(u8),
    #[error("Opcode {0:?} is not valid from the remote side")]
    UnexpectedOpcode(OpCode),
    #[error("Dispatch frame without an event name (seq {0:?})")]
    MissingEventName(Option<u64>),
}

impl CodecError {
    /// Whether the frame can be skipped without tearing down the connection.
    #[must_use]
    pub const fn is_skippable(&self) -> bool {
        matches!(self, Self::MissingEventName(_))
    }
}

/// Frame envelope as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFrame {
    pub op: u8,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
    #[serde(default)]
    pub d: Value,
}

/// Hello payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub heartbeat_interval: u64,
}

/// The subset of the Ready payload the session needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Ready {
    pub session_id: String,
    #[serde(default)]
    pub resume_gateway_url: Option<String>,
}

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Dispatch(Dispatch),
    /// The remote asks for an immediate heartbeat.
    HeartbeatRequest,
    HeartbeatAck,
    Reconnect,
    InvalidSession { resumable: bool },
    Hello(Hello),
}

/// Result of decoding one transport message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Frame(InboundFrame),
    Close(Option<CloseFrame>),
}

/// Decode one transport message.
///
/// # Errors
/// Returns error for binary frames, malformed JSON, unknown opcodes and
/// dispatches without an event name.
pub fn decode(message: WireMessage) -> Result<Inbound, CodecError> {
    match message {
        WireMessage::Text(text) => decode_text(&text).map(Inbound::Frame),
        WireMessage::Binary(_) => Err(CodecError::Binary),
        WireMessage::Close(frame) => Ok(Inbound::Close(frame)),
    }
}

/// Decode a text frame.
///
/// # Errors
/// See [`decode`].
pub fn decode_text(text: &str) -> Result<InboundFrame, CodecError> {
    let raw: RawFrame = serde_json::from_str(text)?;
    let op = OpCode::try_from(raw.op)?;

    match op {
        OpCode::Dispatch => {
            let event = raw.t.ok_or(CodecError::MissingEventName(raw.s))?;
            Ok(InboundFrame::Dispatch(Dispatch::new(event, raw.s, raw.d)))
        }
        OpCode::Heartbeat => Ok(InboundFrame::HeartbeatRequest),
        OpCode::HeartbeatAck => Ok(InboundFrame::HeartbeatAck),
        OpCode::Reconnect => Ok(InboundFrame::Reconnect),
        OpCode::InvalidSession => Ok(InboundFrame::InvalidSession {
            resumable: raw.d.as_bool().unwrap_or(false),
        }),
        OpCode::Hello => Ok(InboundFrame::Hello(Hello::deserialize(&raw.d)?)),
        other => Err(CodecError::UnexpectedOpcode(other)),
    }
}

/// Gateway intents bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Intents(pub u64);

impl Intents {
    pub const NONE: Self = Self(0);
    pub const GUILDS: Self = Self(1 << 0);
    pub const GUILD_MEMBERS: Self = Self(1 << 1);
    pub const GUILD_MODERATION: Self = Self(1 << 2);
    pub const GUILD_EXPRESSIONS: Self = Self(1 << 3);
    pub const GUILD_INTEGRATIONS: Self = Self(1 << 4);
    pub const GUILD_WEBHOOKS: Self = Self(1 << 5);
    pub const GUILD_INVITES: Self = Self(1 << 6);
    pub const GUILD_VOICE_STATES: Self = Self(1 << 7);
    pub const GUILD_PRESENCES: Self = Self(1 << 8);
    pub const GUILD_MESSAGES: Self = Self(1 << 9);
    pub const GUILD_MESSAGE_REACTIONS: Self = Self(1 << 10);
    pub const GUILD_MESSAGE_TYPING: Self = Self(1 << 11);
    pub const DIRECT_MESSAGES: Self = Self(1 << 12);
    pub const DIRECT_MESSAGE_REACTIONS: Self = Self(1 << 13);
    pub const DIRECT_MESSAGE_TYPING: Self = Self(1 << 14);
    pub const MESSAGE_CONTENT: Self = Self(1 << 15);

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }
}

impl BitOr for Intents {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Intents {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Client metadata sent with Identify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "pushgate".to_string(),
            device: "pushgate".to_string(),
        }
    }
}

/// Identify payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identify {
    pub token: String,
    pub properties: ConnectionProperties,
    pub compress: bool,
    pub large_threshold: u16,
    pub intents: Intents,
}

/// Resume payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resume {
    pub token: String,
    pub session_id: String,
    pub seq: u64,
}

/// Request Guild Members payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestGuildMembers {
    pub guild_id: Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presences: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<Vec<Id>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Activity advertised in a presence update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceActivity {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Presence update payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePresence {
    pub since: Option<u64>,
    pub activities: Vec<PresenceActivity>,
    pub status: String,
    pub afk: bool,
}

/// Outbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Heartbeat(Option<u64>),
    Identify(Identify),
    Resume(Resume),
    RequestGuildMembers(RequestGuildMembers),
    UpdatePresence(UpdatePresence),
}

#[derive(Serialize)]
struct OutboundFrame<'a, T: Serialize> {
    op: u8,
    d: &'a T,
}

impl Command {
    /// Opcode this command is sent with.
    #[must_use]
    pub const fn opcode(&self) -> OpCode {
        match self {
            Self::Heartbeat(_) => OpCode::Heartbeat,
            Self::Identify(_) => OpCode::Identify,
            Self::Resume(_) => OpCode::Resume,
            Self::RequestGuildMembers(_) => OpCode::RequestGuildMembers,
            Self::UpdatePresence(_) => OpCode::PresenceUpdate,
        }
    }

    /// Serialize into a text frame.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn encode(&self) -> Result<String, CodecError> {
        let op = self.opcode() as u8;
        let json = match self {
            Self::Heartbeat(seq) => serde_json::to_string(&OutboundFrame { op, d: seq }),
            Self::Identify(d) => serde_json::to_string(&OutboundFrame { op, d }),
            Self::Resume(d) => serde_json::to_string(&OutboundFrame { op, d }),
            Self::RequestGuildMembers(d) => serde_json::to_string(&OutboundFrame { op, d }),
            Self::UpdatePresence(d) => serde_json::to_string(&OutboundFrame { op, d }),
        }?;
        Ok(json)
    }
}

/// What the session should do after the remote closed the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDisposition {
    /// Reconnect and resume the existing session.
    Resume,
    /// Reconnect with a fresh Identify.
    Reidentify,
    /// Do not reconnect.
    Fatal,
}

/// Close code for authentication failure.
pub const CLOSE_AUTHENTICATION_FAILED: u16 = 4004;

/// Classify a remote close code.
#[must_use]
pub const fn classify_close(code: u16) -> CloseDisposition {
    match code {
        CLOSE_AUTHENTICATION_FAILED | 4010..=4014 => CloseDisposition::Fatal,
        1000 | 1001 | 4007 | 4009 => CloseDisposition::Reidentify,
        _ => CloseDisposition::Resume,
    }
}

/// Append the version and encoding query to a base gateway URL.
///
/// A bare host gets a `/` path so the result is a valid request target.
#[must_use]
pub fn connect_url(base: &str) -> String {
    let (base, query) = match base.split_once('?') {
        Some((base, query)) if !query.is_empty() => (base, format!("{query}&")),
        Some((base, _)) => (base, String::new()),
        None => (base, String::new()),
    };
    let base = base.trim_end_matches('/');
    let authority = base.find("://").map_or(0, |i| i + 3);
    let has_path = base.get(authority..).is_some_and(|rest| rest.contains('/'));
    let slash = if has_path { "" } else { "/" };
    format!("{base}{slash}?{query}v={API_VERSION}&encoding=json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_hello() {
        let frame = decode_text(r#"{"op":10,"d":{"heartbeat_interval":41250}}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Hello(Hello {
                heartbeat_interval: 41250
            })
        );
    }

    #[test]
    fn test_decode_dispatch() {
        let frame =
            decode_text(r#"{"op":0,"s":42,"t":"GUILD_ROLE_DELETE","d":{"role_id":"1"}}"#).unwrap();
        let InboundFrame::Dispatch(dispatch) = frame else {
            panic!("expected dispatch");
        };
        assert_eq!(dispatch.event, "GUILD_ROLE_DELETE");
        assert_eq!(dispatch.sequence, Some(42));
        assert_eq!(dispatch.data, json!({"role_id": "1"}));
    }

    #[test]
    fn test_dispatch_without_name_is_skippable() {
        let err = decode_text(r#"{"op":0,"s":3,"d":{}}"#).unwrap_err();
        assert!(matches!(err, CodecError::MissingEventName(Some(3))));
        assert!(err.is_skippable());
    }

    #[test]
    fn test_binary_fails_fast() {
        let err = decode(WireMessage::Binary(vec![0x78, 0x9c])).unwrap_err();
        assert!(matches!(err, CodecError::Binary));
        assert!(!err.is_skippable());
    }

    #[test]
    fn test_unknown_and_client_only_opcodes() {
        assert!(matches!(
            decode_text(r#"{"op":99,"d":null}"#),
            Err(CodecError::UnknownOpcode(99))
        ));
        assert!(matches!(
            decode_text(r#"{"op":2,"d":null}"#),
            Err(CodecError::UnexpectedOpcode(OpCode::Identify))
        ));
    }

    #[test]
    fn test_invalid_session_flag() {
        assert_eq!(
            decode_text(r#"{"op":9,"d":true}"#).unwrap(),
            InboundFrame::InvalidSession { resumable: true }
        );
        assert_eq!(
            decode_text(r#"{"op":9,"d":null}"#).unwrap(),
            InboundFrame::InvalidSession { resumable: false }
        );
    }

    #[test]
    fn test_close_passthrough() {
        let inbound = decode(WireMessage::Close(Some(CloseFrame::new(4004, "bad token")))).unwrap();
        assert_eq!(inbound, Inbound::Close(Some(CloseFrame::new(4004, "bad token"))));
    }

    #[test]
    fn test_encode_heartbeat() {
        assert_eq!(
            Command::Heartbeat(None).encode().unwrap(),
            r#"{"op":1,"d":null}"#
        );
        assert_eq!(
            Command::Heartbeat(Some(7)).encode().unwrap(),
            r#"{"op":1,"d":7}"#
        );
    }

    #[test]
    fn test_encode_identify() {
        let identify = Command::Identify(Identify {
            token: "tok".into(),
            properties: ConnectionProperties {
                os: "linux".into(),
                browser: "pushgate".into(),
                device: "pushgate".into(),
            },
            compress: false,
            large_threshold: 50,
            intents: Intents::GUILDS | Intents::GUILD_PRESENCES,
        });
        let value: Value = serde_json::from_str(&identify.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "op": 2,
                "d": {
                    "token": "tok",
                    "properties": {"os": "linux", "browser": "pushgate", "device": "pushgate"},
                    "compress": false,
                    "large_threshold": 50,
                    "intents": 257
                }
            })
        );
    }

    #[test]
    fn test_encode_resume() {
        let resume = Command::Resume(Resume {
            token: "tok".into(),
            session_id: "abc".into(),
            seq: 9,
        });
        let value: Value = serde_json::from_str(&resume.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"op": 6, "d": {"token": "tok", "session_id": "abc", "seq": 9}})
        );
    }

    #[test]
    fn test_request_members_skips_absent_fields() {
        let cmd = Command::RequestGuildMembers(RequestGuildMembers {
            guild_id: Id::new(5),
            query: Some(String::new()),
            limit: 0,
            presences: None,
            user_ids: None,
            nonce: None,
        });
        let value: Value = serde_json::from_str(&cmd.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"op": 8, "d": {"guild_id": "5", "query": "", "limit": 0}})
        );
    }

    #[test]
    fn test_close_classification() {
        assert_eq!(classify_close(4004), CloseDisposition::Fatal);
        assert_eq!(classify_close(4014), CloseDisposition::Fatal);
        assert_eq!(classify_close(4009), CloseDisposition::Reidentify);
        assert_eq!(classify_close(1000), CloseDisposition::Reidentify);
        assert_eq!(classify_close(4000), CloseDisposition::Resume);
        assert_eq!(classify_close(1006), CloseDisposition::Resume);
    }

    #[test]
    fn test_connect_url() {
        assert_eq!(
            connect_url("wss://gateway.example.com"),
            "wss://gateway.example.com/?v=10&encoding=json"
        );
        assert_eq!(
            connect_url("wss://gateway.example.com/"),
            "wss://gateway.example.com/?v=10&encoding=json"
        );
        assert_eq!(
            connect_url("wss://gateway.example.com?x=1"),
            "wss://gateway.example.com/?x=1&v=10&encoding=json"
        );
        assert_eq!(
            connect_url("wss://gateway.example.com/ws/"),
            "wss://gateway.example.com/ws?v=10&encoding=json"
        );
    }

    #[test]
    fn test_intents() {
        let intents = Intents::GUILDS | Intents::GUILD_EXPRESSIONS;
        assert!(intents.contains(Intents::GUILDS));
        assert!(!intents.contains(Intents::GUILD_PRESENCES));
        assert_eq!(intents.bits(), 9);
    }
}
