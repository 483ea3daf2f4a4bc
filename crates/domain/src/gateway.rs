//! Gateway wire protocol: frames, opcodes, events, recipient selectors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{ChannelId, UserId};
use crate::permissions::Permissions;

/// Frame opcode on the WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Opcode {
    /// Server → client: a domain event with a sequence number.
    Dispatch,
    /// Client → server: authenticate a fresh connection.
    Identify,
    /// Client → server: resume an existing session.
    Resume,
    /// Server → client: liveness probe.
    Heartbeat,
    /// Client → server: heartbeat acknowledgement.
    HeartbeatAck,
    /// Server → client: session cannot be resumed; re-identify.
    InvalidSession,
    /// Server → client: identify accepted, carries the state snapshot.
    Ready,
    /// Server → client: resume accepted, replay complete.
    Resumed,
    /// Server → client: first frame, carries the heartbeat interval.
    Hello,
}

/// One JSON frame on the wire: `{ "op", "d", "s", "t" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayFrame {
    /// Frame opcode.
    pub op: Opcode,
    /// Opcode-specific payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub d: Value,
    /// Per-session sequence number; only present on dispatch frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    /// Event name; only present on dispatch frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayFrame {
    /// Builds a non-dispatch control frame.
    #[must_use]
    pub fn control(op: Opcode, payload: Value) -> Self {
        Self {
            op,
            d: payload,
            s: None,
            t: None,
        }
    }

    /// Builds a dispatch frame carrying a sequenced event.
    #[must_use]
    pub fn dispatch(seq: u64, event_name: &str, payload: Value) -> Self {
        Self {
            op: Opcode::Dispatch,
            d: payload,
            s: Some(seq),
            t: Some(event_name.to_owned()),
        }
    }
}

/// Event name constants dispatched over the gateway.
pub mod event_names {
    /// A message was posted.
    pub const MESSAGE_CREATE: &str = "MESSAGE_CREATE";
    /// A message was edited.
    pub const MESSAGE_UPDATE: &str = "MESSAGE_UPDATE";
    /// A message was deleted.
    pub const MESSAGE_DELETE: &str = "MESSAGE_DELETE";
    /// A channel was created.
    pub const CHANNEL_CREATE: &str = "CHANNEL_CREATE";
    /// A channel was updated.
    pub const CHANNEL_UPDATE: &str = "CHANNEL_UPDATE";
    /// A channel was deleted.
    pub const CHANNEL_DELETE: &str = "CHANNEL_DELETE";
    /// A category was created.
    pub const CATEGORY_CREATE: &str = "CATEGORY_CREATE";
    /// A category was updated.
    pub const CATEGORY_UPDATE: &str = "CATEGORY_UPDATE";
    /// A category was deleted.
    pub const CATEGORY_DELETE: &str = "CATEGORY_DELETE";
    /// A role was created.
    pub const ROLE_CREATE: &str = "ROLE_CREATE";
    /// A role was updated.
    pub const ROLE_UPDATE: &str = "ROLE_UPDATE";
    /// A role was deleted.
    pub const ROLE_DELETE: &str = "ROLE_DELETE";
    /// A member's roles, nickname, or status changed.
    pub const MEMBER_UPDATE: &str = "MEMBER_UPDATE";
    /// A member joined the server.
    pub const MEMBER_JOIN: &str = "MEMBER_JOIN";
    /// A member left or was removed.
    pub const MEMBER_LEAVE: &str = "MEMBER_LEAVE";
    /// A ban was added.
    pub const BAN_ADD: &str = "BAN_ADD";
    /// A ban was lifted.
    pub const BAN_REMOVE: &str = "BAN_REMOVE";
    /// A channel permission override changed.
    pub const PERMISSION_OVERRIDE_UPDATE: &str = "PERMISSION_OVERRIDE_UPDATE";
}

/// Describes the intended audience of a published event.
///
/// Selectors are evaluated into a concrete set of user ids at publish
/// time, never at delivery time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecipientSelector {
    /// Every active or timed-out member of the server.
    Server,
    /// Members of a channel who hold `VIEW_CHANNELS` there.
    Channel {
        /// The channel in question.
        channel_id: ChannelId,
    },
    /// One specific user, on every session they have open.
    User {
        /// The user in question.
        user_id: UserId,
    },
    /// Members of a channel holding an arbitrary permission there.
    ChannelWithPermission {
        /// The channel in question.
        channel_id: ChannelId,
        /// The permission recipients must hold in that channel.
        required: Permissions,
    },
}

/// A domain event ready for recipient resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundEvent {
    /// Event name (see [`event_names`]).
    pub name: String,
    /// Event payload.
    pub payload: Value,
    /// Intended audience.
    pub selector: RecipientSelector,
}

impl OutboundEvent {
    /// Builds an event.
    #[must_use]
    pub fn new(name: &str, payload: Value, selector: RecipientSelector) -> Self {
        Self {
            name: name.to_owned(),
            payload,
            selector,
        }
    }
}

/// An event with its audience already resolved to concrete user ids, as
/// published on the cross-process event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event name.
    pub name: String,
    /// Event payload.
    pub payload: Value,
    /// Concrete recipient user ids.
    pub recipients: Vec<UserId>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn dispatch_frame_serialises_all_fields() {
        let frame = GatewayFrame::dispatch(7, event_names::MESSAGE_CREATE, json!({"id": "m1"}));
        let value = serde_json::to_value(&frame).unwrap_or_default();
        assert_eq!(value["op"], "dispatch");
        assert_eq!(value["s"], 7);
        assert_eq!(value["t"], "MESSAGE_CREATE");
        assert_eq!(value["d"]["id"], "m1");
    }

    #[test]
    fn control_frame_omits_seq_and_event_name() {
        let frame = GatewayFrame::control(Opcode::Hello, json!({"heartbeat_interval_ms": 30000}));
        let value = serde_json::to_value(&frame).unwrap_or_default();
        assert_eq!(value["op"], "hello");
        assert!(value.get("s").is_none());
        assert!(value.get("t").is_none());
    }

    #[test]
    fn identify_frame_parses() {
        let raw = r#"{"op":"identify","d":{"token":"abc"}}"#;
        let frame: Result<GatewayFrame, _> = serde_json::from_str(raw);
        let frame = match frame {
            Ok(frame) => frame,
            Err(error) => panic!("frame should parse: {error}"),
        };
        assert_eq!(frame.op, Opcode::Identify);
        assert_eq!(frame.d["token"], "abc");
    }

    #[test]
    fn selector_serialisation_is_tagged() {
        let selector = RecipientSelector::Channel {
            channel_id: ChannelId::new(),
        };
        let value = serde_json::to_value(&selector).unwrap_or_default();
        assert_eq!(value["kind"], "channel");
    }
}
