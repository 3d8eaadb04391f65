//! Inbound events pushed by the native P2P core.
//!
//! The native core reports eight event categories through its callback
//! surface. This module collapses them into a single tagged enum so the
//! rest of the layer (queue, registry, handlers) can treat them uniformly,
//! and so FFI consumers can switch on a JSON `type` field.

use std::fmt;

use serde::{Serialize, Serializer};

/// Stable numeric peer identifier assigned by the native core.
///
/// Opaque to this layer and unique for the lifetime of the process —
/// the registry never reuses an identifier once it has been tombstoned.
pub type PeerId = u32;

/// Size of a peer public key, matching the native core.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Maximum display name length accepted from the core, in bytes.
pub const MAX_NAME_LENGTH: usize = 128;
/// Maximum status message length accepted from the core, in bytes.
pub const MAX_STATUS_MESSAGE_LENGTH: usize = 1007;
/// Maximum friend request message length, in bytes.
pub const MAX_FRIEND_REQUEST_LENGTH: usize = 1016;
/// Maximum chat message length, in bytes.
pub const MAX_MESSAGE_LENGTH: usize = 1372;
/// Maximum lossless packet size, in bytes.
pub const MAX_PACKET_SIZE: usize = 1373;

/// Connection status of the local client or of a single peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No connection established.
    Offline,
    /// Connected through a TCP relay only.
    Relayed,
    /// Direct UDP connection.
    Udp,
}

impl ConnectionStatus {
    /// Map the raw C-side discriminant. Unknown values are a malformed
    /// payload, not a panic — the core's callback contract has no room
    /// for unwinding.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Offline),
            1 => Some(Self::Relayed),
            2 => Some(Self::Udp),
            _ => None,
        }
    }
}

/// Self-reported availability of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Available,
    Away,
    Busy,
}

impl UserStatus {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Available),
            1 => Some(Self::Away),
            2 => Some(Self::Busy),
            _ => None,
        }
    }
}

/// Kind of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Ordinary text message.
    Normal,
    /// `/me`-style action message.
    Action,
}

impl MessageKind {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Normal),
            1 => Some(Self::Action),
            _ => None,
        }
    }
}

/// A peer's long-term public key.
///
/// Serialized and displayed as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// Build from a raw byte slice. Returns `None` unless the slice is
    /// exactly [`PUBLIC_KEY_SIZE`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        <[u8; PUBLIC_KEY_SIZE]>::try_from(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

fn hex_bytes<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

/// One notification from the native core, with independently-owned payload.
///
/// Created by the [`EventBridge`](crate::bridge::EventBridge) while the
/// core's poll loop is inside a callback; consumed exactly once by the
/// dispatch consumer thread. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    /// The local client's connection to the network changed.
    ConnectionStatusChanged { status: ConnectionStatus },

    /// Someone asked to become a friend. Requests precede friendship, so
    /// there is no peer id yet — only the sender's public key.
    FriendRequest { public_key: PublicKey, message: String },

    /// A peer changed their display name.
    NameChanged { peer: PeerId, name: String },

    /// A peer changed their status message.
    StatusMessageChanged { peer: PeerId, message: String },

    /// A peer changed their availability.
    UserStatusChanged { peer: PeerId, status: UserStatus },

    /// The connection to a single peer changed.
    PeerConnectionChanged { peer: PeerId, status: ConnectionStatus },

    /// A chat message arrived from a peer.
    MessageReceived {
        peer: PeerId,
        kind: MessageKind,
        text: String,
    },

    /// An application-defined lossless packet arrived from a peer.
    LosslessPacket {
        peer: PeerId,
        #[serde(serialize_with = "hex_bytes")]
        data: Vec<u8>,
    },
}

impl InboundEvent {
    /// The peer this event concerns, if it carries a peer id.
    ///
    /// Self connection changes and friend requests have none.
    pub fn peer(&self) -> Option<PeerId> {
        match self {
            Self::ConnectionStatusChanged { .. } | Self::FriendRequest { .. } => None,
            Self::NameChanged { peer, .. }
            | Self::StatusMessageChanged { peer, .. }
            | Self::UserStatusChanged { peer, .. }
            | Self::PeerConnectionChanged { peer, .. }
            | Self::MessageReceived { peer, .. }
            | Self::LosslessPacket { peer, .. } => Some(*peer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_discriminants_map() {
        assert_eq!(ConnectionStatus::from_raw(0), Some(ConnectionStatus::Offline));
        assert_eq!(ConnectionStatus::from_raw(2), Some(ConnectionStatus::Udp));
        assert_eq!(ConnectionStatus::from_raw(7), None);
        assert_eq!(UserStatus::from_raw(1), Some(UserStatus::Away));
        assert_eq!(UserStatus::from_raw(200), None);
        assert_eq!(MessageKind::from_raw(1), Some(MessageKind::Action));
        assert_eq!(MessageKind::from_raw(2), None);
    }

    #[test]
    fn public_key_roundtrip() {
        let key = PublicKey::from_bytes(&[0xab; 32]).unwrap();
        assert_eq!(key.to_string(), "ab".repeat(32));
        assert!(PublicKey::from_bytes(&[0u8; 31]).is_none());
    }

    #[test]
    fn event_json_is_tagged() {
        let event = InboundEvent::MessageReceived {
            peer: 7,
            kind: MessageKind::Normal,
            text: "hi".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message_received");
        assert_eq!(json["data"]["peer"], 7);
        assert_eq!(json["data"]["kind"], "normal");
        assert_eq!(json["data"]["text"], "hi");
    }

    #[test]
    fn packet_bytes_serialize_as_hex() {
        let event = InboundEvent::LosslessPacket {
            peer: 1,
            data: vec![0xa0, 0x01, 0xff],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["data"]["data"], "a001ff");
    }

    #[test]
    fn peer_accessor() {
        let event = InboundEvent::ConnectionStatusChanged {
            status: ConnectionStatus::Udp,
        };
        assert_eq!(event.peer(), None);

        let event = InboundEvent::NameChanged {
            peer: 3,
            name: "Alice".to_string(),
        };
        assert_eq!(event.peer(), Some(3));
    }
}
