//! Packets and message payloads of the RIPT relay protocol.

use std::fmt;

use ript_core::{Advertisement, Directive};
use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::ProtocolError;

/// Name of a connected endpoint, unique among live faces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceName(String);

impl FaceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FaceName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for FaceName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Destination of content messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryAddress(String);

impl DeliveryAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeliveryAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

/// Packet type tags. The numeric values are part of the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum PacketType {
    TrunkGroupDiscovery = 1,
    RegisterHandler = 2,
    Calls = 3,
    Content = 4,
    ContentRequest = 5,
    StreamContent = 6,
    StreamContentAck = 7,
    StreamContentRequest = 8,
}

impl From<PacketType> for u8 {
    fn from(packet_type: PacketType) -> Self {
        packet_type as u8
    }
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Ok(match tag {
            1 => Self::TrunkGroupDiscovery,
            2 => Self::RegisterHandler,
            3 => Self::Calls,
            4 => Self::Content,
            5 => Self::ContentRequest,
            6 => Self::StreamContent,
            7 => Self::StreamContentAck,
            8 => Self::StreamContentRequest,
            other => return Err(ProtocolError::UnknownPacketType(other)),
        })
    }
}

/// SHA-256 digest identifying a piece of content.
pub type ContentHash = [u8; 32];

/// Opaque content addressed to a delivery address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMessage {
    pub to: DeliveryAddress,
    /// Sequence number, monotonic per destination.
    pub id: i32,
    #[serde(default)]
    pub content: Vec<u8>,
}

impl ContentMessage {
    pub fn new(to: impl Into<DeliveryAddress>, id: i32, content: impl Into<Vec<u8>>) -> Self {
        Self {
            to: to.into(),
            id,
            content: content.into(),
        }
    }

    /// Digest over the content bytes. Used for identity only.
    pub fn hash(&self) -> ContentHash {
        Sha256::digest(&self.content).into()
    }
}

/// Pull request for cached content. `id == -1` asks for the latest entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRequestMessage {
    pub to: DeliveryAddress,
    pub id: i32,
}

impl ContentRequestMessage {
    /// Id that selects the most recently added content.
    pub const LATEST: i32 = -1;

    pub fn new(to: impl Into<DeliveryAddress>, id: i32) -> Self {
        Self { to: to.into(), id }
    }

    pub fn latest(to: impl Into<DeliveryAddress>) -> Self {
        Self::new(to, Self::LATEST)
    }
}

/// A provisioned trunk group as seen by clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrunkGroupInfo {
    pub uri: String,
}

/// Trunk-group discovery. Empty in requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrunkGroupsInfoMessage {
    #[serde(default)]
    pub trunk_groups: Vec<TrunkGroupInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerRequest {
    #[serde(rename = "handler-id")]
    pub handler_id: String,
    pub advertisement: Advertisement,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerResponse {
    pub uri: String,
}

/// Handler registration. Requests fill `request`, responses fill `response`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterHandlerMessage {
    pub request: HandlerRequest,
    pub response: HandlerResponse,
}

impl RegisterHandlerMessage {
    pub fn request(handler_id: impl Into<String>, advertisement: impl Into<Advertisement>) -> Self {
        Self {
            request: HandlerRequest {
                handler_id: handler_id.into(),
                advertisement: advertisement.into(),
            },
            response: HandlerResponse::default(),
        }
    }

    pub fn response(uri: impl Into<String>) -> Self {
        Self {
            request: HandlerRequest::default(),
            response: HandlerResponse { uri: uri.into() },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallRequest {
    pub handler_uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallResponse {
    pub call_uri: String,
    pub client_directive: Directive,
    pub server_directive: Directive,
}

/// Call placement. Requests fill `request`, responses fill `response`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallsMessage {
    pub request: CallRequest,
    pub response: CallResponse,
}

impl CallsMessage {
    pub fn request(handler_uri: impl Into<String>) -> Self {
        Self {
            request: CallRequest {
                handler_uri: handler_uri.into(),
            },
            response: CallResponse::default(),
        }
    }

    pub fn response(response: CallResponse) -> Self {
        Self {
            request: CallRequest::default(),
            response,
        }
    }
}

/// Which way a media frame travels relative to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentFilter {
    #[default]
    MediaForward,
    MediaReverse,
}

/// One streamed media frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamContentMessage {
    #[serde(default)]
    pub filter: ContentFilter,
    pub content: ContentMessage,
}

/// Receipt for a streamed media frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamContentAckMessage {
    pub to: DeliveryAddress,
    pub id: i32,
}

/// Pull request for streamed media on request/response transports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamContentRequestMessage {
    pub to: DeliveryAddress,
    /// First frame id wanted.
    pub from_id: i32,
}

/// A protocol packet.
///
/// On the wire a packet is `{"type": <tag>, "body": <payload>}`; the tag
/// selects how the body is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    TrunkGroupDiscovery(TrunkGroupsInfoMessage),
    RegisterHandler(RegisterHandlerMessage),
    Calls(CallsMessage),
    Content(ContentMessage),
    ContentRequest(ContentRequestMessage),
    StreamContent(StreamContentMessage),
    StreamContentAck(StreamContentAckMessage),
    StreamContentRequest(StreamContentRequestMessage),
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::TrunkGroupDiscovery(_) => PacketType::TrunkGroupDiscovery,
            Self::RegisterHandler(_) => PacketType::RegisterHandler,
            Self::Calls(_) => PacketType::Calls,
            Self::Content(_) => PacketType::Content,
            Self::ContentRequest(_) => PacketType::ContentRequest,
            Self::StreamContent(_) => PacketType::StreamContent,
            Self::StreamContentAck(_) => PacketType::StreamContentAck,
            Self::StreamContentRequest(_) => PacketType::StreamContentRequest,
        }
    }

    /// Empty trunk-group discovery request.
    pub fn discover_trunk_groups() -> Self {
        Self::TrunkGroupDiscovery(TrunkGroupsInfoMessage::default())
    }
}

impl Serialize for Packet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Packet", 2)?;
        state.serialize_field("type", &self.packet_type())?;
        match self {
            Self::TrunkGroupDiscovery(m) => state.serialize_field("body", m)?,
            Self::RegisterHandler(m) => state.serialize_field("body", m)?,
            Self::Calls(m) => state.serialize_field("body", m)?,
            Self::Content(m) => state.serialize_field("body", m)?,
            Self::ContentRequest(m) => state.serialize_field("body", m)?,
            Self::StreamContent(m) => state.serialize_field("body", m)?,
            Self::StreamContentAck(m) => state.serialize_field("body", m)?,
            Self::StreamContentRequest(m) => state.serialize_field("body", m)?,
        }
        state.end()
    }
}

#[derive(Deserialize)]
struct RawPacket {
    #[serde(rename = "type")]
    tag: u8,
    #[serde(default)]
    body: serde_json::Value,
}

impl<'de> Deserialize<'de> for Packet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawPacket::deserialize(deserializer)?;
        let packet_type = PacketType::try_from(raw.tag).map_err(D::Error::custom)?;

        // A missing body reads as the zero value of the payload.
        let body = match raw.body {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            body => body,
        };

        let packet = match packet_type {
            PacketType::TrunkGroupDiscovery => {
                serde_json::from_value(body).map(Self::TrunkGroupDiscovery)
            }
            PacketType::RegisterHandler => serde_json::from_value(body).map(Self::RegisterHandler),
            PacketType::Calls => serde_json::from_value(body).map(Self::Calls),
            PacketType::Content => serde_json::from_value(body).map(Self::Content),
            PacketType::ContentRequest => serde_json::from_value(body).map(Self::ContentRequest),
            PacketType::StreamContent => serde_json::from_value(body).map(Self::StreamContent),
            PacketType::StreamContentAck => {
                serde_json::from_value(body).map(Self::StreamContentAck)
            }
            PacketType::StreamContentRequest => {
                serde_json::from_value(body).map(Self::StreamContentRequest)
            }
        };
        packet.map_err(D::Error::custom)
    }
}

/// An inbound packet tagged with the face it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketEvent {
    pub sender: FaceName,
    /// Trunk group addressed by the request, if the transport carries one.
    pub tg_id: Option<String>,
    pub call_id: Option<String>,
    pub packet: Packet,
}

impl PacketEvent {
    pub fn new(sender: FaceName, packet: Packet) -> Self {
        Self {
            sender,
            tg_id: None,
            call_id: None,
            packet,
        }
    }

    pub fn with_trunk_group(mut self, tg_id: impl Into<String>) -> Self {
        self.tg_id = Some(tg_id.into());
        self
    }

    pub fn with_call(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_type_tags_are_stable() {
        let tags: Vec<u8> = [
            PacketType::TrunkGroupDiscovery,
            PacketType::RegisterHandler,
            PacketType::Calls,
            PacketType::Content,
            PacketType::ContentRequest,
            PacketType::StreamContent,
            PacketType::StreamContentAck,
            PacketType::StreamContentRequest,
        ]
        .into_iter()
        .map(u8::from)
        .collect();
        assert_eq!(tags, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(matches!(
            PacketType::try_from(0),
            Err(ProtocolError::UnknownPacketType(0))
        ));
        assert!(matches!(
            PacketType::try_from(42),
            Err(ProtocolError::UnknownPacketType(42))
        ));
        assert!(serde_json::from_str::<Packet>(r#"{"type":42,"body":{}}"#).is_err());
    }

    #[test]
    fn content_request_wire_format() {
        let packet = Packet::ContentRequest(ContentRequestMessage::latest("room-1"));
        let json = serde_json::to_string(&packet).unwrap();
        insta::assert_snapshot!(json, @r#"{"type":5,"body":{"to":"room-1","id":-1}}"#);
    }

    #[test]
    fn register_handler_wire_format() {
        let packet = Packet::RegisterHandler(RegisterHandlerMessage::request(
            "client-a",
            "1 in: opus;\n",
        ));
        let json = serde_json::to_string(&packet).unwrap();
        insta::assert_snapshot!(
            json,
            @r#"{"type":2,"body":{"request":{"handler-id":"client-a","advertisement":"1 in: opus;\n"},"response":{"uri":""}}}"#
        );
    }

    #[test]
    fn missing_body_reads_as_zero_value() {
        let packet: Packet = serde_json::from_str(r#"{"type":1}"#).unwrap();
        assert_eq!(packet, Packet::discover_trunk_groups());

        let packet: Packet = serde_json::from_str(r#"{"type":3,"body":{}}"#).unwrap();
        assert_eq!(packet, Packet::Calls(CallsMessage::default()));
    }

    #[test]
    fn calls_packet_decodes_request() {
        let json = r#"{"type":3,"body":{"request":{"handler_uri":"/h/1"}}}"#;
        let packet: Packet = serde_json::from_str(json).unwrap();
        assert_eq!(packet, Packet::Calls(CallsMessage::request("/h/1")));
    }

    #[test]
    fn content_packet_survives_json() {
        let packet = Packet::Content(ContentMessage::new("room-1", 7, b"frame".to_vec()));
        let json = serde_json::to_vec(&packet).unwrap();
        let decoded: Packet = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn content_hash_depends_only_on_bytes() {
        let a = ContentMessage::new("a", 1, b"same".to_vec());
        let b = ContentMessage::new("b", 2, b"same".to_vec());
        let c = ContentMessage::new("a", 1, b"other".to_vec());
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn packet_event_builders() {
        let evt = PacketEvent::new("face-a".into(), Packet::discover_trunk_groups())
            .with_trunk_group("trunkAbc")
            .with_call("call-1");
        assert_eq!(evt.sender.as_str(), "face-a");
        assert_eq!(evt.tg_id.as_deref(), Some("trunkAbc"));
        assert_eq!(evt.call_id.as_deref(), Some("call-1"));
    }
}
