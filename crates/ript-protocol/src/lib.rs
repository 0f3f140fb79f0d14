//! Packet model and transport framing for the RIPT relay.
//!
//! A [`Packet`] is tagged with a stable numeric [`PacketType`]. Stream and
//! WebSocket transports wrap each packet in a [`Frame`]; stream transports
//! additionally length-prefix the JSON:
//!
//! - 4 bytes: payload length (u32, big-endian)
//! - N bytes: JSON [`Frame`]
//!
//! ```rust
//! use ript_protocol::{Frame, Packet, decode_frame, encode_frame};
//!
//! let frame = Frame::new(Packet::discover_trunk_groups()).with_trunk_group("trunkAbc");
//! let bytes = encode_frame(&frame).unwrap();
//! let decoded: Frame = decode_frame(&bytes).unwrap();
//! assert_eq!(decoded, frame);
//! ```

mod error;
mod frame;
mod framing;
mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use frame::Frame;
pub use framing::{LENGTH_PREFIX_LEN, decode_frame, decode_payload, encode_frame, payload_len};
pub use types::{
    CallRequest, CallResponse, CallsMessage, ContentFilter, ContentHash, ContentMessage,
    ContentRequestMessage, DeliveryAddress, FaceName, HandlerRequest, HandlerResponse, Packet,
    PacketEvent, PacketType, RegisterHandlerMessage, StreamContentAckMessage,
    StreamContentMessage, StreamContentRequestMessage, TrunkGroupInfo, TrunkGroupsInfoMessage,
};

/// Protocol version carried in every [`Frame`].
pub const PROTOCOL_VERSION: &str = "1";

/// Maximum frame payload size (1 MB).
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;
