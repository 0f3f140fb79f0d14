//! Transport frame carrying one packet plus routing context.

use serde::{Deserialize, Serialize};

use crate::PROTOCOL_VERSION;
use crate::types::{FaceName, Packet, PacketEvent};

/// The unit exchanged by stream and WebSocket faces.
///
/// `tg_id` and `call_id` stand in for what URL-routed transports carry in
/// the request path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub protocol_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tg_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub packet: Packet,
}

impl Frame {
    pub fn new(packet: Packet) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
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

    pub fn is_compatible(&self) -> bool {
        self.protocol_version == PROTOCOL_VERSION
    }

    /// Tags the frame with the face it arrived on.
    pub fn into_event(self, sender: FaceName) -> PacketEvent {
        PacketEvent {
            sender,
            tg_id: self.tg_id,
            call_id: self.call_id,
            packet: self.packet,
        }
    }
}

impl From<Packet> for Frame {
    fn from(packet: Packet) -> Self {
        Self::new(packet)
    }
}
