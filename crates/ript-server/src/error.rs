//! Server error types.

use std::io;

use ript_core::{GrammarError, NegotiationError};
use ript_protocol::{FaceName, PacketType, ProtocolError};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the relay.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (socket, listener, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (framing, encoding, etc.).
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Malformed advertisement or directive.
    #[error("Grammar error: {0}")]
    Grammar(#[from] GrammarError),

    /// Offer and answer share no direction/codec pair.
    #[error("no capability match")]
    NoCapabilityMatch,

    /// Call placed against a trunk group that is not provisioned.
    #[error("unknown trunk group: {id:?}")]
    UnknownTrunkGroup { id: String },

    /// Call references a handler URI that was never issued.
    #[error("unknown handler: {uri}")]
    UnknownHandler { uri: String },

    /// Send attempted on a face that has already closed.
    #[error("face {name} is closed")]
    FaceClosed { name: FaceName },

    /// The face's outbound buffer is full.
    #[error("face {name} outbound buffer is full")]
    FaceBufferFull { name: FaceName },

    /// A live face already uses this name.
    #[error("face {name} is already registered")]
    DuplicateFace { name: FaceName },

    /// No face with this name is known.
    #[error("unknown face: {name}")]
    UnknownFace { name: FaceName },

    /// A packet type that must never reach the router did.
    #[error("protocol violation: {packet_type:?} from {sender} is not routable")]
    ProtocolViolation {
        sender: FaceName,
        packet_type: PacketType,
    },

    /// WebSocket handshake or transport failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The router has stopped accepting events.
    #[error("router is shut down")]
    Shutdown,
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn unknown_trunk_group(id: impl Into<String>) -> Self {
        Self::UnknownTrunkGroup { id: id.into() }
    }

    pub fn unknown_handler(uri: impl Into<String>) -> Self {
        Self::UnknownHandler { uri: uri.into() }
    }

    /// Returns true for failures of the transport under a face.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Self::FaceClosed { .. } | Self::FaceBufferFull { .. } | Self::Io(_) | Self::WebSocket(_)
        )
    }
}

impl From<NegotiationError> for ServerError {
    fn from(err: NegotiationError) -> Self {
        match err {
            NegotiationError::Grammar(e) => Self::Grammar(e),
            NegotiationError::NoCapabilityMatch => Self::NoCapabilityMatch,
        }
    }
}
