//! Relay: faces, router, content cache, RIPT service.
//!
//! This crate provides the relay core that:
//! - Accepts endpoints over TCP, WebSocket, in-process channels or polling
//! - Routes packets between them through a single dispatch loop
//! - Caches content transfers for later pull requests
//! - Answers trunk-group discovery, handler registration and call placement
//!
//! # Example
//!
//! ```rust,no_run
//! use ript_server::{
//!     ListenerConfig, RelayConfig, RiptService, Router, TcpFaceServer, new_shared_service,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RelayConfig::default();
//!     config.validate()?;
//!
//!     let service = new_shared_service(RiptService::from_config(&config)?);
//!     let router = Router::start(&config, service);
//!
//!     let mut tcp = TcpFaceServer::bind("0.0.0.0:7000", ListenerConfig::default()).await?;
//!     router.add_face_factory(&mut tcp)?;
//!     Ok(())
//! }
//! ```

mod cache;
mod config;
mod error;
mod face;
mod router;
mod service;
mod signals;

pub use cache::ContentCache;
pub use config::{
    DEFAULT_TRUNK_GROUP_ID, DEFAULT_TRUNK_GROUP_MEDIA, ListenerConfig, RelayConfig,
    TrunkDirection, TrunkGroupConfig,
};
pub use error::{ServerError, ServerResult};
pub use face::{
    ChannelFace, ChannelPeer, CloseNotifier, CloseReason, Face, FaceCore, FaceFactory, OnClose,
    PollFace, PollFaceRegistry, StreamFace, TcpFaceServer, WebSocketFace, WebSocketFaceServer,
};
pub use router::{FaceId, Router};
pub use service::{
    BASE_URL, Call, Handler, RiptService, SharedService, TRUNK_GROUPS_URL, TrunkGroup,
    new_shared_service,
};
pub use signals::{ShutdownSignal, SignalHandler};
