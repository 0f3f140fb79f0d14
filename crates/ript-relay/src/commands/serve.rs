//! Serve command: runs the relay in the foreground.
//!
//! Wires the pieces together:
//! - Signal handler (SIGTERM/SIGINT for shutdown)
//! - RIPT service provisioned from the trunk-group config
//! - Router with its dispatch loop
//! - TCP and WebSocket listeners feeding faces to the router

use ript_server::{
    RiptService, Router, SignalHandler, TcpFaceServer, WebSocketFaceServer, new_shared_service,
};
use tracing::info;

use crate::config::FileConfig;
use crate::error::RelayResult;

/// Runs the relay until a shutdown signal is received.
pub async fn run(config: &FileConfig) -> RelayResult<()> {
    config.validate()?;

    let signal_handler = SignalHandler::new();
    signal_handler.spawn_listener();

    let service = new_shared_service(RiptService::from_config(&config.relay)?);
    let router = Router::start(&config.relay, service);
    let listener = config.listener_config();

    let mut tcp = None;
    if config.listen.tcp {
        let mut server = TcpFaceServer::bind(config.listen.tcp_addr(), listener).await?;
        router.add_face_factory(&mut server)?;
        info!(addr = %server.local_addr(), "TCP faces enabled");
        tcp = Some(server);
    }

    let mut websocket = None;
    if config.listen.websocket {
        let mut server = WebSocketFaceServer::bind(config.listen.ws_addr(), listener).await?;
        router.add_face_factory(&mut server)?;
        info!(addr = %server.local_addr(), "WebSocket faces enabled");
        websocket = Some(server);
    }

    info!(router = %router.name(), "Router is ready to serve");
    signal_handler.shutdown().wait().await;

    info!("Shutting down...");
    drop(tcp);
    drop(websocket);
    router.shutdown();

    info!(uptime_seconds = router.uptime_seconds(), "Relay stopped");
    Ok(())
}
