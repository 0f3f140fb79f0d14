//! WebSocket faces: one JSON [`Frame`] per text message.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use ript_protocol::{FaceName, Frame, Packet, PacketEvent};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, error, info, warn};

use super::{CloseReason, Face, FaceCore, FaceFactory, OnClose};
use crate::config::ListenerConfig;
use crate::error::ServerResult;

/// A face over a WebSocket connection.
#[derive(Debug)]
pub struct WebSocketFace {
    core: FaceCore,
}

impl WebSocketFace {
    /// Wraps an upgraded connection and starts its reader and writer.
    pub fn spawn<S>(ws: WebSocketStream<S>, name: FaceName, capacity: usize) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (core, outbound) = FaceCore::new(name, capacity);
        let face = Arc::new(Self { core });

        let (sink, stream) = ws.split();
        tokio::spawn(write_loop(Arc::clone(&face), sink, outbound));
        tokio::spawn(read_loop(Arc::clone(&face), stream));

        debug!(face = %face.core.name(), "WebSocket face started");
        face
    }

    /// Dials a relay at `url` (`ws://host:port/`).
    pub async fn connect(url: &str, capacity: usize) -> ServerResult<Arc<Self>> {
        let (ws, _response) = tokio_tungstenite::connect_async(url).await?;
        Ok(Self::spawn(ws, FaceName::new(url), capacity))
    }
}

impl Face for WebSocketFace {
    fn name(&self) -> &FaceName {
        self.core.name()
    }

    fn send(&self, packet: Packet) -> ServerResult<()> {
        self.core.enqueue(packet)
    }

    fn set_receive_chan(&self, sink: mpsc::Sender<PacketEvent>) {
        self.core.set_sink(sink);
    }

    fn close(&self, reason: CloseReason) {
        self.core.close(reason);
    }

    fn on_close(&self) -> OnClose {
        self.core.on_close()
    }

    fn can_stream(&self) -> bool {
        true
    }
}

async fn write_loop<S>(
    face: Arc<WebSocketFace>,
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut outbound: mpsc::Receiver<Packet>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let on_close = face.on_close();
    tokio::pin! {
        let closed = on_close.wait();
    }

    let reason = loop {
        let packet = tokio::select! {
            reason = &mut closed => break reason,
            packet = outbound.recv() => match packet {
                Some(packet) => packet,
                None => break None,
            },
        };

        let text = match serde_json::to_string(&Frame::new(packet)) {
            Ok(text) => text,
            Err(e) => {
                warn!(face = %face.core.name(), error = %e, "Failed to encode frame");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(text.into())).await {
            face.close(Some(e.to_string()));
            return;
        }
    };

    let frame = match reason {
        None => CloseFrame {
            code: CloseCode::Normal,
            reason: String::new().into(),
        },
        Some(reason) => CloseFrame {
            code: CloseCode::Error,
            reason: reason.into(),
        },
    };
    let _ = sink.send(Message::Close(Some(frame))).await;
    let _ = sink.close().await;
}

async fn read_loop<S>(face: Arc<WebSocketFace>, mut stream: SplitStream<WebSocketStream<S>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let on_close = face.on_close();
    tokio::pin! {
        let closed = on_close.wait();
    }

    loop {
        let message = tokio::select! {
            _ = &mut closed => break,
            message = stream.next() => message,
        };

        match message {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<Frame>(&text) {
                Ok(frame) if frame.is_compatible() => {
                    let event = frame.into_event(face.core.name().clone());
                    face.core.deliver(event).await;
                }
                Ok(frame) => {
                    warn!(
                        face = %face.core.name(),
                        version = %frame.protocol_version,
                        "Dropping frame with incompatible protocol version"
                    );
                }
                Err(e) => {
                    warn!(face = %face.core.name(), error = %e, "Dropping undecodable frame");
                }
            },
            Some(Ok(Message::Close(frame))) => {
                let reason = frame
                    .filter(|f| f.code != CloseCode::Normal)
                    .map(|f| format!("WebSocket closed [{}]", u16::from(f.code)));
                face.close(reason);
                break;
            }
            Some(Ok(Message::Binary(_))) => {
                warn!(face = %face.core.name(), "Ignoring binary WebSocket message");
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                face.close(Some(e.to_string()));
                break;
            }
            None => {
                face.close(None);
                break;
            }
        }
    }
}

/// WebSocket listener that turns upgraded connections into [`WebSocketFace`]s.
pub struct WebSocketFaceServer {
    local_addr: SocketAddr,
    feed: Option<mpsc::Receiver<Arc<dyn Face>>>,
    accept_task: JoinHandle<()>,
}

impl WebSocketFaceServer {
    pub async fn bind(addr: impl ToSocketAddrs, config: ListenerConfig) -> ServerResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "WebSocket face listener ready");

        let (tx, rx) = mpsc::channel(config.feed_capacity.max(1));
        let semaphore = Arc::new(Semaphore::new(config.max_connections));
        let accept_task = tokio::spawn(accept_loop(listener, semaphore, tx, config));

        Ok(Self {
            local_addr,
            feed: Some(rx),
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl FaceFactory for WebSocketFaceServer {
    fn feed(&mut self) -> Option<mpsc::Receiver<Arc<dyn Face>>> {
        self.feed.take()
    }
}

impl Drop for WebSocketFaceServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    semaphore: Arc<Semaphore>,
    feed: mpsc::Sender<Arc<dyn Face>>,
    config: ListenerConfig,
) {
    loop {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };

        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
                continue;
            }
        };

        let feed = feed.clone();
        tokio::spawn(async move {
            let ws = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!(%addr, error = %e, "WebSocket handshake failed");
                    return;
                }
            };
            debug!(%addr, "Accepted WebSocket connection");

            let name = FaceName::new(addr.to_string());
            let face = WebSocketFace::spawn(ws, name, config.face_buffer_capacity);
            let on_close = face.on_close();
            if feed.send(face).await.is_err() {
                debug!(%addr, "Face feed closed, dropping connection");
                return;
            }
            // Hold the connection slot until the face closes.
            on_close.wait().await;
            drop(permit);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::router::Router;
    use crate::service::{RiptService, new_shared_service};
    use ript_protocol::ContentMessage;
    use std::time::Duration;

    async fn connected() -> (
        WebSocketFaceServer,
        Arc<dyn Face>,
        WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    ) {
        let mut server = WebSocketFaceServer::bind("127.0.0.1:0", ListenerConfig::default())
            .await
            .unwrap();
        let mut feed = server.feed().unwrap();
        let url = format!("ws://{}/", server.local_addr());
        let (client, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        let face = tokio::time::timeout(Duration::from_secs(2), feed.recv())
            .await
            .unwrap()
            .unwrap();
        (server, face, client)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn requests_sent_right_after_handshake_are_answered() {
        let router = Router::start(
            &RelayConfig::new("ws-test"),
            new_shared_service(RiptService::default()),
        );
        let mut server = WebSocketFaceServer::bind("127.0.0.1:0", ListenerConfig::default())
            .await
            .unwrap();
        router.add_face_factory(&mut server).unwrap();
        let url = format!("ws://{}/", server.local_addr());

        let clients: Vec<_> = (0..20)
            .map(|_| {
                let url = url.clone();
                tokio::spawn(async move {
                    let (mut client, _) =
                        tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
                    let request = Frame::new(Packet::discover_trunk_groups());
                    let text = serde_json::to_string(&request).unwrap();
                    client.send(Message::Text(text.into())).await.unwrap();

                    let reply = tokio::time::timeout(Duration::from_secs(5), client.next())
                        .await
                        .expect("no reply to a request sent right after the handshake")
                        .unwrap()
                        .unwrap();
                    let Message::Text(text) = reply else {
                        panic!("expected a text frame");
                    };
                    serde_json::from_str::<Frame>(&text).unwrap().packet
                })
            })
            .collect();

        for client in clients {
            assert!(matches!(
                client.await.unwrap(),
                Packet::TrunkGroupDiscovery(_)
            ));
        }
        router.shutdown();
    }

    #[tokio::test]
    async fn text_frames_become_events() {
        let (_server, face, mut client) = connected().await;
        let (tx, mut events) = mpsc::channel(4);
        face.set_receive_chan(tx);

        let frame = Frame::new(Packet::discover_trunk_groups()).with_trunk_group("trunkAbc");
        let text = serde_json::to_string(&frame).unwrap();
        client.send(Message::Text(text.into())).await.unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.tg_id.as_deref(), Some("trunkAbc"));
        assert_eq!(event.packet, Packet::discover_trunk_groups());
    }

    #[tokio::test]
    async fn outbound_packets_arrive_as_text() {
        let (_server, face, mut client) = connected().await;

        let packet = Packet::Content(ContentMessage::new("room", 2, b"hi".to_vec()));
        face.send(packet.clone()).unwrap();

        let message = client.next().await.unwrap().unwrap();
        let Message::Text(text) = message else {
            panic!("expected a text message, got {message:?}");
        };
        let frame: Frame = serde_json::from_str(&text).unwrap();
        assert_eq!(frame.packet, packet);
    }

    #[tokio::test]
    async fn dialed_face_talks_to_accepted_face() {
        let mut server = WebSocketFaceServer::bind("127.0.0.1:0", ListenerConfig::default())
            .await
            .unwrap();
        let mut feed = server.feed().unwrap();
        let url = format!("ws://{}/", server.local_addr());
        let client = WebSocketFace::connect(&url, 4).await.unwrap();
        let accepted = tokio::time::timeout(Duration::from_secs(2), feed.recv())
            .await
            .unwrap()
            .unwrap();

        let (tx, mut events) = mpsc::channel(4);
        accepted.set_receive_chan(tx);
        client.send(Packet::discover_trunk_groups()).unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.packet, Packet::discover_trunk_groups());

        client.close(None);
        let reason = tokio::time::timeout(Duration::from_secs(2), accepted.on_close().wait())
            .await
            .unwrap();
        assert_eq!(reason, None);
    }

    #[tokio::test]
    async fn client_close_closes_face_cleanly() {
        let (_server, face, mut client) = connected().await;
        client.close(None).await.unwrap();

        let reason = tokio::time::timeout(Duration::from_secs(2), face.on_close().wait())
            .await
            .unwrap();
        assert_eq!(reason, None);
    }
}
