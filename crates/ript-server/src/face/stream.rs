//! TCP faces exchanging length-prefixed JSON frames.

use std::net::SocketAddr;
use std::sync::Arc;

use ript_protocol::{
    FaceName, Frame, LENGTH_PREFIX_LEN, Packet, PacketEvent, ProtocolError, decode_payload,
    encode_frame, payload_len,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{CloseReason, Face, FaceCore, FaceFactory, OnClose};
use crate::config::ListenerConfig;
use crate::error::{ServerError, ServerResult};

/// A face over a TCP connection.
#[derive(Debug)]
pub struct StreamFace {
    core: FaceCore,
}

impl StreamFace {
    /// Wraps an established connection and starts its reader and writer.
    pub fn spawn(stream: TcpStream, capacity: usize) -> ServerResult<Arc<Self>> {
        Self::spawn_with_permit(stream, capacity, None)
    }

    /// Connects to a remote relay.
    pub async fn connect(addr: impl ToSocketAddrs, capacity: usize) -> ServerResult<Arc<Self>> {
        let stream = TcpStream::connect(addr).await?;
        Self::spawn(stream, capacity)
    }

    fn spawn_with_permit(
        stream: TcpStream,
        capacity: usize,
        permit: Option<OwnedSemaphorePermit>,
    ) -> ServerResult<Arc<Self>> {
        let peer = stream.peer_addr()?;
        let (core, outbound) = FaceCore::new(FaceName::new(peer.to_string()), capacity);
        let face = Arc::new(Self { core });

        let (reader, writer) = stream.into_split();
        tokio::spawn(write_loop(Arc::clone(&face), writer, outbound));
        tokio::spawn(read_loop(Arc::clone(&face), reader, permit));

        debug!(face = %face.core.name(), "Stream face started");
        Ok(face)
    }
}

impl Face for StreamFace {
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

async fn write_loop(
    face: Arc<StreamFace>,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Packet>,
) {
    let on_close = face.on_close();
    tokio::pin! {
        let closed = on_close.wait();
    }

    loop {
        let packet = tokio::select! {
            _ = &mut closed => break,
            packet = outbound.recv() => match packet {
                Some(packet) => packet,
                None => break,
            },
        };

        let result = match encode_frame(&Frame::new(packet)) {
            Ok(bytes) => writer.write_all(&bytes).await.map_err(ServerError::from),
            Err(e) => {
                warn!(face = %face.core.name(), error = %e, "Failed to encode frame");
                continue;
            }
        };
        if let Err(e) = result {
            face.close(Some(e.to_string()));
            break;
        }
    }

    let _ = writer.shutdown().await;
}

async fn read_loop(
    face: Arc<StreamFace>,
    mut reader: OwnedReadHalf,
    _permit: Option<OwnedSemaphorePermit>,
) {
    let on_close = face.on_close();
    tokio::pin! {
        let closed = on_close.wait();
    }

    loop {
        let read = tokio::select! {
            _ = &mut closed => break,
            read = read_frame(&mut reader) => read,
        };

        match read {
            Ok(Some(frame)) => {
                if !frame.is_compatible() {
                    warn!(
                        face = %face.core.name(),
                        version = %frame.protocol_version,
                        "Dropping frame with incompatible protocol version"
                    );
                    continue;
                }
                let event = frame.into_event(face.core.name().clone());
                face.core.deliver(event).await;
            }
            Ok(None) => {
                face.close(None);
                break;
            }
            Err(ServerError::Protocol(ProtocolError::Serialization(e))) => {
                warn!(face = %face.core.name(), error = %e, "Dropping undecodable frame");
            }
            Err(e) => {
                face.close(Some(e.to_string()));
                break;
            }
        }
    }
}

/// Reads one frame. `Ok(None)` means the peer closed the connection.
async fn read_frame(reader: &mut OwnedReadHalf) -> ServerResult<Option<Frame>> {
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = payload_len(prefix)?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(decode_payload(&payload)?))
}

/// TCP listener that turns accepted connections into [`StreamFace`]s.
pub struct TcpFaceServer {
    local_addr: SocketAddr,
    feed: Option<mpsc::Receiver<Arc<dyn Face>>>,
    accept_task: JoinHandle<()>,
}

impl TcpFaceServer {
    pub async fn bind(addr: impl ToSocketAddrs, config: ListenerConfig) -> ServerResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "TCP face listener ready");

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

impl FaceFactory for TcpFaceServer {
    fn feed(&mut self) -> Option<mpsc::Receiver<Arc<dyn Face>>> {
        self.feed.take()
    }
}

impl Drop for TcpFaceServer {
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

        let stream = match listener.accept().await {
            Ok((stream, addr)) => {
                debug!(%addr, "Accepted TCP connection");
                stream
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
                continue;
            }
        };

        let face = match StreamFace::spawn_with_permit(
            stream,
            config.face_buffer_capacity,
            Some(permit),
        ) {
            Ok(face) => face,
            Err(e) => {
                warn!(error = %e, "Failed to start stream face");
                continue;
            }
        };

        if feed.send(face).await.is_err() {
            debug!("Face feed closed, stopping TCP listener");
            break;
        }
    }
}
