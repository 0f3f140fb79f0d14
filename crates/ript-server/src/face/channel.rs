//! In-process face backed by tokio channels.

use std::sync::Arc;

use ript_protocol::{FaceName, Frame, Packet, PacketEvent};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use super::{CloseReason, Face, FaceCore, OnClose};
use crate::error::ServerResult;

/// A face whose remote end lives in the same process.
///
/// [`ChannelFace::pair`] returns the face, to hand to the router, and a
/// [`ChannelPeer`] that plays the remote endpoint.
#[derive(Debug)]
pub struct ChannelFace {
    core: FaceCore,
}

impl ChannelFace {
    pub fn pair(name: impl Into<FaceName>, capacity: usize) -> (Arc<Self>, ChannelPeer) {
        let (core, outbound) = FaceCore::new(name.into(), capacity);
        let face = Arc::new(Self { core });
        let peer = ChannelPeer {
            face: Arc::clone(&face),
            outbound,
        };
        (face, peer)
    }
}

impl Face for ChannelFace {
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

/// The remote end of a [`ChannelFace`].
#[derive(Debug)]
pub struct ChannelPeer {
    face: Arc<ChannelFace>,
    outbound: mpsc::Receiver<Packet>,
}

impl ChannelPeer {
    pub fn name(&self) -> &FaceName {
        self.face.name()
    }

    /// Sends a packet towards the router. Returns false if it was dropped.
    pub async fn send(&self, packet: Packet) -> bool {
        self.send_frame(Frame::new(packet)).await
    }

    /// Sends a framed packet, keeping its trunk-group and call context.
    pub async fn send_frame(&self, frame: Frame) -> bool {
        let event = frame.into_event(self.face.name().clone());
        self.face.core.deliver(event).await
    }

    /// Waits for the next packet the router sent to this face.
    ///
    /// Returns `None` once the face is closed and its buffer is drained.
    pub async fn recv(&mut self) -> Option<Packet> {
        let on_close = self.face.on_close();
        tokio::select! {
            biased;
            packet = self.outbound.recv() => packet,
            _ = on_close.wait() => self.outbound.try_recv().ok(),
        }
    }

    /// Returns a pending packet without waiting.
    pub fn try_recv(&mut self) -> Option<Packet> {
        match self.outbound.try_recv() {
            Ok(packet) => Some(packet),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Simulates the remote end going away.
    pub fn disconnect(&self, reason: CloseReason) {
        self.face.close(reason);
    }

    pub fn is_closed(&self) -> bool {
        self.face.core.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use ript_protocol::ContentMessage;

    #[tokio::test]
    async fn packets_flow_both_ways() {
        let (face, mut peer) = ChannelFace::pair("a", 4);
        let (tx, mut events) = mpsc::channel(4);
        face.set_receive_chan(tx);

        assert!(peer.send(Packet::discover_trunk_groups()).await);
        let event = events.recv().await.unwrap();
        assert_eq!(event.sender.as_str(), "a");
        assert_eq!(event.packet, Packet::discover_trunk_groups());

        let content = Packet::Content(ContentMessage::new("room", 1, b"hi".to_vec()));
        face.send(content.clone()).unwrap();
        assert_eq!(peer.recv().await, Some(content));
    }

    #[tokio::test]
    async fn frame_context_reaches_the_event() {
        let (face, peer) = ChannelFace::pair("a", 4);
        let (tx, mut events) = mpsc::channel(4);
        face.set_receive_chan(tx);

        peer.send_frame(Frame::new(Packet::discover_trunk_groups()).with_trunk_group("tg"))
            .await;
        let event = events.recv().await.unwrap();
        assert_eq!(event.tg_id.as_deref(), Some("tg"));
    }

    #[tokio::test]
    async fn closed_face_rejects_traffic() {
        let (face, mut peer) = ChannelFace::pair("a", 4);
        let (tx, _events) = mpsc::channel(4);
        face.set_receive_chan(tx);

        peer.disconnect(Some("gone".into()));
        assert!(peer.is_closed());
        assert!(!peer.send(Packet::discover_trunk_groups()).await);
        assert!(matches!(
            face.send(Packet::discover_trunk_groups()),
            Err(ServerError::FaceClosed { .. })
        ));
        assert_eq!(peer.recv().await, None);
        assert_eq!(face.on_close().wait().await, Some("gone".to_string()));
    }

    #[tokio::test]
    async fn full_buffer_is_reported() {
        let (face, mut peer) = ChannelFace::pair("a", 1);
        face.send(Packet::discover_trunk_groups()).unwrap();
        assert!(matches!(
            face.send(Packet::discover_trunk_groups()),
            Err(ServerError::FaceBufferFull { .. })
        ));
        assert!(peer.try_recv().is_some());
        assert!(peer.try_recv().is_none());
    }
}
