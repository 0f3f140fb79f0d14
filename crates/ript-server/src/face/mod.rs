//! Faces: bidirectional packet channels to remote endpoints.
//!
//! Every transport builds its face around a [`FaceCore`], which owns the
//! face name, the slot for the router's receive channel, the bounded
//! outbound buffer and the one-shot close notification. The transport only
//! has to pump packets between the core and its socket.

mod channel;
mod poll;
mod stream;
mod websocket;

use std::sync::Arc;

use ript_protocol::{FaceName, Packet, PacketEvent};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use crate::error::{ServerError, ServerResult};

pub use channel::{ChannelFace, ChannelPeer};
pub use poll::{PollFace, PollFaceRegistry};
pub use stream::{StreamFace, TcpFaceServer};
pub use websocket::{WebSocketFace, WebSocketFaceServer};

/// Why a face closed. `None` is an orderly close.
pub type CloseReason = Option<String>;

/// A connected endpoint the router can exchange packets with.
pub trait Face: Send + Sync {
    /// Stable identifier, unique among live faces.
    fn name(&self) -> &FaceName;

    /// Queues a packet for the remote end without blocking.
    ///
    /// Fails with [`ServerError::FaceBufferFull`] when the outbound buffer
    /// is full and [`ServerError::FaceClosed`] once the face has closed.
    fn send(&self, packet: Packet) -> ServerResult<()>;

    /// Installs the channel inbound packets are delivered on.
    fn set_receive_chan(&self, sink: mpsc::Sender<PacketEvent>);

    /// Closes the face. Only the first call has an effect.
    fn close(&self, reason: CloseReason);

    /// Future resolving once the face has closed.
    fn on_close(&self) -> OnClose;

    /// Whether the transport can push unsolicited packets.
    fn can_stream(&self) -> bool;
}

/// Source of newly accepted faces.
pub trait FaceFactory {
    /// Hands out the feed of new faces. Returns `None` once it was taken.
    fn feed(&mut self) -> Option<mpsc::Receiver<Arc<dyn Face>>>;
}

/// One-shot close notification shared by a face and its observers.
#[derive(Debug)]
pub struct CloseNotifier {
    tx: watch::Sender<Option<CloseReason>>,
}

impl CloseNotifier {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Records the close. Returns false if it had already fired.
    pub fn fire(&self, reason: CloseReason) -> bool {
        self.tx.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(reason);
            true
        })
    }

    pub fn is_fired(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn subscribe(&self) -> OnClose {
        OnClose {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for CloseNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves with the close reason once the face closes.
///
/// Subscribing after the close resolves immediately.
#[derive(Debug, Clone)]
pub struct OnClose {
    rx: watch::Receiver<Option<CloseReason>>,
}

impl OnClose {
    pub async fn wait(mut self) -> CloseReason {
        match self.rx.wait_for(Option::is_some).await {
            Ok(state) => state.clone().flatten(),
            Err(_) => Some("face dropped without closing".to_string()),
        }
    }

    /// The close reason if the face has already closed.
    pub fn try_get(&self) -> Option<CloseReason> {
        self.rx.borrow().clone()
    }
}

/// State shared by every face implementation.
#[derive(Debug)]
pub struct FaceCore {
    name: FaceName,
    sink: watch::Sender<Option<mpsc::Sender<PacketEvent>>>,
    outbound: mpsc::Sender<Packet>,
    closed: CloseNotifier,
}

impl FaceCore {
    /// Creates a core and the receiving end of its outbound buffer.
    pub fn new(name: FaceName, capacity: usize) -> (Self, mpsc::Receiver<Packet>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let core = Self {
            name,
            sink: watch::Sender::new(None),
            outbound,
            closed: CloseNotifier::new(),
        };
        (core, rx)
    }

    pub fn name(&self) -> &FaceName {
        &self.name
    }

    /// Non-blocking enqueue onto the outbound buffer.
    pub fn enqueue(&self, packet: Packet) -> ServerResult<()> {
        if self.closed.is_fired() {
            return Err(ServerError::FaceClosed {
                name: self.name.clone(),
            });
        }
        self.outbound.try_send(packet).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ServerError::FaceBufferFull {
                name: self.name.clone(),
            },
            mpsc::error::TrySendError::Closed(_) => ServerError::FaceClosed {
                name: self.name.clone(),
            },
        })
    }

    pub fn set_sink(&self, sink: mpsc::Sender<PacketEvent>) {
        self.sink.send_replace(Some(sink));
    }

    /// Forwards an inbound event to the receive channel.
    ///
    /// Transports start reading before the router has installed its
    /// channel, so this waits for [`FaceCore::set_sink`] until the face
    /// closes. Returns false when the event was dropped because the face
    /// closed or the receiver is gone.
    pub async fn deliver(&self, event: PacketEvent) -> bool {
        if self.closed.is_fired() {
            trace!(face = %self.name, "Dropping inbound packet on closed face");
            return false;
        }

        let mut sink_rx = self.sink.subscribe();
        let on_close = self.closed.subscribe();
        let sink = tokio::select! {
            biased;
            sink = sink_rx.wait_for(Option::is_some) => sink.ok().and_then(|s| (*s).clone()),
            _ = on_close.wait() => None,
        };
        let Some(sink) = sink else {
            debug!(face = %self.name, "Face closed before a receive channel was installed");
            return false;
        };
        sink.send(event).await.is_ok()
    }

    /// Fires the close notification. Returns false if already closed.
    pub fn close(&self, reason: CloseReason) -> bool {
        let first = self.closed.fire(reason.clone());
        if first {
            match reason {
                Some(reason) => debug!(face = %self.name, %reason, "Face closed"),
                None => debug!(face = %self.name, "Face closed"),
            }
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_fired()
    }

    pub fn on_close(&self) -> OnClose {
        self.closed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn close_fires_once() {
        let notifier = CloseNotifier::new();
        let waiter = notifier.subscribe();

        assert!(notifier.fire(Some("boom".into())));
        assert!(!notifier.fire(None));
        assert_eq!(waiter.wait().await, Some("boom".to_string()));
    }

    #[tokio::test]
    async fn late_subscriber_sees_close() {
        let notifier = CloseNotifier::new();
        notifier.fire(None);

        let waiter = notifier.subscribe();
        assert_eq!(waiter.try_get(), Some(None));
        let reason = tokio::time::timeout(Duration::from_millis(50), waiter.wait()).await;
        assert_eq!(reason.unwrap(), None);
    }

    #[tokio::test]
    async fn dropped_notifier_resolves_waiters() {
        let notifier = CloseNotifier::new();
        let waiter = notifier.subscribe();
        drop(notifier);

        assert!(waiter.wait().await.is_some());
    }

    #[tokio::test]
    async fn enqueue_reports_full_and_closed() {
        let (core, mut rx) = FaceCore::new(FaceName::new("f"), 1);

        core.enqueue(Packet::discover_trunk_groups()).unwrap();
        assert!(matches!(
            core.enqueue(Packet::discover_trunk_groups()),
            Err(ServerError::FaceBufferFull { .. })
        ));

        assert!(rx.recv().await.is_some());
        core.close(None);
        assert!(matches!(
            core.enqueue(Packet::discover_trunk_groups()),
            Err(ServerError::FaceClosed { .. })
        ));
    }

    #[tokio::test]
    async fn deliver_waits_for_a_receive_channel() {
        let (core, _rx) = FaceCore::new(FaceName::new("f"), 1);
        let core = Arc::new(core);
        let event = PacketEvent::new(FaceName::new("f"), Packet::discover_trunk_groups());

        let pending = tokio::spawn({
            let core = Arc::clone(&core);
            let event = event.clone();
            async move { core.deliver(event).await }
        });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        let (tx, mut events) = mpsc::channel(1);
        core.set_sink(tx);
        assert!(pending.await.unwrap());
        assert_eq!(events.recv().await, Some(event));
    }

    #[tokio::test]
    async fn close_releases_a_waiting_delivery() {
        let (core, _rx) = FaceCore::new(FaceName::new("f"), 1);
        let core = Arc::new(core);

        let pending = tokio::spawn({
            let core = Arc::clone(&core);
            async move {
                let event = PacketEvent::new(FaceName::new("f"), Packet::discover_trunk_groups());
                core.deliver(event).await
            }
        });
        tokio::task::yield_now().await;
        core.close(Some("gone".into()));

        let delivered = tokio::time::timeout(Duration::from_secs(2), pending)
            .await
            .unwrap()
            .unwrap();
        assert!(!delivered);
    }
}
