//! Request/response faces for transports that cannot push.
//!
//! The owner of a [`PollFace`] forwards what the client posts with
//! [`PollFace::push`] and answers the client's long-poll with
//! [`PollFace::pull`]. [`PollFaceRegistry`] keeps faces by name so an HTTP
//! front end only has to map its join / leave / media-forward /
//! media-reverse routes onto registry calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use ript_protocol::{FaceName, Frame, Packet, PacketEvent};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{CloseReason, Face, FaceCore, FaceFactory, OnClose};
use crate::error::{ServerError, ServerResult};

/// A face whose outbound packets wait until the client asks for them.
#[derive(Debug)]
pub struct PollFace {
    core: FaceCore,
    outbound: tokio::sync::Mutex<mpsc::Receiver<Packet>>,
}

impl PollFace {
    pub fn new(name: impl Into<FaceName>, capacity: usize) -> Arc<Self> {
        let (core, outbound) = FaceCore::new(name.into(), capacity);
        Arc::new(Self {
            core,
            outbound: tokio::sync::Mutex::new(outbound),
        })
    }

    /// Delivers a frame posted by the client.
    ///
    /// Waits for the router to take the face if it has not yet. Fails once
    /// the face is closed.
    pub async fn push(&self, frame: Frame) -> ServerResult<()> {
        if self.core.is_closed() {
            return Err(self.closed_error());
        }
        let event = frame.into_event(self.core.name().clone());
        if !self.core.deliver(event).await {
            debug!(face = %self.core.name(), "Pushed frame was not delivered");
            return Err(self.closed_error());
        }
        Ok(())
    }

    /// Waits up to `timeout` for the next outbound packet.
    ///
    /// `Ok(None)` means nothing arrived in time. Packets still buffered when
    /// the face closes can be pulled; after that pulls fail.
    pub async fn pull(&self, timeout: Duration) -> ServerResult<Option<Packet>> {
        let mut outbound = self.outbound.lock().await;
        if let Ok(packet) = outbound.try_recv() {
            return Ok(Some(packet));
        }
        if self.core.is_closed() {
            return Err(self.closed_error());
        }

        let on_close = self.core.on_close();
        let waited = tokio::time::timeout(timeout, async {
            tokio::select! {
                biased;
                packet = outbound.recv() => packet,
                _ = on_close.wait() => None,
            }
        })
        .await;

        match waited {
            Ok(Some(packet)) => Ok(Some(packet)),
            Ok(None) => Err(self.closed_error()),
            Err(_) => Ok(None),
        }
    }

    fn closed_error(&self) -> ServerError {
        ServerError::FaceClosed {
            name: self.core.name().clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }
}

impl Face for PollFace {
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
        false
    }
}

type FaceMap = Arc<Mutex<HashMap<FaceName, Arc<PollFace>>>>;

/// Named poll faces, handed to the router as they join.
///
/// A face leaves the registry when the client calls `leave` or when the face
/// closes for any other reason, such as the router dropping it.
#[derive(Debug)]
pub struct PollFaceRegistry {
    faces: FaceMap,
    capacity: usize,
    feed_tx: mpsc::Sender<Arc<dyn Face>>,
    feed_rx: Option<mpsc::Receiver<Arc<dyn Face>>>,
}

impl PollFaceRegistry {
    pub fn new(face_capacity: usize, feed_capacity: usize) -> Self {
        let (feed_tx, feed_rx) = mpsc::channel(feed_capacity.max(1));
        Self {
            faces: Arc::new(Mutex::new(HashMap::new())),
            capacity: face_capacity,
            feed_tx,
            feed_rx: Some(feed_rx),
        }
    }

    fn faces(&self) -> MutexGuard<'_, HashMap<FaceName, Arc<PollFace>>> {
        lock_faces(&self.faces)
    }

    /// Creates a face for `name` and feeds it to the router.
    ///
    /// A name whose previous face has closed may join again.
    pub async fn join(&self, name: impl Into<FaceName>) -> ServerResult<Arc<PollFace>> {
        let name = name.into();
        let face = {
            let mut faces = self.faces();
            if faces.get(&name).is_some_and(|f| !f.is_closed()) {
                return Err(ServerError::DuplicateFace { name });
            }
            let face = PollFace::new(name.clone(), self.capacity);
            faces.insert(name.clone(), Arc::clone(&face));
            face
        };
        tokio::spawn(forget_on_close(
            Arc::clone(&self.faces),
            name.clone(),
            Arc::downgrade(&face),
            face.on_close(),
        ));

        if self.feed_tx.send(face.clone()).await.is_err() {
            self.faces().remove(&name);
            return Err(ServerError::Shutdown);
        }
        info!(face = %name, "Poll client joined");
        Ok(face)
    }

    /// Removes and closes the face. Returns false if `name` is unknown.
    pub fn leave(&self, name: &FaceName) -> bool {
        let Some(face) = self.faces().remove(name) else {
            return false;
        };
        face.close(Some("client leave".to_string()));
        info!(face = %name, "Poll client left");
        true
    }

    /// Media-forward: delivers a frame posted by `name`.
    pub async fn push(&self, name: &FaceName, frame: Frame) -> ServerResult<()> {
        self.get(name)?.push(frame).await
    }

    /// Media-reverse: long-polls the next packet for `name`.
    pub async fn pull(&self, name: &FaceName, timeout: Duration) -> ServerResult<Option<Packet>> {
        self.get(name)?.pull(timeout).await
    }

    pub fn get(&self, name: &FaceName) -> ServerResult<Arc<PollFace>> {
        self.faces()
            .get(name)
            .cloned()
            .ok_or_else(|| ServerError::UnknownFace { name: name.clone() })
    }

    pub fn len(&self) -> usize {
        self.faces().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock_faces(faces: &FaceMap) -> MutexGuard<'_, HashMap<FaceName, Arc<PollFace>>> {
    faces.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes `name` once its face closes, unless the name was taken again.
async fn forget_on_close(faces: FaceMap, name: FaceName, face: Weak<PollFace>, on_close: OnClose) {
    on_close.wait().await;
    let mut faces = lock_faces(&faces);
    if faces
        .get(&name)
        .is_some_and(|current| Weak::as_ptr(&face) == Arc::as_ptr(current))
    {
        faces.remove(&name);
        debug!(face = %name, "Closed poll face forgotten");
    }
}

impl FaceFactory for PollFaceRegistry {
    fn feed(&mut self) -> Option<mpsc::Receiver<Arc<dyn Face>>> {
        self.feed_rx.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ript_protocol::ContentMessage;

    #[tokio::test(start_paused = true)]
    async fn pull_times_out_without_traffic() {
        let face = PollFace::new("p", 4);
        let pulled = face.pull(Duration::from_secs(30)).await.unwrap();
        assert!(pulled.is_none());
        assert!(!face.can_stream());
    }

    #[tokio::test]
    async fn pull_returns_buffered_packets() {
        let face = PollFace::new("p", 4);
        let packet = Packet::Content(ContentMessage::new("room", 1, b"x".to_vec()));
        face.send(packet.clone()).unwrap();

        let pulled = face.pull(Duration::from_millis(10)).await.unwrap();
        assert_eq!(pulled, Some(packet));
    }

    #[tokio::test]
    async fn buffered_packets_survive_close_once() {
        let face = PollFace::new("p", 4);
        face.send(Packet::discover_trunk_groups()).unwrap();
        face.close(None);

        assert!(face.pull(Duration::from_millis(10)).await.unwrap().is_some());
        assert!(matches!(
            face.pull(Duration::from_millis(10)).await,
            Err(ServerError::FaceClosed { .. })
        ));
        assert!(face.push(Frame::new(Packet::discover_trunk_groups())).await.is_err());
    }

    #[tokio::test]
    async fn registry_join_feeds_router() {
        let mut registry = PollFaceRegistry::new(4, 4);
        let mut feed = registry.feed().unwrap();

        let face = registry.join("client-1").await.unwrap();
        let fed = feed.recv().await.unwrap();
        assert_eq!(fed.name(), face.name());
        assert!(matches!(
            registry.join("client-1").await,
            Err(ServerError::DuplicateFace { .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn registry_push_pull_and_leave() {
        let mut registry = PollFaceRegistry::new(4, 4);
        let mut feed = registry.feed().unwrap();
        let name = FaceName::new("client-1");
        registry.join(name.clone()).await.unwrap();
        let face = feed.recv().await.unwrap();

        let (tx, mut events) = mpsc::channel(4);
        face.set_receive_chan(tx);
        registry
            .push(&name, Frame::new(Packet::discover_trunk_groups()).with_trunk_group("tg"))
            .await
            .unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.sender, name);
        assert_eq!(event.tg_id.as_deref(), Some("tg"));

        face.send(Packet::discover_trunk_groups()).unwrap();
        let pulled = registry.pull(&name, Duration::from_millis(10)).await.unwrap();
        assert_eq!(pulled, Some(Packet::discover_trunk_groups()));

        assert!(registry.leave(&name));
        assert!(!registry.leave(&name));
        assert_eq!(face.on_close().wait().await, Some("client leave".to_string()));
        assert!(matches!(
            registry.pull(&name, Duration::from_millis(10)).await,
            Err(ServerError::UnknownFace { .. })
        ));
    }

    #[tokio::test]
    async fn push_before_router_takes_the_face_is_held() {
        let mut registry = PollFaceRegistry::new(4, 4);
        let mut feed = registry.feed().unwrap();
        let name = FaceName::new("early");
        let face = registry.join(name.clone()).await.unwrap();

        let push = tokio::spawn(async move {
            face.push(Frame::new(Packet::discover_trunk_groups())).await
        });
        tokio::task::yield_now().await;

        let fed = feed.recv().await.unwrap();
        let (tx, mut events) = mpsc::channel(4);
        fed.set_receive_chan(tx);

        push.await.unwrap().unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.sender, name);
    }

    #[tokio::test]
    async fn push_fails_when_face_closes_unclaimed() {
        let registry = PollFaceRegistry::new(4, 4);
        let face = registry.join("orphan").await.unwrap();

        let push = tokio::spawn({
            let face = Arc::clone(&face);
            async move { face.push(Frame::new(Packet::discover_trunk_groups())).await }
        });
        tokio::task::yield_now().await;
        face.close(Some("dropped by router".into()));

        assert!(matches!(
            push.await.unwrap(),
            Err(ServerError::FaceClosed { .. })
        ));
    }

    #[tokio::test]
    async fn closed_face_leaves_the_registry() {
        let registry = PollFaceRegistry::new(4, 4);
        let name = FaceName::new("vanished");
        let face = registry.join(name.clone()).await.unwrap();
        face.send(Packet::discover_trunk_groups()).unwrap();

        face.close(Some("face buffer full".into()));
        tokio::time::timeout(Duration::from_secs(2), async {
            while !registry.is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(matches!(
            registry.get(&name),
            Err(ServerError::UnknownFace { .. })
        ));
    }

    #[tokio::test]
    async fn stale_close_keeps_the_rejoined_face() {
        let registry = PollFaceRegistry::new(4, 4);
        let first = registry.join("c").await.unwrap();
        first.close(None);

        let second = registry.join("c").await.unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(Arc::ptr_eq(&registry.get(&FaceName::new("c")).unwrap(), &second));
    }

    #[tokio::test]
    async fn closed_face_may_rejoin() {
        let registry = PollFaceRegistry::new(4, 4);
        let first = registry.join("c").await.unwrap();
        first.close(Some("dropped by router".into()));

        let second = registry.join("c").await.unwrap();
        assert!(!second.is_closed());
    }
}
