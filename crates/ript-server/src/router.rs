//! Router: the live face set and the single dispatch loop.
//!
//! Every face delivers its inbound packets onto one bounded event queue.
//! One task drains that queue in arrival order and, per packet type,
//! broadcasts to every other face, answers from the content cache, or asks
//! the [`RiptService`](crate::RiptService) for a reply to the sender.
//!
//! Faces leave the set when their close notification fires, or when a send
//! to them fails. In the latter case the router also closes them.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use ript_protocol::{FaceName, Packet, PacketEvent};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::ContentCache;
use crate::config::RelayConfig;
use crate::error::{ServerError, ServerResult};
use crate::face::{CloseReason, Face, FaceFactory};
use crate::service::SharedService;

/// Handle to a face slot. Never reused within a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceId(u64);

#[derive(Default)]
struct FaceTable {
    next_id: u64,
    by_name: HashMap<FaceName, FaceId>,
    slots: BTreeMap<FaceId, Arc<dyn Face>>,
}

impl FaceTable {
    fn insert(&mut self, face: Arc<dyn Face>) -> FaceId {
        let id = FaceId(self.next_id);
        self.next_id += 1;
        self.by_name.insert(face.name().clone(), id);
        self.slots.insert(id, face);
        id
    }

    fn remove(&mut self, id: FaceId) -> Option<Arc<dyn Face>> {
        let face = self.slots.remove(&id)?;
        if self.by_name.get(face.name()) == Some(&id) {
            self.by_name.remove(face.name());
        }
        Some(face)
    }

    fn get_by_name(&self, name: &FaceName) -> Option<(FaceId, Arc<dyn Face>)> {
        let id = *self.by_name.get(name)?;
        self.slots.get(&id).map(|face| (id, Arc::clone(face)))
    }
}

struct RouterInner {
    name: String,
    faces: Mutex<FaceTable>,
    events: mpsc::Sender<PacketEvent>,
    cache: Arc<ContentCache>,
    cache_content: bool,
    service: SharedService,
    shutdown: watch::Sender<bool>,
    started_at: DateTime<Utc>,
}

/// Packet router. Cheap to clone; clones share one face set and loop.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    /// Creates a router and spawns its dispatch loop.
    pub fn start(config: &RelayConfig, service: SharedService) -> Self {
        let cache = match config.cache_limit {
            Some(limit) => ContentCache::with_limit(limit),
            None => ContentCache::new(),
        };
        Self::with_cache(config, service, Arc::new(cache))
    }

    /// Like [`Router::start`], sharing an existing cache.
    pub fn with_cache(
        config: &RelayConfig,
        service: SharedService,
        cache: Arc<ContentCache>,
    ) -> Self {
        let (events, rx) = mpsc::channel(config.event_queue_capacity.max(1));
        let (shutdown, _) = watch::channel(false);

        let router = Self {
            inner: Arc::new(RouterInner {
                name: config.name.clone(),
                faces: Mutex::new(FaceTable::default()),
                events,
                cache,
                cache_content: config.cache_content,
                service,
                shutdown,
                started_at: Utc::now(),
            }),
        };

        tokio::spawn(router.clone().route(rx));
        info!(router = %config.name, "Router started");
        router
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn cache(&self) -> Arc<ContentCache> {
        Arc::clone(&self.inner.cache)
    }

    pub fn service(&self) -> SharedService {
        Arc::clone(&self.inner.service)
    }

    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.inner.started_at).num_seconds().max(0) as u64
    }

    fn faces(&self) -> MutexGuard<'_, FaceTable> {
        self.inner.faces.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a face and binds its inbound packets to the event queue.
    ///
    /// A background waiter removes the face as soon as it closes.
    pub fn add_face(&self, face: Arc<dyn Face>) -> ServerResult<FaceId> {
        let id = {
            let mut faces = self.faces();
            if faces.by_name.contains_key(face.name()) {
                return Err(ServerError::DuplicateFace {
                    name: face.name().clone(),
                });
            }
            face.set_receive_chan(self.inner.events.clone());
            faces.insert(Arc::clone(&face))
        };
        info!(router = %self.inner.name, face = %face.name(), "Face added");

        let on_close = face.on_close();
        let router = self.clone();
        tokio::spawn(async move {
            let reason = on_close.wait().await;
            router.remove_slot(id, reason);
        });

        Ok(id)
    }

    /// Removes the face named `name`. A no-op if it is absent.
    pub fn remove_face(&self, name: &FaceName) -> Option<Arc<dyn Face>> {
        let face = {
            let mut faces = self.faces();
            let (id, _) = faces.get_by_name(name)?;
            faces.remove(id)
        };
        if face.is_some() {
            info!(router = %self.inner.name, face = %name, "Face removed");
        }
        face
    }

    fn remove_slot(&self, id: FaceId, reason: CloseReason) -> Option<Arc<dyn Face>> {
        let face = self.faces().remove(id)?;
        match reason {
            Some(reason) => info!(
                router = %self.inner.name,
                face = %face.name(),
                %reason,
                "Face removed"
            ),
            None => info!(router = %self.inner.name, face = %face.name(), "Face removed"),
        }
        Some(face)
    }

    /// Drops a face after a failed send and closes it.
    fn drop_face(&self, id: FaceId, err: &ServerError) {
        warn!(router = %self.inner.name, error = %err, "Send failed, dropping face");
        let reason = err.to_string();
        if let Some(face) = self.remove_slot(id, Some(reason.clone())) {
            face.close(Some(reason));
        }
    }

    /// Names of the live faces in the order they were added.
    pub fn face_names(&self) -> Vec<FaceName> {
        self.faces()
            .slots
            .values()
            .map(|face| face.name().clone())
            .collect()
    }

    pub fn face_count(&self) -> usize {
        self.faces().slots.len()
    }

    pub fn contains_face(&self, name: &FaceName) -> bool {
        self.faces().by_name.contains_key(name)
    }

    /// Drains a feed of new faces into the router until it closes.
    pub fn add_face_feed(&self, mut feed: mpsc::Receiver<Arc<dyn Face>>) -> JoinHandle<()> {
        let router = self.clone();
        let mut shutdown = self.inner.shutdown.subscribe();

        tokio::spawn(async move {
            loop {
                let face = tokio::select! {
                    _ = shutdown.wait_for(|down| *down) => break,
                    face = feed.recv() => match face {
                        Some(face) => face,
                        None => break,
                    },
                };
                if let Err(e) = router.add_face(Arc::clone(&face)) {
                    warn!(router = %router.inner.name, error = %e, "Rejected face");
                    face.close(Some(e.to_string()));
                }
            }
            debug!(router = %router.inner.name, "Face feed stopped");
        })
    }

    /// Takes the factory's feed and drains it.
    pub fn add_face_factory(&self, factory: &mut dyn FaceFactory) -> ServerResult<JoinHandle<()>> {
        let feed = factory
            .feed()
            .ok_or_else(|| ServerError::config("face feed already taken"))?;
        Ok(self.add_face_feed(feed))
    }

    /// Queues an event as if a face had delivered it.
    pub async fn submit(&self, event: PacketEvent) -> ServerResult<()> {
        if *self.inner.shutdown.borrow() {
            return Err(ServerError::Shutdown);
        }
        self.inner
            .events
            .send(event)
            .await
            .map_err(|_| ServerError::Shutdown)
    }

    /// Stops the dispatch loop and closes every face.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        let faces: Vec<_> = {
            let mut table = self.faces();
            table.by_name.clear();
            std::mem::take(&mut table.slots).into_values().collect()
        };
        info!(router = %self.inner.name, faces = faces.len(), "Router shutting down");
        for face in faces {
            face.close(None);
        }
    }

    pub fn is_shut_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    async fn route(self, mut events: mpsc::Receiver<PacketEvent>) {
        let mut shutdown = self.inner.shutdown.subscribe();

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.wait_for(|down| *down) => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            if let Err(e) = self.dispatch(event).await {
                warn!(router = %self.inner.name, error = %e, "Dropped event");
            }
        }

        debug!(router = %self.inner.name, "Dispatch loop stopped");
    }

    /// Handles one event.
    ///
    /// Errors concern only this event: the sender gets no reply.
    #[tracing::instrument(
        skip(self, event),
        fields(
            router = %self.inner.name,
            sender = %event.sender,
            packet_type = ?event.packet.packet_type(),
        )
    )]
    pub async fn dispatch(&self, event: PacketEvent) -> ServerResult<()> {
        let PacketEvent {
            sender,
            tg_id,
            packet,
            ..
        } = event;

        match packet {
            Packet::Content(msg) => {
                if self.inner.cache_content {
                    self.inner.cache.add(msg.clone());
                }
                self.broadcast(&sender, Packet::Content(msg));
            }
            Packet::StreamContent(msg) => {
                self.broadcast(&sender, Packet::StreamContent(msg));
            }
            Packet::ContentRequest(req) => match self.inner.cache.get(&req.to, req.id) {
                Some(msg) => self.reply(&sender, Packet::Content(msg)),
                None => debug!(to = %req.to, id = req.id, "Content not cached, no reply"),
            },
            Packet::TrunkGroupDiscovery(_) => {
                let info = self.inner.service.read().await.list_trunk_groups();
                self.reply(&sender, Packet::TrunkGroupDiscovery(info));
            }
            Packet::RegisterHandler(msg) => {
                let response = self.inner.service.write().await.register_handler(msg)?;
                self.reply(&sender, Packet::RegisterHandler(response));
            }
            Packet::Calls(msg) => {
                let tg_id = tg_id.unwrap_or_default();
                let response = self.inner.service.write().await.process_calls(&tg_id, msg)?;
                self.reply(&sender, Packet::Calls(response));
            }
            other @ (Packet::StreamContentAck(_) | Packet::StreamContentRequest(_)) => {
                return Err(ServerError::ProtocolViolation {
                    sender,
                    packet_type: other.packet_type(),
                });
            }
        }
        Ok(())
    }

    /// Sends to every face except `sender`. Failed targets are dropped.
    fn broadcast(&self, sender: &FaceName, packet: Packet) {
        let targets: Vec<(FaceId, Arc<dyn Face>)> = self
            .faces()
            .slots
            .iter()
            .filter(|(_, face)| face.name() != sender)
            .map(|(id, face)| (*id, Arc::clone(face)))
            .collect();

        debug!(targets = targets.len(), "Broadcasting");
        for (id, face) in targets {
            if let Err(e) = face.send(packet.clone()) {
                self.drop_face(id, &e);
            }
        }
    }

    /// Sends to `sender` only.
    fn reply(&self, sender: &FaceName, packet: Packet) {
        let Some((id, face)) = self.faces().get_by_name(sender) else {
            debug!(face = %sender, "Sender is gone, reply dropped");
            return;
        };
        if let Err(e) = face.send(packet) {
            self.drop_face(id, &e);
        }
    }
}
