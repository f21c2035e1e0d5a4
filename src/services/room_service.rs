use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::db::{ProjectStore, StoreError};
use crate::drawing::{DocumentFactory, DrawingDocument, Snapshot};
use crate::models::{Mutation, ProjectLoadMessage, SendMessage, UserCountMessage};
use crate::rooms::{RelayError, Resolved, Room, RoomInner, RoomPhase, RoomRegistry};
use crate::utils::scope_guard::ScopeGuard;
use crate::ws::membership::{Membership, SessionId};

/// Room counts by phase, plus connected sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub sessions: usize,
    pub rooms: usize,
    pub loading: usize,
    pub ready: usize,
    pub draining: usize,
}

/// Entry point for everything a connection can do to rooms.
///
/// Cheap to clone; all clones share one registry, membership table and
/// store.
#[derive(Clone)]
pub struct RoomService {
    pub(crate) registry: Arc<RoomRegistry>,
    pub(crate) membership: Arc<Membership>,
    pub(crate) store: Arc<dyn ProjectStore>,
    factory: DocumentFactory,
    pub(crate) config: RelayConfig,
}

impl RoomService {
    pub fn new(store: Arc<dyn ProjectStore>, factory: DocumentFactory, config: RelayConfig) -> Self {
        Self {
            registry: Arc::new(RoomRegistry::new()),
            membership: Arc::new(Membership::new()),
            store,
            factory,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub fn membership(&self) -> &Arc<Membership> {
        &self.membership
    }

    pub fn store(&self) -> &Arc<dyn ProjectStore> {
        &self.store
    }

    /// Register a new connection. Frames for it arrive on the receiver.
    pub async fn connect(&self) -> (SessionId, mpsc::UnboundedReceiver<String>) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let session = Uuid::new_v4();
        self.membership.connect(session, outbox).await;
        info!("Session {} connected", session);
        (session, inbox)
    }

    pub async fn send<T: Serialize>(&self, session: SessionId, msg: &T) {
        self.membership.send(session, msg).await;
    }

    /// Join `session` to a room and deliver the room's snapshot to it.
    ///
    /// The first subscriber of a room that is not in memory loads it from
    /// the store; later subscribers wait for that load instead of starting
    /// their own. The session joins while the room lock is held, so no
    /// relayed event can reach it ahead of its snapshot. On failure the
    /// session is taken out of the room again.
    pub async fn subscribe(&self, session: SessionId, key: &str) -> Result<(), RelayError> {
        if key.is_empty() {
            error!("Empty room name provided by session {}", session);
            return Err(RelayError::InvalidRoom);
        }

        if !self.membership.is_connected(session).await {
            warn!("Unknown session {} tried to join room {}", session, key);
            return Ok(());
        }

        if let Err(e) = self.deliver_snapshot(session, key).await {
            if let Some(remaining) = self.membership.leave(session, key).await {
                self.after_leave(key, remaining).await;
            }
            return Err(e);
        }

        self.broadcast_member_count(key).await;

        // The session may have gone away while it waited for the room.
        if self.membership.count(key).await == 0 {
            self.begin_draining(key).await;
        }
        Ok(())
    }

    async fn deliver_snapshot(&self, session: SessionId, key: &str) -> Result<(), RelayError> {
        loop {
            let room = match self.registry.resolve(key).await {
                Resolved::Created(room, guard) => return self.load_room(session, room, guard).await,
                Resolved::Cached(room) => room,
            };

            let mut guard = room.lock().await;
            if !room.phase().is_resident() {
                // The load we queued behind failed, or the room was evicted
                // while we waited. Resolve again.
                debug!("Room {} went away while session {} waited, retrying", key, session);
                continue;
            }

            if !self.join_room(session, key).await {
                return Ok(());
            }

            if room.cancel_eviction(&mut guard) {
                info!("Eviction of room {} cancelled, serving it from memory", key);
            }

            let snapshot = match guard.export() {
                Some(Ok(snapshot)) => snapshot,
                Some(Err(source)) => {
                    error!("Failed to export room {}: {}", key, source);
                    return Err(RelayError::Export {
                        room: key.to_string(),
                        source,
                    });
                }
                None => return Err(RelayError::NotReady(key.to_string())),
            };

            self.membership.send(session, &SendMessage::LoadingStart).await;
            self.membership
                .send(
                    session,
                    &SendMessage::ProjectLoad(ProjectLoadMessage {
                        project: snapshot.into_inner(),
                    }),
                )
                .await;
            self.membership.send(session, &SendMessage::LoadingEnd).await;
            return Ok(());
        }
    }

    /// Load a freshly registered room. `guard` is its lock, taken when the
    /// room was registered.
    async fn load_room(
        &self,
        session: SessionId,
        room: Arc<Room>,
        mut guard: OwnedMutexGuard<RoomInner>,
    ) -> Result<(), RelayError> {
        let key = room.key().to_string();

        // Dropped before `guard`, so an abandoned load is marked Unloaded
        // before anyone queued on the lock can look at it.
        let abandoned = {
            let room = room.clone();
            let registry = self.registry.clone();
            ScopeGuard::new(move || {
                warn!("Load of room {} was abandoned", room.key());
                room.set_phase(RoomPhase::Unloaded);
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        registry.remove(&room).await;
                    });
                }
            })
        };

        // Loading rooms reject mutations, so nothing is relayed to the
        // session before its snapshot.
        self.join_room(session, &key).await;
        self.membership.send(session, &SendMessage::LoadingStart).await;
        info!("Loading room {} from store", key);

        let loaded = match self.store.get(&key).await {
            Ok(found) => self.open_document(found.as_ref()).map(|document| (document, found)),
            Err(e) => Err(e),
        };

        match loaded {
            Ok((document, found)) => {
                guard.document = Some(document);
                guard.revision = 0;
                room.set_phase(RoomPhase::Ready);
                abandoned.disarm();

                match found {
                    Some(snapshot) => {
                        info!("Room {} loaded ({} bytes)", key, snapshot.len());
                        self.membership
                            .send(
                                session,
                                &SendMessage::ProjectLoad(ProjectLoadMessage {
                                    project: snapshot.into_inner(),
                                }),
                            )
                            .await;
                    }
                    None => info!("Room {} has no stored project, starting empty", key),
                }
                self.membership.send(session, &SendMessage::LoadingEnd).await;
                Ok(())
            }
            Err(source) => {
                error!("Failed to load room {}: {}", key, source);
                room.set_phase(RoomPhase::Unloaded);
                abandoned.disarm();
                self.registry.remove(&room).await;
                drop(guard);
                self.membership.send(session, &SendMessage::LoadingEnd).await;
                Err(RelayError::LoadFailure { room: key, source })
            }
        }
    }

    /// Returns false if the session disconnected in the meantime.
    async fn join_room(&self, session: SessionId, key: &str) -> bool {
        match self.membership.join(session, key).await {
            Some(members) => {
                info!("Session {} joined room {} ({} members)", session, key, members);
                true
            }
            None => {
                debug!("Session {} went away before joining room {}", session, key);
                false
            }
        }
    }

    fn open_document(&self, found: Option<&Snapshot>) -> Result<Box<dyn DrawingDocument>, StoreError> {
        let mut document = (self.factory)();
        if let Some(snapshot) = found {
            document.import_state(snapshot)?;
        }
        Ok(document)
    }

    /// Apply a drawing event to its room and relay it to the other members.
    ///
    /// Rejected with `NotReady` unless the room's document is resident.
    /// Events for one room are applied and relayed in the order they get
    /// the room lock.
    pub async fn submit(&self, session: SessionId, mutation: Mutation) -> Result<(), RelayError> {
        self.apply(session, mutation, None).await
    }

    /// Same as `submit`, but peers receive `frame`, the text the event was
    /// parsed from, so fields the relay does not know about survive.
    pub async fn submit_frame(&self, session: SessionId, mutation: Mutation, frame: String) -> Result<(), RelayError> {
        self.apply(session, mutation, Some(frame)).await
    }

    async fn apply(&self, session: SessionId, mutation: Mutation, frame: Option<String>) -> Result<(), RelayError> {
        let key = mutation.room();
        let room = match self.registry.get(key).await {
            Some(room) if room.phase().is_resident() => room,
            _ => return Err(RelayError::NotReady(key.to_string())),
        };

        let mut guard = room.lock().await;
        if !room.phase().is_resident() {
            return Err(RelayError::NotReady(key.to_string()));
        }
        let Some(document) = guard.document.as_mut() else {
            return Err(RelayError::NotReady(key.to_string()));
        };

        document.apply(&mutation.to_operation());
        guard.revision += 1;

        let peers = match frame {
            Some(text) => self.membership.broadcast_text(key, &text, Some(session)).await,
            None => self.membership.broadcast(key, &mutation, Some(session)).await,
        };
        debug!(
            "Applied {} to room {} (revision {}), relayed to {} peers",
            mutation.event_name(),
            key,
            guard.revision,
            peers
        );
        Ok(())
    }

    pub async fn leave(&self, session: SessionId, key: &str) {
        if let Some(remaining) = self.membership.leave(session, key).await {
            info!("Session {} left room {}", session, key);
            self.after_leave(key, remaining).await;
        }
    }

    /// Take a closed connection out of every room it joined. Safe to call
    /// more than once.
    pub async fn disconnect(&self, session: SessionId) {
        let left = self.membership.disconnect(session).await;
        info!("Session {} disconnected, leaving {} rooms", session, left.len());
        for (key, remaining) in left {
            self.after_leave(&key, remaining).await;
        }
    }

    async fn after_leave(&self, key: &str, remaining: usize) {
        self.broadcast_member_count(key).await;
        if remaining == 0 {
            self.begin_draining(key).await;
        }
    }

    async fn broadcast_member_count(&self, key: &str) {
        let count = self.membership.count(key).await;
        self.membership
            .broadcast(key, &SendMessage::UserConnect(UserCountMessage { count }), None)
            .await;
    }

    /// Current snapshot of a room held in memory.
    ///
    /// Ok(None) if the room is not in memory at all.
    pub async fn export_room(&self, key: &str) -> Result<Option<Snapshot>, RelayError> {
        let Some(room) = self.registry.get(key).await else {
            return Ok(None);
        };
        // A loading room holds its lock until the load is done.
        if room.phase() == RoomPhase::Loading {
            return Err(RelayError::NotReady(key.to_string()));
        }
        let guard = room.lock().await;
        match room.phase() {
            RoomPhase::Unloaded => return Ok(None),
            RoomPhase::Loading => return Err(RelayError::NotReady(key.to_string())),
            RoomPhase::Ready | RoomPhase::Draining => {}
        }
        match guard.export() {
            Some(Ok(snapshot)) => Ok(Some(snapshot)),
            Some(Err(source)) => Err(RelayError::Export {
                room: key.to_string(),
                source,
            }),
            None => Err(RelayError::NotReady(key.to_string())),
        }
    }

    pub async fn phase_of(&self, key: &str) -> Option<RoomPhase> {
        self.registry.get(key).await.map(|room| room.phase())
    }

    pub async fn stats(&self) -> RelayStats {
        let mut stats = RelayStats {
            sessions: self.membership.session_count().await,
            ..RelayStats::default()
        };
        for room in self.registry.rooms().await {
            stats.rooms += 1;
            match room.phase() {
                RoomPhase::Loading => stats.loading += 1,
                RoomPhase::Ready => stats.ready += 1,
                RoomPhase::Draining => stats.draining += 1,
                RoomPhase::Unloaded => {}
            }
        }
        stats
    }
}
