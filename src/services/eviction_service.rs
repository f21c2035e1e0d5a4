use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::room_service::RoomService;
use crate::db::StoreError;
use crate::drawing::Snapshot;
use crate::rooms::{RelayError, Room, RoomInner, RoomPhase};

/// Result of a flush that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flushed {
    Written,
    /// The store already held this revision or a newer one.
    Covered,
    /// The eviction it was made for was cancelled or replaced.
    Stale,
}

impl RoomService {
    /// Start the grace period for a room that just lost its last member.
    pub(crate) async fn begin_draining(&self, key: &str) {
        let Some(room) = self.registry.get(key).await else {
            return;
        };
        let mut guard = room.lock().await;
        if room.phase() != RoomPhase::Ready {
            return;
        }
        if self.membership.count(key).await > 0 {
            return;
        }
        self.arm_eviction(&room, &mut guard);
    }

    fn arm_eviction(&self, room: &Arc<Room>, inner: &mut RoomInner) {
        inner.generation += 1;
        let generation = inner.generation;
        room.set_phase(RoomPhase::Draining);

        let grace = self.config.eviction_grace;
        let service = self.clone();
        let target = room.clone();
        inner.eviction = Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            service.evict(target, generation).await;
        }));
        info!("Room {} is empty, evicting in {:?}", room.key(), grace);
    }

    /// Whether the eviction armed with `generation` may still go ahead.
    async fn eviction_current(&self, room: &Room, current: u64, generation: u64) -> bool {
        current == generation
            && room.phase() == RoomPhase::Draining
            && self.membership.count(room.key()).await == 0
    }

    /// Flush a draining room and release it.
    ///
    /// The store write happens without the room lock, so a member that
    /// comes back meanwhile gets the resident document right away. The
    /// room is only released if nobody came back and nothing changed
    /// while the write was in flight.
    async fn evict(&self, room: Arc<Room>, generation: u64) {
        let key = room.key().to_string();
        loop {
            let (snapshot, revision) = {
                let mut guard = room.lock().await;
                if !self.eviction_current(&room, guard.generation, generation).await {
                    debug!("Eviction of room {} no longer current", key);
                    return;
                }
                let snapshot = match guard.export() {
                    Some(Ok(snapshot)) => snapshot,
                    Some(Err(e)) => {
                        error!("Failed to export room {} for eviction: {}", key, e);
                        self.arm_eviction(&room, &mut guard);
                        return;
                    }
                    None => return,
                };
                guard.flushes_in_flight += 1;
                (snapshot, guard.revision)
            };

            let flushed = self
                .flush_with_retry(&room, &snapshot, revision, Some(generation))
                .await;

            let mut guard = room.lock().await;
            guard.flushes_in_flight = guard.flushes_in_flight.saturating_sub(1);
            if !self.eviction_current(&room, guard.generation, generation).await {
                info!("Room {} was rejoined during its final flush, keeping it loaded", key);
                return;
            }

            match flushed {
                Err(e) => {
                    error!("{}; keeping room loaded and retrying later", e);
                    self.arm_eviction(&room, &mut guard);
                    return;
                }
                Ok(_) if guard.revision != revision => {
                    debug!("Room {} changed during its final flush, flushing again", key);
                    continue;
                }
                Ok(_) => {
                    guard.document = None;
                    guard.eviction = None;
                    room.set_phase(RoomPhase::Unloaded);
                    self.registry.remove(&room).await;
                    info!("Room {} flushed and evicted", key);
                    return;
                }
            }
        }
    }

    /// Write a snapshot, retrying with exponential backoff.
    ///
    /// With `generation` set, every attempt first checks that the eviction
    /// it belongs to is still the armed one, and gives up quietly if not.
    /// The caller must not hold the room lock in that case.
    pub(crate) async fn flush_with_retry(
        &self,
        room: &Room,
        snapshot: &Snapshot,
        revision: u64,
        generation: Option<u64>,
    ) -> Result<Flushed, RelayError> {
        let key = room.key();
        let attempts = self.config.flush_retry_attempts.max(1);
        let mut backoff = self.config.flush_retry_backoff;
        let mut attempt = 1;
        loop {
            if let Some(generation) = generation {
                if room.lock().await.generation != generation {
                    debug!("Flush of room {} superseded before attempt {}", key, attempt);
                    return Ok(Flushed::Stale);
                }
            }
            match self.write_snapshot(room, snapshot, revision).await {
                Ok(flushed) => {
                    if attempt > 1 {
                        info!("Room {} flushed on attempt {}", key, attempt);
                    }
                    return Ok(flushed);
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        "Flush of room {} failed (attempt {}/{}): {}",
                        key, attempt, attempts, e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(RelayError::FlushFailure {
                        room: key.to_string(),
                        source,
                    })
                }
            }
        }
    }

    /// One store write, serialised with every other write for the room.
    ///
    /// Skipped when the store already holds this revision or a newer one,
    /// so a late writer can never replace newer state.
    async fn write_snapshot(&self, room: &Room, snapshot: &Snapshot, revision: u64) -> Result<Flushed, StoreError> {
        let mut written = room.lock_writes().await;
        if matches!(*written, Some(last) if last >= revision) {
            debug!(
                "Room {} revision {} already covered by a newer write",
                room.key(),
                revision
            );
            return Ok(Flushed::Covered);
        }
        self.store.put(room.key(), snapshot).await?;
        *written = Some(revision);
        Ok(Flushed::Written)
    }

    /// Flush every resident room and close the store.
    pub async fn shutdown(&self) {
        let rooms = self.registry.rooms().await;
        info!("Flushing {} rooms before shutdown", rooms.len());
        for room in rooms {
            let guard = room.lock().await;
            if !room.phase().is_resident() {
                continue;
            }
            match guard.export() {
                Some(Ok(snapshot)) => {
                    if let Err(e) = self
                        .flush_with_retry(&room, &snapshot, guard.revision, None)
                        .await
                    {
                        error!("{}", e);
                    }
                }
                Some(Err(e)) => error!("Failed to export room {}: {}", room.key(), e),
                None => {}
            }
        }
        if let Err(e) = self.store.close().await {
            error!("Failed to close project store: {}", e);
        }
    }
}
