use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use tokio::task::JoinHandle;

use crate::drawing::{DocumentError, DrawingDocument, Snapshot};

/// Lifecycle of a room's in-memory state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomPhase {
    /// Created, waiting for the store load to finish.
    Loading,
    Ready,
    /// No members left; an eviction timer is armed.
    Draining,
    /// Terminal. The document has been released.
    Unloaded,
}

impl RoomPhase {
    /// Whether the document is loaded and may be read or mutated.
    pub fn is_resident(self) -> bool {
        matches!(self, RoomPhase::Ready | RoomPhase::Draining)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoomPhase::Loading => "loading",
            RoomPhase::Ready => "ready",
            RoomPhase::Draining => "draining",
            RoomPhase::Unloaded => "unloaded",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            RoomPhase::Loading => 0,
            RoomPhase::Ready => 1,
            RoomPhase::Draining => 2,
            RoomPhase::Unloaded => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => RoomPhase::Loading,
            1 => RoomPhase::Ready,
            2 => RoomPhase::Draining,
            _ => RoomPhase::Unloaded,
        }
    }
}

impl fmt::Display for RoomPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State guarded by the room lock.
#[derive(Default)]
pub struct RoomInner {
    pub(crate) document: Option<Box<dyn DrawingDocument>>,
    /// Bumped whenever an eviction is armed or cancelled. A timer only acts
    /// if the generation it was armed with is still current.
    pub(crate) generation: u64,
    /// Number of mutations applied since the room loaded.
    pub(crate) revision: u64,
    pub(crate) eviction: Option<JoinHandle<()>>,
    /// Eviction flushes currently writing to the store without the lock.
    pub(crate) flushes_in_flight: u32,
}

impl RoomInner {
    pub fn export(&self) -> Option<Result<Snapshot, DocumentError>> {
        self.document.as_ref().map(|document| document.export_state())
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// One named room.
///
/// Everything that reads or changes the document holds the room lock for
/// the whole operation. The tokio mutex queues waiters in FIFO order, which
/// is what keeps mutations in arrival order. The phase can also be read
/// without the lock so that mutations can be turned away while loading.
pub struct Room {
    key: String,
    phase: AtomicU8,
    inner: Arc<Mutex<RoomInner>>,
    /// Serialises store writes. Holds the revision last written, if any.
    written: Mutex<Option<u64>>,
}

impl Room {
    pub(crate) fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            phase: AtomicU8::new(RoomPhase::Loading.to_u8()),
            inner: Arc::new(Mutex::new(RoomInner::default())),
            written: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn phase(&self) -> RoomPhase {
        RoomPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Only called with the room lock held, or while the lock is being
    /// released by an abandoned load.
    pub(crate) fn set_phase(&self, phase: RoomPhase) {
        self.phase.store(phase.to_u8(), Ordering::SeqCst);
    }

    pub async fn lock(&self) -> OwnedMutexGuard<RoomInner> {
        self.inner.clone().lock_owned().await
    }

    /// Take the store write lock for this room.
    ///
    /// May be taken while holding the room lock, never the other way round.
    pub(crate) async fn lock_writes(&self) -> MutexGuard<'_, Option<u64>> {
        self.written.lock().await
    }

    /// Cancel a pending eviction and make the room `Ready` again.
    ///
    /// Returns false when no eviction was armed.
    pub(crate) fn cancel_eviction(&self, inner: &mut RoomInner) -> bool {
        if self.phase() != RoomPhase::Draining {
            return false;
        }
        inner.generation += 1;
        if let Some(handle) = inner.eviction.take() {
            // A flush already in flight finishes on its own and then sees the
            // stale generation.
            if inner.flushes_in_flight == 0 {
                handle.abort();
            }
        }
        self.set_phase(RoomPhase::Ready);
        true
    }
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("key", &self.key)
            .field("phase", &self.phase())
            .finish()
    }
}
