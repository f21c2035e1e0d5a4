use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ProjectStore, StoreError, StoreFuture};
use crate::drawing::Snapshot;

/// In-process project store.
///
/// Used when no database is configured. Reads and writes are counted, and
/// either side can be slowed down or made to fail, which the room
/// tests rely on.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Snapshot>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    failing_writes: AtomicUsize,
    read_delay_ms: AtomicUsize,
    write_delay_ms: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record without counting it as a write.
    pub async fn insert(&self, room: &str, snapshot: Snapshot) {
        self.records.lock().await.insert(room.to_string(), snapshot);
    }

    pub async fn record(&self, room: &str) -> Option<Snapshot> {
        self.records.lock().await.get(room).cloned()
    }

    /// Number of `get` calls served, failed ones included.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of successful `put` calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make the next `count` writes fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn set_read_delay(&self, delay: Duration) {
        self.read_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn take_write_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl ProjectStore for MemoryStore {
    fn get<'a>(&'a self, room: &'a str) -> StoreFuture<'a, Option<Snapshot>> {
        Box::pin(async move {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let delay = self.read_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            }
            if self.is_closed() {
                return Err(StoreError::Closed);
            }
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable(format!("read of '{}' refused", room)));
            }
            Ok(self.records.lock().await.get(room).cloned())
        })
    }

    fn put<'a>(&'a self, room: &'a str, snapshot: &'a Snapshot) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let delay = self.write_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            }
            if self.is_closed() {
                return Err(StoreError::Closed);
            }
            if self.take_write_failure() {
                return Err(StoreError::Unavailable(format!("write of '{}' refused", room)));
            }
            debug!("Storing {} bytes for room {}", snapshot.len(), room);
            self.records
                .lock()
                .await
                .insert(room.to_string(), snapshot.clone());
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn close(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        })
    }
}
