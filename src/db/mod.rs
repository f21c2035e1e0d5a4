pub mod dbdraw;
pub mod memory;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{info, warn};

use crate::drawing::{DocumentError, Snapshot};

pub use dbdraw::PgProjectStore;
pub use memory::MemoryStore;

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored project is unreadable: {0}")]
    Corrupt(#[from] DocumentError),
    #[error("store is closed")]
    Closed,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable key-value storage for project snapshots, keyed by room name.
pub trait ProjectStore: Send + Sync {
    fn get<'a>(&'a self, room: &'a str) -> StoreFuture<'a, Option<Snapshot>>;

    /// Write the snapshot for `room`, replacing any previous record.
    fn put<'a>(&'a self, room: &'a str, snapshot: &'a Snapshot) -> StoreFuture<'a, ()>;

    fn close(&self) -> StoreFuture<'_, ()>;
}

/// Open the store for the configured database, or an in-memory one.
pub async fn open_store(db_url: Option<&str>) -> Result<Arc<dyn ProjectStore>, StoreError> {
    match db_url {
        Some(db_url) => {
            let store = PgProjectStore::new(db_url).await?;
            store.ensure_schema().await?;
            info!("Project store backed by PostgreSQL");
            Ok(Arc::new(store))
        }
        None => {
            warn!("No database URL configured - projects are kept in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
