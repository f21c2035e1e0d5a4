use crate::db::StoreError;
use crate::drawing::DocumentError;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("room name cannot be empty")]
    InvalidRoom,
    /// The room is absent or has not finished loading.
    #[error("room '{0}' is not ready")]
    NotReady(String),
    #[error("failed to load room '{room}': {source}")]
    LoadFailure {
        room: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to flush room '{room}': {source}")]
    FlushFailure {
        room: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to export room '{room}': {source}")]
    Export {
        room: String,
        #[source]
        source: DocumentError,
    },
}
