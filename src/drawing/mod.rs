//! Drawing documents held by rooms.
//!
//! The relay never looks inside a document. It only imports a snapshot when a
//! room loads, applies operations while the room is live, and exports a
//! snapshot for new members and for the store.

pub mod ops;
pub mod project;

pub use ops::{Operation, Point, StrokeStyle};
pub use project::{Item, Project};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Serialized document state as stored durably and sent to new members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(String);

impl Snapshot {
    pub fn new(data: impl Into<String>) -> Self {
        Self(data.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Snapshot {
    fn from(data: String) -> Self {
        Self(data)
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A mutable drawing owned by exactly one room.
pub trait DrawingDocument: Send {
    /// Replace the whole document state with the given snapshot.
    fn import_state(&mut self, snapshot: &Snapshot) -> Result<(), DocumentError>;

    fn export_state(&self) -> Result<Snapshot, DocumentError>;

    fn apply(&mut self, op: &Operation);
}

/// Creates the empty document a freshly loaded room starts from.
pub type DocumentFactory = Arc<dyn Fn() -> Box<dyn DrawingDocument> + Send + Sync>;

pub fn project_factory() -> DocumentFactory {
    Arc::new(|| Box::new(Project::new()) as Box<dyn DrawingDocument>)
}
