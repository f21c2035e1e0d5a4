use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::{DocumentError, DrawingDocument, Operation, Point, Snapshot, StrokeStyle};

/// A committed item on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Item {
    Path {
        name: String,
        points: Vec<Point>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<f64>,
    },
    Raster {
        name: String,
        source: String,
        position: Point,
    },
}

impl Item {
    pub fn name(&self) -> &str {
        match self {
            Item::Path { name, .. } | Item::Raster { name, .. } => name,
        }
    }

    fn translate(&mut self, delta: Point) {
        match self {
            Item::Path { points, .. } => {
                for point in points.iter_mut() {
                    point[0] += delta[0];
                    point[1] += delta[1];
                }
            }
            Item::Raster { position, .. } => {
                position[0] += delta[0];
                position[1] += delta[1];
            }
        }
    }
}

/// Stroke still being drawn by a member.
#[derive(Debug, Clone, Default)]
struct OpenPath {
    points: Vec<Point>,
    style: StrokeStyle,
}

/// Exported form of a project.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ProjectState {
    #[serde(default)]
    items: Vec<Item>,
}

/// Single-layer vector project.
///
/// Items are kept in insertion order, which is also their stacking order.
/// Open strokes are keyed by the member that draws them and are never
/// exported.
#[derive(Debug, Default)]
pub struct Project {
    items: Vec<Item>,
    open_paths: HashMap<String, OpenPath>,
    next_seq: u64,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn item(&self, name: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.name() == name)
    }

    pub fn open_path_count(&self) -> usize {
        self.open_paths.len()
    }

    fn progress_path(&mut self, uid: &str, points: &[Point], style: &StrokeStyle) {
        let open = self.open_paths.entry(uid.to_string()).or_default();
        if open.points.is_empty() {
            open.style = style.clone();
        }
        open.points.extend_from_slice(points);
    }

    fn end_path(&mut self, uid: &str, points: &[Point], style: &StrokeStyle, name: Option<&str>) {
        let mut open = self.open_paths.remove(uid).unwrap_or_else(|| OpenPath {
            points: Vec::new(),
            style: style.clone(),
        });
        open.points.extend_from_slice(points);
        if open.points.is_empty() {
            debug!("Ignoring empty stroke from {}", uid);
            return;
        }

        let name = match name {
            Some(name) => name.to_string(),
            None => self.generated_name(uid),
        };
        // A stroke committed under an existing name replaces that item.
        self.items.retain(|item| item.name() != name);
        self.items.push(Item::Path {
            name,
            points: open.points,
            color: open.style.color,
            width: open.style.width,
        });
    }

    fn generated_name(&mut self, uid: &str) -> String {
        loop {
            let candidate = format!("{}:{}", uid, self.next_seq);
            self.next_seq += 1;
            if self.item(&candidate).is_none() {
                return candidate;
            }
        }
    }

    fn move_items(&mut self, names: &[String], delta: Point) {
        for item in self.items.iter_mut() {
            if names.iter().any(|name| name == item.name()) {
                item.translate(delta);
            }
        }
    }
}

impl DrawingDocument for Project {
    fn import_state(&mut self, snapshot: &Snapshot) -> Result<(), DocumentError> {
        let state: ProjectState = serde_json::from_str(snapshot.as_str())?;
        self.items = state.items;
        self.open_paths.clear();
        self.next_seq = self.items.len() as u64;
        Ok(())
    }

    fn export_state(&self) -> Result<Snapshot, DocumentError> {
        let state = ProjectState {
            items: self.items.clone(),
        };
        Ok(Snapshot::new(serde_json::to_string(&state)?))
    }

    fn apply(&mut self, op: &Operation) {
        match op {
            Operation::PathProgress { uid, points, style } => self.progress_path(uid, points, style),
            Operation::PathEnd {
                uid,
                points,
                style,
                name,
            } => self.end_path(uid, points, style, name.as_deref()),
            Operation::RemoveItem { name } => self.items.retain(|item| item.name() != name.as_str()),
            Operation::MoveItemsProgress { names, delta } | Operation::MoveItemsEnd { names, delta } => {
                self.move_items(names, *delta)
            }
            Operation::AddImage {
                name,
                data,
                position,
            } => {
                self.items.retain(|item| item.name() != name.as_str());
                self.items.push(Item::Raster {
                    name: name.clone(),
                    source: data.clone(),
                    position: *position,
                });
            }
            Operation::Clear => {
                self.items.clear();
                self.open_paths.clear();
            }
        }
    }
}
