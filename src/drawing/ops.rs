use serde::{Deserialize, Serialize};

/// `[x, y]` in canvas coordinates.
pub type Point = [f64; 2];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrokeStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
}

/// An incremental change to a drawing document.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Extend the open stroke of `uid`, starting one if needed.
    PathProgress {
        uid: String,
        points: Vec<Point>,
        style: StrokeStyle,
    },
    /// Finish the open stroke of `uid` and commit it as an item.
    PathEnd {
        uid: String,
        points: Vec<Point>,
        style: StrokeStyle,
        name: Option<String>,
    },
    RemoveItem {
        name: String,
    },
    MoveItemsProgress {
        names: Vec<String>,
        delta: Point,
    },
    MoveItemsEnd {
        names: Vec<String>,
        delta: Point,
    },
    AddImage {
        name: String,
        data: String,
        position: Point,
    },
    Clear,
}
