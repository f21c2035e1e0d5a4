use serde::{Deserialize, Serialize};

use crate::drawing::{Operation, Point, StrokeStyle};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SubscribeMessage {
    pub room: String,
}

/// Stroke progress or end.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DrawMessage {
    pub room: String,
    pub uid: String,
    pub coordinates: Vec<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// Item name for a finished stroke.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl DrawMessage {
    fn style(&self) -> StrokeStyle {
        StrokeStyle {
            color: self.color.clone(),
            width: self.width,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClearMessage {
    pub room: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoveItemMessage {
    pub room: String,
    pub uid: String,
    pub item_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoveItemsMessage {
    pub room: String,
    pub uid: String,
    pub item_names: Vec<String>,
    pub delta: Point,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddImageMessage {
    pub room: String,
    pub uid: String,
    pub data: String,
    pub position: Point,
    pub name: String,
}

/// Frames a client may send.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event")]
pub enum ReceivedMessage {
    #[serde(rename = "subscribe")]
    Subscribe(SubscribeMessage),
    #[serde(rename = "draw:progress")]
    DrawProgress(DrawMessage),
    #[serde(rename = "draw:end")]
    DrawEnd(DrawMessage),
    #[serde(rename = "canvas:clear")]
    CanvasClear(ClearMessage),
    #[serde(rename = "item:remove")]
    ItemRemove(RemoveItemMessage),
    #[serde(rename = "item:move:progress")]
    ItemMoveProgress(MoveItemsMessage),
    #[serde(rename = "item:move:end")]
    ItemMoveEnd(MoveItemsMessage),
    #[serde(rename = "image:add")]
    ImageAdd(AddImageMessage),
}

impl ReceivedMessage {
    /// Split a drawing event off from a subscribe request.
    pub fn into_mutation(self) -> Result<Mutation, SubscribeMessage> {
        match self {
            ReceivedMessage::Subscribe(msg) => Err(msg),
            ReceivedMessage::DrawProgress(msg) => Ok(Mutation::DrawProgress(msg)),
            ReceivedMessage::DrawEnd(msg) => Ok(Mutation::DrawEnd(msg)),
            ReceivedMessage::CanvasClear(msg) => Ok(Mutation::CanvasClear(msg)),
            ReceivedMessage::ItemRemove(msg) => Ok(Mutation::ItemRemove(msg)),
            ReceivedMessage::ItemMoveProgress(msg) => Ok(Mutation::ItemMoveProgress(msg)),
            ReceivedMessage::ItemMoveEnd(msg) => Ok(Mutation::ItemMoveEnd(msg)),
            ReceivedMessage::ImageAdd(msg) => Ok(Mutation::ImageAdd(msg)),
        }
    }
}

/// A drawing event targeting one room.
///
/// Fields outside the known payload are ignored here. The websocket path
/// relays the raw frame, so peers still get them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event")]
pub enum Mutation {
    #[serde(rename = "draw:progress")]
    DrawProgress(DrawMessage),
    #[serde(rename = "draw:end")]
    DrawEnd(DrawMessage),
    #[serde(rename = "canvas:clear")]
    CanvasClear(ClearMessage),
    #[serde(rename = "item:remove")]
    ItemRemove(RemoveItemMessage),
    #[serde(rename = "item:move:progress")]
    ItemMoveProgress(MoveItemsMessage),
    #[serde(rename = "item:move:end")]
    ItemMoveEnd(MoveItemsMessage),
    #[serde(rename = "image:add")]
    ImageAdd(AddImageMessage),
}

impl Mutation {
    pub fn room(&self) -> &str {
        match self {
            Mutation::DrawProgress(msg) | Mutation::DrawEnd(msg) => &msg.room,
            Mutation::CanvasClear(msg) => &msg.room,
            Mutation::ItemRemove(msg) => &msg.room,
            Mutation::ItemMoveProgress(msg) | Mutation::ItemMoveEnd(msg) => &msg.room,
            Mutation::ImageAdd(msg) => &msg.room,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Mutation::DrawProgress(_) => "draw:progress",
            Mutation::DrawEnd(_) => "draw:end",
            Mutation::CanvasClear(_) => "canvas:clear",
            Mutation::ItemRemove(_) => "item:remove",
            Mutation::ItemMoveProgress(_) => "item:move:progress",
            Mutation::ItemMoveEnd(_) => "item:move:end",
            Mutation::ImageAdd(_) => "image:add",
        }
    }

    pub fn to_operation(&self) -> Operation {
        match self {
            Mutation::DrawProgress(msg) => Operation::PathProgress {
                uid: msg.uid.clone(),
                points: msg.coordinates.clone(),
                style: msg.style(),
            },
            Mutation::DrawEnd(msg) => Operation::PathEnd {
                uid: msg.uid.clone(),
                points: msg.coordinates.clone(),
                style: msg.style(),
                name: msg.name.clone(),
            },
            Mutation::CanvasClear(_) => Operation::Clear,
            Mutation::ItemRemove(msg) => Operation::RemoveItem {
                name: msg.item_name.clone(),
            },
            Mutation::ItemMoveProgress(msg) => Operation::MoveItemsProgress {
                names: msg.item_names.clone(),
                delta: msg.delta,
            },
            Mutation::ItemMoveEnd(msg) => Operation::MoveItemsEnd {
                names: msg.item_names.clone(),
                delta: msg.delta,
            },
            Mutation::ImageAdd(msg) => Operation::AddImage {
                name: msg.name.clone(),
                data: msg.data.clone(),
                position: msg.position,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProjectLoadMessage {
    /// Exported project snapshot.
    pub project: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserCountMessage {
    pub count: usize,
}

/// Frames the server sends besides relayed mutations.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event")]
pub enum SendMessage {
    #[serde(rename = "loading:start")]
    LoadingStart,
    #[serde(rename = "loading:end")]
    LoadingEnd,
    #[serde(rename = "project:load")]
    ProjectLoad(ProjectLoadMessage),
    #[serde(rename = "project:load:error")]
    ProjectLoadError,
    #[serde(rename = "user:connect")]
    UserConnect(UserCountMessage),
}
