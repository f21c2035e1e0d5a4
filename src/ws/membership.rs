use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error};
use uuid::Uuid;

pub type SessionId = Uuid;

/// Outgoing text frames for one connection.
pub type Outbox = mpsc::UnboundedSender<String>;

struct SessionEntry {
    outbox: Outbox,
    joined: HashSet<String>,
}

#[derive(Default)]
struct MembershipInner {
    sessions: HashMap<SessionId, SessionEntry>,
    rooms: HashMap<String, HashSet<SessionId>>,
}

/// Which sessions are joined to which rooms.
///
/// This is the only place member counts come from, and the fan-out group
/// for every room.
#[derive(Default)]
pub struct Membership {
    inner: RwLock<MembershipInner>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connect(&self, session: SessionId, outbox: Outbox) {
        let mut inner = self.inner.write().await;
        inner.sessions.insert(
            session,
            SessionEntry {
                outbox,
                joined: HashSet::new(),
            },
        );
    }

    /// Forget a session. Returns each room it was in with the member count
    /// left behind. Calling it again for the same session returns nothing.
    pub async fn disconnect(&self, session: SessionId) -> Vec<(String, usize)> {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.sessions.remove(&session) else {
            return Vec::new();
        };

        let mut left = Vec::with_capacity(entry.joined.len());
        for room in entry.joined {
            let remaining = remove_member(&mut inner.rooms, &room, session);
            left.push((room, remaining));
        }
        left
    }

    /// Add a session to a room and return the new member count.
    ///
    /// Returns None for an unknown session.
    pub async fn join(&self, session: SessionId, room: &str) -> Option<usize> {
        let mut inner = self.inner.write().await;
        let entry = inner.sessions.get_mut(&session)?;
        entry.joined.insert(room.to_string());
        let members = inner.rooms.entry(room.to_string()).or_default();
        members.insert(session);
        Some(members.len())
    }

    /// Remove a session from a room and return the count left behind.
    ///
    /// Returns None if the session was not a member.
    pub async fn leave(&self, session: SessionId, room: &str) -> Option<usize> {
        let mut inner = self.inner.write().await;
        let entry = inner.sessions.get_mut(&session)?;
        if !entry.joined.remove(room) {
            return None;
        }
        Some(remove_member(&mut inner.rooms, room, session))
    }

    pub async fn is_connected(&self, session: SessionId) -> bool {
        self.inner.read().await.sessions.contains_key(&session)
    }

    pub async fn count(&self, room: &str) -> usize {
        self.inner
            .read()
            .await
            .rooms
            .get(room)
            .map_or(0, |members| members.len())
    }

    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn joined_rooms(&self, session: SessionId) -> Vec<String> {
        self.inner
            .read()
            .await
            .sessions
            .get(&session)
            .map(|entry| entry.joined.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Send a message to one session. A closed connection is ignored.
    pub async fn send<T: Serialize>(&self, session: SessionId, msg: &T) {
        let Some(text) = encode(msg) else {
            return;
        };
        let inner = self.inner.read().await;
        if let Some(entry) = inner.sessions.get(&session) {
            if entry.outbox.send(text).is_err() {
                debug!("Session {} is gone, dropping message", session);
            }
        }
    }

    /// Send a message to every member of `room` except `except`.
    ///
    /// Returns how many members it was handed to. Members whose connection
    /// is already closed are skipped.
    pub async fn broadcast<T: Serialize>(&self, room: &str, msg: &T, except: Option<SessionId>) -> usize {
        let Some(text) = encode(msg) else {
            return 0;
        };
        self.broadcast_text(room, &text, except).await
    }

    /// Like `broadcast`, for a frame that is already encoded.
    pub async fn broadcast_text(&self, room: &str, text: &str, except: Option<SessionId>) -> usize {
        let inner = self.inner.read().await;
        let Some(members) = inner.rooms.get(room) else {
            return 0;
        };

        let mut delivered = 0;
        for session in members {
            if Some(*session) == except {
                continue;
            }
            let Some(entry) = inner.sessions.get(session) else {
                continue;
            };
            if entry.outbox.send(text.to_string()).is_ok() {
                delivered += 1;
            } else {
                debug!("Peer {} in room {} is gone, skipping", session, room);
            }
        }
        delivered
    }
}

fn remove_member(rooms: &mut HashMap<String, HashSet<SessionId>>, room: &str, session: SessionId) -> usize {
    let Some(members) = rooms.get_mut(room) else {
        return 0;
    };
    members.remove(&session);
    let remaining = members.len();
    if remaining == 0 {
        rooms.remove(room);
    }
    remaining
}

fn encode<T: Serialize>(msg: &T) -> Option<String> {
    match serde_json::to_string(msg) {
        Ok(text) => Some(text),
        Err(e) => {
            error!("Failed to encode outgoing message: {}", e);
            None
        }
    }
}
