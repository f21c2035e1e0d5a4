pub mod eviction_service;
pub mod room_service;

pub use room_service::{RelayStats, RoomService};
