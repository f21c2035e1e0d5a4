pub mod error;
pub mod registry;
pub mod room;

pub use error::RelayError;
pub use registry::{Resolved, RoomRegistry};
pub use room::{Room, RoomInner, RoomPhase};
