pub mod diagnostics;
pub mod health;
pub mod room_export;

pub use diagnostics::*;
pub use health::*;
pub use room_export::*;
