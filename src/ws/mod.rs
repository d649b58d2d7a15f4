//! Per-document collaboration state: rooms, presence and connection handles.

pub mod awareness;
pub mod connctx;
pub mod error;
pub mod registry;
pub mod room;

pub use awareness::{AwarenessError, ClientId};
pub use connctx::{ConnCtx, ConnectionId};
pub use error::RelayError;
pub use registry::RoomRegistry;
pub use room::Room;
