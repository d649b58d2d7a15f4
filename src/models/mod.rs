pub mod diagnostics;
pub mod health;
pub mod messages;
pub mod ready;

pub use diagnostics::*;
pub use health::*;
pub use messages::*;
pub use ready::*;
