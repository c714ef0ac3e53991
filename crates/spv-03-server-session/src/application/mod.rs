//! # Application Layer
//!
//! The live session and its notification streams.

pub mod session;
pub mod subscription;

pub use session::ServerSession;
pub use subscription::NotificationStream;
