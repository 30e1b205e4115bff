//! Chat-side data model and transport boundaries.
//!
//! The actual chat-network transport lives outside this crate; it delivers
//! [`ChatMessage`] values into the router and receives replies through the
//! [`MessageSender`] trait.

mod message;
mod sender;

pub mod console;

pub use message::{ChatMessage, MessageKind};
pub use sender::MessageSender;
