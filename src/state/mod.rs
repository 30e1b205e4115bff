//! Shared application state.
//!
//! One explicitly constructed [`AppState`] per process, passed by `Arc` to
//! the router, the team loops and the command layer.

mod app;
mod registry;
mod toggles;

pub use app::AppState;
pub use registry::UserRegistry;
pub use toggles::Toggles;
