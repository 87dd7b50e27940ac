//! TinyToDo Server Library
//!
//! Signed session cookies, an in-memory session store, and per-user change
//! notifications that keep open tabs in sync.

pub mod auth;
pub mod config;
pub mod notify;
pub mod protocol;
pub mod server;
pub mod session;
pub mod todo;

// Re-export commonly used types
pub use notify::ChangeNotificationHub;
pub use protocol::{ChangeEvent, ChangeKind, TodoItem};
pub use server::{AppState, app_router};
pub use session::{SessionManager, SessionSigner, SessionStore};
