pub mod cookie;
pub mod manager;
pub mod state;
pub mod store;
pub mod token;

pub use cookie::{CookiePolicy, SESSION_COOKIE};
pub use manager::{CheckedSession, EnsuredSession, SessionConfig, SessionManager};
pub use state::{Flash, Session, SessionId, UserRef};
pub use store::SessionStore;
pub use token::SessionSigner;
