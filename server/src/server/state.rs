use crate::auth::AccountDirectory;
use crate::config::Config;
use crate::notify::ChangeNotificationHub;
use crate::session::{CookiePolicy, SessionConfig, SessionManager};
use crate::todo::TodoStore;
use std::sync::Arc;
use tracing::warn;

/// Shared application state
///
/// Built once at startup and cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub hub: Arc<ChangeNotificationHub>,
    pub accounts: Arc<AccountDirectory>,
    pub todos: Arc<TodoStore>,
    pub cookies: CookiePolicy,
}

impl AppState {
    pub fn new(secret: u64) -> Self {
        Self {
            sessions: Arc::new(SessionManager::new(secret)),
            hub: Arc::new(ChangeNotificationHub::new()),
            accounts: Arc::new(AccountDirectory::default()),
            todos: Arc::new(TodoStore::new()),
            cookies: CookiePolicy::default(),
        }
    }

    /// Build state from configuration, seeding demo accounts
    pub fn from_config(config: &Config) -> Self {
        let session_config = SessionConfig {
            ttl: config.session.ttl,
        };
        let sessions = SessionManager::with_config(config.session.secret, session_config);

        let accounts = AccountDirectory::default();
        for (user_id, password) in &config.demo.accounts {
            if let Err(e) = accounts.register(user_id, password) {
                warn!("Skipping demo account {}: {}", user_id, e);
            }
        }

        Self::new(config.session.secret)
            .with_session_manager(Arc::new(sessions))
            .with_accounts(Arc::new(accounts))
            .with_cookie_policy(CookiePolicy {
                secure: config.session.secure_cookie,
                same_site: config.session.same_site,
            })
    }

    pub fn with_session_manager(mut self, sessions: Arc<SessionManager>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_accounts(mut self, accounts: Arc<AccountDirectory>) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn with_cookie_policy(mut self, cookies: CookiePolicy) -> Self {
        self.cookies = cookies;
        self
    }

    /// (active sessions, open observers)
    pub fn get_stats(&self) -> (usize, usize) {
        (self.sessions.session_count(), self.hub.total_observers())
    }
}
