use crate::session::state::{DEFAULT_SESSION_TTL, Flash, Session};
use crate::session::store::SessionStore;
use crate::session::token::SessionSigner;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fixed lifetime of a record from creation
    pub ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_SESSION_TTL,
        }
    }
}

/// Why a presented token did not resolve to a live record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No cookie was presented
    Absent,
    /// Bad base64, wrong length or wrong tag
    Invalid,
    /// Signature was fine but the record is gone or expired
    Unknown,
}

impl Rejection {
    fn as_str(&self) -> &'static str {
        match self {
            Rejection::Absent => "absent",
            Rejection::Invalid => "invalid",
            Rejection::Unknown => "unknown",
        }
    }
}

/// Result of [`SessionManager::ensure_session`]
#[derive(Debug, Clone)]
pub struct EnsuredSession {
    pub session: Arc<Session>,
    /// A cookie must be written only when this is true
    pub is_new: bool,
}

/// Result of [`SessionManager::check_session`]
#[derive(Debug, Clone)]
pub struct CheckedSession {
    pub session: Arc<Session>,
    /// The presented session was unusable and the client belongs on the login page
    pub should_redirect: bool,
}

/// Session manager: verifies presented tokens and mints replacements.
///
/// Never fails for a missing or bad credential; callers always get a usable
/// record back.
pub struct SessionManager {
    signer: SessionSigner,
    store: SessionStore,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(secret: u64) -> Self {
        Self::with_config(secret, SessionConfig::default())
    }

    pub fn with_config(secret: u64, config: SessionConfig) -> Self {
        Self {
            signer: SessionSigner::new(secret),
            store: SessionStore::new(),
            config,
        }
    }

    /// Return the presented session if it is valid and live, otherwise a new one
    pub fn ensure_session(&self, presented: Option<&str>) -> EnsuredSession {
        match self.resolve(presented) {
            Ok(session) => EnsuredSession {
                session,
                is_new: false,
            },
            Err(_) => EnsuredSession {
                session: self.start_session(),
                is_new: true,
            },
        }
    }

    /// Like [`ensure_session`](Self::ensure_session), but flags that the caller
    /// should redirect to login whenever a new record had to be created.
    ///
    /// A referer is evidence the client believed it was mid-session, so the
    /// new record then carries a one-shot "session invalid" notice. A direct
    /// visit without a referer is the normal first-visit path and gets none.
    pub fn check_session(&self, presented: Option<&str>, had_referer: bool) -> CheckedSession {
        match self.resolve(presented) {
            Ok(session) => CheckedSession {
                session,
                should_redirect: false,
            },
            Err(rejection) => {
                let session = self.start_session();
                if had_referer {
                    debug!(
                        "Attaching session-invalid notice after {} credential",
                        rejection.as_str()
                    );
                    session.set_flash(Flash::SessionInvalid);
                }
                CheckedSession {
                    session,
                    should_redirect: true,
                }
            }
        }
    }

    /// Create and store a brand-new record
    pub fn start_session(&self) -> Arc<Session> {
        let session = Arc::new(Session::new(self.signer.generate(), self.config.ttl));
        self.store.insert(session.clone());
        counter!("tinytodo_sessions_created_total").increment(1);
        debug!("Started session expiring at {}", session.expires_at());
        session
    }

    /// Remove a record. The caller still has to clear the client cookie.
    pub fn revoke_session(&self, id: &str) -> bool {
        let removed = self.store.remove(id).is_some();
        if removed {
            counter!("tinytodo_sessions_revoked_total").increment(1);
            info!("Revoked session");
        }
        removed
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Clean up expired sessions
    pub fn cleanup_expired(&self) -> usize {
        let purged = self.store.purge_expired();
        if purged > 0 {
            info!("Purged {} expired sessions", purged);
        }
        purged
    }

    pub fn session_count(&self) -> usize {
        self.store.len()
    }

    fn resolve(&self, presented: Option<&str>) -> Result<Arc<Session>, Rejection> {
        let rejection = match presented.filter(|token| !token.is_empty()) {
            None => Rejection::Absent,
            Some(token) if !self.signer.verify(token) => {
                warn!("Rejected session cookie with invalid signature");
                Rejection::Invalid
            }
            Some(token) => match self.store.lookup(token) {
                Some(session) => return Ok(session),
                None => {
                    warn!("Rejected session cookie for unknown or expired session");
                    Rejection::Unknown
                }
            },
        };

        counter!("tinytodo_session_rejections_total", "reason" => rejection.as_str())
            .increment(1);
        Err(rejection)
    }
}
