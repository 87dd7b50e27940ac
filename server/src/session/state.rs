use crate::auth::NewAccount;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Session ID: the signed token string that names the record
pub type SessionId = String;

/// Sessions live for a fixed 60 minutes from creation
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);

/// Reference to an authenticated account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
}

impl UserRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// One-shot payload carried across a redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flash {
    /// The client presented a session that is missing, forged or expired
    SessionInvalid,
    /// Credentials were rejected on the login form
    LoginFailed,
    /// Sign-up succeeded; the generated password is shown exactly once
    AccountCreated(NewAccount),
    UserIdTaken,
    UserIdMalformed,
    /// Sign-up failed for a reason the user cannot fix
    AccountCreationFailed,
}

impl Flash {
    pub fn message(&self) -> &'static str {
        match self {
            Flash::SessionInvalid => "Your session is invalid or has expired. Log in again.",
            Flash::LoginFailed => "Incorrect user ID or password.",
            Flash::AccountCreated(_) => "Your account has been created.",
            Flash::UserIdTaken => "That user ID is already taken. Please try another one.",
            Flash::UserIdMalformed => "Use 1 to 32 letters, digits or _ . + @ - for a user ID.",
            Flash::AccountCreationFailed => "The account could not be created. Please try again.",
        }
    }
}

#[derive(Debug, Default)]
struct SessionData {
    user: Option<UserRef>,
    flash: Option<Flash>,
}

/// Server-side session record
///
/// `id` and `expires_at` are fixed at creation. The expiry is never extended
/// by later activity. The user reference and flash slot are mutated by the
/// request that owns the record for its lifetime.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    expires_at: DateTime<Utc>,
    data: Mutex<SessionData>,
}

impl Session {
    pub fn new(id: SessionId, ttl: Duration) -> Self {
        Self::with_expiry(id, expiry_from_now(ttl))
    }

    pub fn with_expiry(id: SessionId, expires_at: DateTime<Utc>) -> Self {
        Self {
            id,
            expires_at,
            data: Mutex::new(SessionData::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn user(&self) -> Option<UserRef> {
        self.data().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.data().user.is_some()
    }

    pub fn sign_in(&self, user: UserRef) {
        self.data().user = Some(user);
    }

    pub fn sign_out(&self) {
        self.data().user = None;
    }

    pub fn set_flash(&self, flash: Flash) {
        self.data().flash = Some(flash);
    }

    /// Read and clear the flash slot
    pub fn take_flash(&self) -> Option<Flash> {
        self.data().flash.take()
    }

    /// Take the flash only when `wanted` accepts it; anything else stays put
    pub fn take_flash_if(&self, wanted: impl FnOnce(&Flash) -> bool) -> Option<Flash> {
        let mut data = self.data();
        if data.flash.as_ref().is_some_and(wanted) {
            data.flash.take()
        } else {
            None
        }
    }

    pub fn has_flash(&self) -> bool {
        self.data().flash.is_some()
    }

    fn data(&self) -> MutexGuard<'_, SessionData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Absolute expiry for a record created now
pub fn expiry_from_now(ttl: Duration) -> DateTime<Utc> {
    let now = Utc::now();
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Get current timestamp in milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
