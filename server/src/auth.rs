//! Accounts and password checks
//!
//! The directory stores only password hashes. Hashing and verification sit
//! behind [`PasswordVerifier`]; the shipped implementation is Argon2id with a
//! random salt per hash, stored as a PHC string.

use crate::session::UserRef;
use crate::session::state::expiry_from_now;
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier as _, SaltString, rand_core::OsRng,
    },
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;
use regex::Regex;
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Self-service accounts are deleted 60 minutes after creation
pub const ACCOUNT_TTL: Duration = Duration::from_secs(60 * 60);

/// Length of a generated password
pub const GENERATED_PASSWORD_LEN: usize = 10;

/// Generated passwords avoid look-alike characters (0/o, 1/l)
const PASSWORD_ALPHABET: &[u8] = b"23456789abcdefghijkmnpqrstuvwxyz";

static USER_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.+@-]{1,32}$").expect("user id pattern is a valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("user id must be 1 to 32 letters, digits or _.+@-")]
    MalformedUserId,

    #[error("user id is already taken")]
    UserIdTaken,

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Hashes passwords for storage and checks plaintext against stored hashes
pub trait PasswordVerifier: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, AccountError>;

    fn verify(&self, plaintext: &str, hash: &str) -> bool;
}

/// Argon2id with a fresh random salt for every hash
#[derive(Debug, Clone, Default)]
pub struct Argon2Verifier {
    params: Params,
}

impl Argon2Verifier {
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    fn hasher(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl PasswordVerifier for Argon2Verifier {
    fn hash(&self, plaintext: &str) -> Result<String, AccountError> {
        let salt = SaltString::generate(&mut OsRng);
        self.hasher()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AccountError::Hashing(e.to_string()))
    }

    /// Cost parameters are read back from the stored hash, so hashes made
    /// under older parameters keep verifying.
    fn verify(&self, plaintext: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        self.hasher()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}

/// A freshly created account together with its one-time plaintext password
#[derive(Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub user: UserRef,
    pub password: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

struct Account {
    password_hash: String,
    /// `None` for accounts seeded from configuration
    expires_at: Option<DateTime<Utc>>,
}

impl Account {
    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }
}

/// In-memory account directory
pub struct AccountDirectory {
    accounts: DashMap<String, Account>,
    verifier: Arc<dyn PasswordVerifier>,
}

impl AccountDirectory {
    pub fn new(verifier: Arc<dyn PasswordVerifier>) -> Self {
        Self {
            accounts: DashMap::new(),
            verifier,
        }
    }

    pub fn is_valid_user_id(user_id: &str) -> bool {
        USER_ID_PATTERN.is_match(user_id)
    }

    /// Add a permanent account with a chosen password
    pub fn register(&self, user_id: &str, password: &str) -> Result<UserRef, AccountError> {
        self.insert(user_id, password, None)
    }

    /// Self-service sign-up: the password is generated here and the account
    /// expires after [`ACCOUNT_TTL`].
    pub fn create_account(&self, user_id: &str) -> Result<NewAccount, AccountError> {
        let password = generate_password();
        let expires_at = expiry_from_now(ACCOUNT_TTL);
        let user = self.insert(user_id, &password, Some(expires_at))?;

        info!("Created account {} expiring at {}", user.id, expires_at);
        Ok(NewAccount {
            user,
            password,
            expires_at,
        })
    }

    /// Return the account reference when the credentials match a live account
    pub fn authenticate(&self, user_id: &str, password: &str) -> Option<UserRef> {
        // Copy the hash out so the slow verify does not hold the shard lock
        let password_hash = {
            let account = self.accounts.get(user_id)?;
            if account.is_expired_at(Utc::now()) {
                debug!("Rejected login for expired account {}", user_id);
                return None;
            }
            account.password_hash.clone()
        };

        self.verifier
            .verify(password, &password_hash)
            .then(|| UserRef::new(user_id))
    }

    /// Drop accounts past their expiry
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.accounts.len();
        self.accounts.retain(|_, account| !account.is_expired_at(now));
        before.saturating_sub(self.accounts.len())
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    fn insert(
        &self,
        user_id: &str,
        password: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<UserRef, AccountError> {
        if !Self::is_valid_user_id(user_id) {
            return Err(AccountError::MalformedUserId);
        }
        if self.is_taken(user_id) {
            return Err(AccountError::UserIdTaken);
        }

        let account = Account {
            password_hash: self.verifier.hash(password)?,
            expires_at,
        };

        // Checked again under the entry lock: a racing sign-up may have won
        // while the hash was computed.
        match self.accounts.entry(user_id.to_string()) {
            Entry::Occupied(entry) if !entry.get().is_expired_at(Utc::now()) => {
                Err(AccountError::UserIdTaken)
            }
            Entry::Occupied(mut entry) => {
                entry.insert(account);
                Ok(UserRef::new(user_id))
            }
            Entry::Vacant(entry) => {
                entry.insert(account);
                Ok(UserRef::new(user_id))
            }
        }
    }

    /// An expired account no longer reserves its id
    fn is_taken(&self, user_id: &str) -> bool {
        self.accounts
            .get(user_id)
            .is_some_and(|account| !account.is_expired_at(Utc::now()))
    }
}

impl Default for AccountDirectory {
    fn default() -> Self {
        Self::new(Arc::new(Argon2Verifier::default()))
    }
}

fn generate_password() -> String {
    let mut rng = rand::rng();
    (0..GENERATED_PASSWORD_LEN)
        .map(|_| PASSWORD_ALPHABET[rng.random_range(0..PASSWORD_ALPHABET.len())] as char)
        .collect()
}
