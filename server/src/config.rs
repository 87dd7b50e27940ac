//! Server configuration
//!
//! Configuration is loaded from environment variables.

use axum_extra::extract::cookie::SameSite;
use std::env;
use std::time::Duration;
use tracing::warn;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,

    /// Session configuration
    pub session: SessionSettings,

    /// Demo configuration
    pub demo: DemoConfig,
}

/// Session-related configuration
#[derive(Clone)]
pub struct SessionSettings {
    /// Secret the session ids are signed with
    pub secret: u64,
    /// Whether `secret` came from the environment
    pub secret_from_env: bool,
    /// Fixed session lifetime
    pub ttl: Duration,
    /// Mark the cookie `Secure`
    pub secure_cookie: bool,
    /// `SameSite` attribute; omitted when `None`
    pub same_site: Option<SameSite>,
    /// Interval of the background purge of expired sessions
    pub sweep_interval: Duration,
}

impl std::fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSettings")
            .field("secret", &"[REDACTED]")
            .field("secret_from_env", &self.secret_from_env)
            .field("ttl", &self.ttl)
            .field("secure_cookie", &self.secure_cookie)
            .field("same_site", &self.same_site)
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}

/// Demo mode configuration
#[derive(Debug, Clone, Default)]
pub struct DemoConfig {
    /// Accounts to seed as `(user id, plaintext password)`
    pub accounts: Vec<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            session: SessionSettings::default(),
            demo: DemoConfig::default(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            secret: random_secret(),
            secret_from_env: false,
            ttl: Duration::from_secs(60 * 60), // 60 minutes
            secure_cookie: false,
            same_site: None,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Server config
        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }

        // Session config
        match env::var("SESSION_SECRET").ok().map(|s| s.parse::<u64>()) {
            Some(Ok(secret)) => {
                config.session.secret = secret;
                config.session.secret_from_env = true;
            }
            Some(Err(_)) => warn!("SESSION_SECRET is not a u64, using a random secret"),
            None => {}
        }
        if let Ok(val) = env::var("SESSION_TTL_MINUTES") {
            match parse_ttl_minutes(&val) {
                Some(ttl) => config.session.ttl = ttl,
                None => warn!(
                    "SESSION_TTL_MINUTES={:?} is not a usable lifetime, keeping {:?}",
                    val, config.session.ttl
                ),
            }
        }
        if let Ok(val) = env::var("SECURE_COOKIE") {
            config.session.secure_cookie = parse_flag(&val);
        }
        if let Ok(val) = env::var("COOKIE_SAME_SITE") {
            config.session.same_site = parse_same_site(&val);
        }
        if let Ok(val) = env::var("SESSION_SWEEP_INTERVAL_SECS")
            && let Ok(secs) = val.parse::<u64>()
            && secs > 0
        {
            config.session.sweep_interval = Duration::from_secs(secs);
        }

        // Demo config
        if let Ok(val) = env::var("DEMO_ACCOUNTS") {
            config.demo.accounts = parse_accounts(&val);
        }

        config
    }
}

/// Random non-zero secret for when none is configured. Sessions signed with it
/// do not survive a restart.
fn random_secret() -> u64 {
    loop {
        let secret: u64 = rand::random();
        if secret != 0 {
            return secret;
        }
    }
}

/// Positive whole minutes that fit in a `Duration` of seconds
fn parse_ttl_minutes(val: &str) -> Option<Duration> {
    let minutes = val.trim().parse::<u64>().ok().filter(|&m| m > 0)?;
    minutes.checked_mul(60).map(Duration::from_secs)
}

fn parse_flag(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "yes" | "true" | "1")
}

fn parse_same_site(val: &str) -> Option<SameSite> {
    match val.to_lowercase().as_str() {
        "lax" => Some(SameSite::Lax),
        "strict" => Some(SameSite::Strict),
        "none" => Some(SameSite::None),
        _ => None,
    }
}

/// `alice:secret,bob:hunter2`
fn parse_accounts(val: &str) -> Vec<(String, String)> {
    val.split(',')
        .filter_map(|entry| {
            let (user, password) = entry.trim().split_once(':')?;
            (!user.is_empty() && !password.is_empty())
                .then(|| (user.to_string(), password.to_string()))
        })
        .collect()
}
