//! The `sessionId` cookie

use crate::session::state::Session;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::OffsetDateTime;

/// Name of the cookie carrying the signed session id
pub const SESSION_COOKIE: &str = "sessionId";

/// Environment-dependent cookie attributes
#[derive(Debug, Clone, Copy, Default)]
pub struct CookiePolicy {
    pub secure: bool,
    pub same_site: Option<SameSite>,
}

impl CookiePolicy {
    /// `HttpOnly; Path=/; Expires=<record expiry>` plus the configured attributes
    pub fn session_cookie(&self, session: &Session) -> Cookie<'static> {
        let mut cookie = self.base(session.id().to_string());
        let expires_at = session.expires_at().timestamp();
        if let Ok(expires) = OffsetDateTime::from_unix_timestamp(expires_at) {
            cookie.set_expires(expires);
        }
        cookie
    }

    fn base(&self, value: String) -> Cookie<'static> {
        // SameSite=None is only honoured on secure cookies
        let secure = self.secure || self.same_site == Some(SameSite::None);

        let mut cookie = Cookie::new(SESSION_COOKIE, value);
        cookie.set_http_only(true);
        cookie.set_path("/");
        cookie.set_secure(secure);
        cookie.set_same_site(self.same_site);
        cookie
    }
}

/// Session token presented by the client, if any
pub fn presented_token(jar: &CookieJar) -> Option<&str> {
    jar.get(SESSION_COOKIE).map(|cookie| cookie.value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::state::DEFAULT_SESSION_TTL;

    fn session() -> Session {
        Session::new("token-value".to_string(), DEFAULT_SESSION_TTL)
    }

    #[test]
    fn test_session_cookie_attributes() {
        let session = session();
        let cookie = CookiePolicy::default().session_cookie(&session);

        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "token-value");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(cookie.same_site(), None);

        let expires = cookie.expires_datetime().expect("Expires must be set");
        assert_eq!(expires.unix_timestamp(), session.expires_at().timestamp());
    }

    #[test]
    fn test_same_site_none_forces_secure() {
        let policy = CookiePolicy {
            secure: false,
            same_site: Some(SameSite::None),
        };
        let cookie = policy.session_cookie(&session());
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::None));
    }

    #[test]
    fn test_secure_flag_from_policy() {
        let policy = CookiePolicy {
            secure: true,
            same_site: Some(SameSite::Lax),
        };
        let rendered = policy.session_cookie(&session()).to_string();
        assert!(rendered.contains("Secure"));
        assert!(rendered.contains("SameSite=Lax"));
        assert!(rendered.contains("HttpOnly"));
    }

    #[test]
    fn test_presented_token() {
        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, "abc"));
        assert_eq!(presented_token(&jar), Some("abc"));
        assert_eq!(presented_token(&CookieJar::new()), None);
    }
}
