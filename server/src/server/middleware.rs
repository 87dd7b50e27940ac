//! Request-level session handling and the outermost fault boundary

use super::AppState;
use crate::session::cookie::presented_token;
use crate::session::{SESSION_COOKIE, Session};
use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use std::any::Any;
use std::sync::Arc;
use tracing::{error, info};

/// The session record attached to the current request
#[derive(Clone)]
pub struct CurrentSession(pub Arc<Session>);

/// Make sure every request carries a session, issuing a cookie for new ones
pub async fn attach_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let ensured = state.sessions.ensure_session(presented_token(&jar));
    let session = ensured.session;

    log_request(&request, &session);
    request
        .extensions_mut()
        .insert(CurrentSession(session.clone()));

    let response = next.run(request).await;

    // A handler that rotated the session already wrote the cookie it wants
    if ensured.is_new && !sets_session_cookie(&response) {
        let jar = CookieJar::new().add(state.cookies.session_cookie(&session));
        return (jar, response).into_response();
    }
    response
}

/// Only let requests with a live session through; everyone else goes to `/login`.
///
/// A stale or forged cookie gets a fresh session cookie with the redirect, and
/// if the request came from inside the app (it has a referer) that session
/// carries a one-time "session invalid" notice.
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let session = match checked_session(&state, &jar, &request) {
        Ok(session) => session,
        Err(redirect) => return redirect,
    };

    request.extensions_mut().insert(CurrentSession(session));
    next.run(request).await
}

/// Like [`require_session`], and the session must also be signed in
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let session = match checked_session(&state, &jar, &request) {
        Ok(session) => session,
        Err(redirect) => return redirect,
    };

    let Some(user) = session.user() else {
        return Redirect::to("/login").into_response();
    };

    let extensions = request.extensions_mut();
    extensions.insert(user);
    extensions.insert(CurrentSession(session));
    next.run(request).await
}

fn checked_session(
    state: &AppState,
    jar: &CookieJar,
    request: &Request,
) -> Result<Arc<Session>, Response> {
    let had_referer = request
        .headers()
        .get(header::REFERER)
        .is_some_and(|value| !value.is_empty());

    let checked = state
        .sessions
        .check_session(presented_token(jar), had_referer);
    log_request(request, &checked.session);

    if checked.should_redirect {
        let jar = CookieJar::new().add(state.cookies.session_cookie(&checked.session));
        return Err((jar, Redirect::to("/login")).into_response());
    }
    Ok(checked.session)
}

/// Turn a panic anywhere below into a plain 500.
///
/// Headers can only be rewritten before the body starts; a stream that is
/// already running never reaches here, so its faults are only logged where
/// they happen.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!("Internal Server Error: {}", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "text/plain")],
        "500 Internal Server Error",
    )
        .into_response()
}

fn sets_session_cookie(response: &Response) -> bool {
    let prefix = format!("{}=", SESSION_COOKIE);
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .any(|value| value.to_str().is_ok_and(|v| v.starts_with(&prefix)))
}

fn log_request(request: &Request, session: &Session) {
    let user_id = session.user().map(|u| u.id).unwrap_or_default();
    info!(
        "{} {} session={} user={}",
        request.method(),
        request.uri(),
        short_id(session.id()),
        user_id
    );
}

/// Enough of a session id to correlate log lines without leaking the credential
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
