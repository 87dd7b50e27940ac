//! Common Test Utilities for Integration Tests
//!
//! Shared helpers used across integration test modules.

#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use futures_util::StreamExt;
use std::time::Duration;
use argon2::Params;
use std::sync::Arc;
use tinytodo_server::auth::{AccountDirectory, Argon2Verifier};
use tinytodo_server::session::UserRef;
use tinytodo_server::{AppState, app_router};

pub const TEST_SECRET: u64 = 0x5eed_cafe_f00d_beef;

/// Argon2 at its minimum cost so tests do not spend seconds hashing
pub fn test_accounts() -> AccountDirectory {
    let params = Params::new(
        Params::MIN_M_COST,
        Params::MIN_T_COST,
        Params::MIN_P_COST,
        None,
    )
    .unwrap();
    AccountDirectory::new(Arc::new(Argon2Verifier::new(params)))
}

/// Create a test application router with state and two registered accounts
pub fn create_test_app_with_state() -> (Router, AppState) {
    let accounts = test_accounts();
    accounts.register("alice", "wonderland").unwrap();
    accounts.register("bob", "builder").unwrap();
    let state = AppState::new(TEST_SECRET).with_accounts(Arc::new(accounts));

    (app_router(state.clone()), state)
}

/// Create a test application router with all routes configured
pub fn create_test_app() -> Router {
    create_test_app_with_state().0
}

/// Mint a signed-in session directly and return its cookie value
pub fn signed_in_token(state: &AppState, user_id: &str) -> String {
    let session = state.sessions.start_session();
    session.sign_in(UserRef::new(user_id));
    session.id().to_string()
}

/// Value of the `sessionId` cookie set by a response, if any
pub fn session_cookie<B>(response: &Response<B>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| value.strip_prefix("sessionId="))
        .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
}

/// Raw `Set-Cookie` header for the session cookie
pub fn session_set_cookie_header<B>(response: &Response<B>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with("sessionId="))
        .map(str::to_string)
}

pub fn location<B>(response: &Response<B>) -> Option<String> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = cookie {
        builder = builder.header(header::COOKIE, format!("sessionId={}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn get_with_referer(uri: &str, cookie: Option<&str>, referer: &str) -> Request<Body> {
    let mut request = get(uri, cookie);
    request
        .headers_mut()
        .insert(header::REFERER, referer.parse().unwrap());
    request
}

pub fn post_form(uri: &str, cookie: Option<&str>, form: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(token) = cookie {
        builder = builder.header(header::COOKIE, format!("sessionId={}", token));
    }
    builder.body(Body::from(form.to_string())).unwrap()
}

pub fn json_request(
    method: &str,
    uri: &str,
    cookie: &str,
    body: serde_json::Value,
) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, format!("sessionId={}", cookie))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn read_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Read from an SSE body until one complete event block has arrived
pub async fn next_sse_block<S>(stream: &mut S, buffer: &mut String) -> String
where
    S: futures_util::Stream<Item = Result<bytes::Bytes, axum::Error>> + Unpin,
{
    loop {
        if let Some(end) = buffer.find("\n\n") {
            let block = buffer[..end].to_string();
            buffer.drain(..end + 2);
            // Skip keep-alive comments
            if block.lines().all(|line| line.starts_with(':')) {
                continue;
            }
            return block;
        }

        let chunk = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out waiting for SSE data")
            .expect("SSE stream ended")
            .expect("SSE body error");
        buffer.push_str(std::str::from_utf8(&chunk).unwrap());
    }
}

/// Field value from an SSE block, e.g. `event` or `data`
pub fn sse_field<'a>(block: &'a str, name: &str) -> Option<&'a str> {
    let prefix = format!("{}:", name);
    block
        .lines()
        .find_map(|line| line.strip_prefix(prefix.as_str()))
        .map(str::trim_start)
}

/// Initialize test logging for detailed output
pub fn init_test_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tinytodo_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
