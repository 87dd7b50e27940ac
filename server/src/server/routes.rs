//! HTTP route handlers for login and the to-do API

use super::AppState;
use super::middleware::CurrentSession;
use crate::auth::AccountError;
use crate::protocol::{ChangeEvent, TodoItem};
use crate::session::{Flash, UserRef};
use axum::{
    Extension, Form, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors returned by the JSON API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("To-do item not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        };
        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub sessions: usize,
    pub observers: usize,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (sessions, observers) = state.get_stats();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        sessions,
        observers,
    })
}

/// Response for GET /login
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginPage {
    /// One-time notice carried over from the previous request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub authenticated: bool,
}

/// GET /login - consumes any pending flash message
pub async fn login_page(
    Extension(CurrentSession(session)): Extension<CurrentSession>,
) -> Json<LoginPage> {
    Json(LoginPage {
        message: session.take_flash().map(|f| f.message().to_string()),
        authenticated: session.is_authenticated(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginForm {
    pub user_id: String,
    pub password: String,
}

/// POST /login
///
/// On success the pre-login session is replaced by a fresh one so an id
/// planted before login never becomes authenticated.
pub async fn login(
    State(state): State<AppState>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    Form(form): Form<LoginForm>,
) -> Response {
    info!("Login attempt: {}", form.user_id);

    // Argon2 blocks the thread for tens of milliseconds
    let accounts = state.accounts.clone();
    let user_id = form.user_id.clone();
    let check = move || accounts.authenticate(&user_id, &form.password);
    let user = tokio::task::spawn_blocking(check)
        .await
        .unwrap_or_else(|e| {
            error!("Login check failed to run: {}", e);
            None
        });

    let Some(user) = user else {
        warn!("Login failed: {}", form.user_id);
        session.set_flash(Flash::LoginFailed);
        return Redirect::to("/login").into_response();
    };

    state.sessions.revoke_session(session.id());
    let fresh = state.sessions.start_session();
    fresh.sign_in(user);
    info!("Login succeeded: {}", form.user_id);

    let jar = CookieJar::new().add(state.cookies.session_cookie(&fresh));
    (jar, Redirect::to("/todo")).into_response()
}

/// POST /logout - revoke the session and hand the client a fresh anonymous one
pub async fn logout(
    State(state): State<AppState>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
) -> Response {
    if let Some(user) = session.user() {
        info!("Logout: {}", user.id);
    }
    state.sessions.revoke_session(session.id());
    let fresh = state.sessions.start_session();

    let jar = CookieJar::new().add(state.cookies.session_cookie(&fresh));
    (jar, Redirect::to("/login")).into_response()
}

/// Response for GET /create-user-account
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateAccountPage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// GET /create-user-account - consumes any pending flash message
pub async fn create_account_page(
    Extension(CurrentSession(session)): Extension<CurrentSession>,
) -> Json<CreateAccountPage> {
    Json(CreateAccountPage {
        message: session.take_flash().map(|f| f.message().to_string()),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountForm {
    pub user_id: String,
}

/// POST /create-user-account
///
/// Success carries the generated credentials to `/new-user-account`; a
/// rejected id goes back to the form with the reason.
pub async fn create_account(
    State(state): State<AppState>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    Form(form): Form<CreateAccountForm>,
) -> Response {
    info!("Create account attempt: {}", form.user_id);

    let accounts = state.accounts.clone();
    let user_id = form.user_id.clone();
    let outcome = tokio::task::spawn_blocking(move || accounts.create_account(&user_id))
        .await
        .unwrap_or_else(|e| Err(AccountError::Hashing(e.to_string())));

    let flash = match outcome {
        Ok(account) => {
            info!("Create account succeeded: {}", account.user.id);
            session.set_flash(Flash::AccountCreated(account));
            return Redirect::to("/new-user-account").into_response();
        }
        Err(AccountError::UserIdTaken) => Flash::UserIdTaken,
        Err(AccountError::MalformedUserId) => Flash::UserIdMalformed,
        Err(e @ AccountError::Hashing(_)) => {
            error!("Create account failed: {}: {}", form.user_id, e);
            Flash::AccountCreationFailed
        }
    };

    warn!("Create account rejected: {}: {}", form.user_id, flash.message());
    session.set_flash(flash);
    Redirect::to("/create-user-account").into_response()
}

/// Response for GET /new-user-account
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccountPage {
    pub user_id: String,
    pub password: String,
    pub expires_at: DateTime<Utc>,
}

/// GET /new-user-account - shows the generated password once, then it is gone
pub async fn new_account_page(
    Extension(CurrentSession(session)): Extension<CurrentSession>,
) -> Response {
    let created = session.take_flash_if(|flash| matches!(flash, Flash::AccountCreated(_)));
    let Some(Flash::AccountCreated(account)) = created else {
        return Redirect::to("/login").into_response();
    };

    Json(NewAccountPage {
        user_id: account.user.id,
        password: account.password,
        expires_at: account.expires_at,
    })
    .into_response()
}

/// Request body for creating or editing an item
#[derive(Debug, Deserialize)]
pub struct TodoRequest {
    /// Client-side origin of the change, echoed in the event
    #[serde(default)]
    pub source: String,
    pub todo: String,
}

#[derive(Debug, Deserialize)]
pub struct SourceQuery {
    #[serde(default)]
    pub source: String,
}

/// GET /api/todo
pub async fn list_todos(
    State(state): State<AppState>,
    Extension(user): Extension<UserRef>,
) -> Json<Vec<TodoItem>> {
    Json(state.todos.list(&user.id))
}

/// POST /api/todo
pub async fn add_todo(
    State(state): State<AppState>,
    Extension(user): Extension<UserRef>,
    Json(request): Json<TodoRequest>,
) -> Result<(StatusCode, Json<TodoItem>), ApiError> {
    let item = state
        .todos
        .add(&user.id, &request.todo)
        .ok_or_else(|| ApiError::BadRequest("to-do text is empty".to_string()))?;

    state
        .hub
        .publish(&user.id, ChangeEvent::add(request.source, item.clone()));
    Ok((StatusCode::CREATED, Json(item)))
}

/// PUT /api/todo/:id
pub async fn update_todo(
    State(state): State<AppState>,
    Extension(user): Extension<UserRef>,
    Path(id): Path<String>,
    Json(request): Json<TodoRequest>,
) -> Result<Json<TodoItem>, ApiError> {
    if request.todo.trim().is_empty() {
        return Err(ApiError::BadRequest("to-do text is empty".to_string()));
    }
    let item = state
        .todos
        .update(&user.id, &id, &request.todo)
        .ok_or(ApiError::NotFound(id))?;

    state
        .hub
        .publish(&user.id, ChangeEvent::update(request.source, item.clone()));
    Ok(Json(item))
}

/// DELETE /api/todo/:id
pub async fn delete_todo(
    State(state): State<AppState>,
    Extension(user): Extension<UserRef>,
    Path(id): Path<String>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<TodoItem>, ApiError> {
    let item = state
        .todos
        .delete(&user.id, &id)
        .ok_or(ApiError::NotFound(id))?;

    state
        .hub
        .publish(&user.id, ChangeEvent::delete(query.source, item.clone()));
    Ok(Json(item))
}
