//! HTTP surface: router, shared state and request middleware

pub mod middleware;
pub mod observe;
pub mod routes;
mod state;
pub mod websocket;

pub use middleware::CurrentSession;
pub use state::AppState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

/// Build the application router.
///
/// Pages anyone may open run under [`middleware::attach_session`]. Submitting
/// the sign-up form and reading its result need a live session
/// ([`middleware::require_session`]); the to-do API and both observer
/// endpoints sit behind [`middleware::require_auth`].
pub fn app_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/login", get(routes::login_page).post(routes::login))
        .route("/logout", post(routes::logout))
        .route("/create-user-account", get(routes::create_account_page))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::attach_session,
        ));

    let signup = Router::new()
        .route("/create-user-account", post(routes::create_account))
        .route("/new-user-account", get(routes::new_account_page))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_session,
        ));

    let protected = Router::new()
        .route("/todo", get(routes::list_todos))
        .route("/api/todo", get(routes::list_todos).post(routes::add_todo))
        .route(
            "/api/todo/:id",
            put(routes::update_todo).delete(routes::delete_todo),
        )
        .route("/observe", get(observe::observe_sse))
        .route("/ws/observe", get(websocket::ws_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .route("/health", get(routes::health))
        .merge(public)
        .merge(signup)
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(middleware::handle_panic))
}
