//! Server-sent event stream of to-do changes

use super::AppState;
use crate::protocol::ChangeEvent;
use crate::session::UserRef;
use crate::session::state::now_millis;
use axum::{
    Extension,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::{Stream, StreamExt, stream};
use std::convert::Infallible;
use tracing::{error, info};
use uuid::Uuid;

/// GET /observe
///
/// Emits `initial` with a fresh source id, then every change published for the
/// user. The observer is registered before the first byte goes out and is
/// released when axum drops the stream, which covers client disconnects and
/// server shutdown alike.
pub async fn observe_sse(
    State(state): State<AppState>,
    Extension(user): Extension<UserRef>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let source = Uuid::new_v4().to_string();
    let subscription = state.hub.subscribe(&user.id);
    info!(
        "SSE observer opened: user={} source={} observer={}",
        user.id,
        source,
        subscription.id()
    );

    let events = stream::once(async move { ChangeEvent::initial(source) })
        .chain(subscription)
        .map(|event| Ok(sse_event(&event)));

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// `id: ttd-<millis>`, `event: <kind>`, `data: <payload json>`
pub fn sse_event(event: &ChangeEvent) -> Event {
    let base = Event::default()
        .id(format!("ttd-{}", now_millis()))
        .event(event.kind.as_str());

    match base.json_data(event.payload()) {
        Ok(sse) => sse,
        Err(e) => {
            error!("Failed to serialize change event: {}", e);
            Event::default().comment("serialization error")
        }
    }
}
