//! WebSocket stream of to-do changes

use super::AppState;
use crate::notify::Subscription;
use crate::protocol::ChangeEvent;
use crate::session::UserRef;
use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// GET /ws/observe
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(user): Extension<UserRef>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

/// Stream change events to one socket until either side goes away.
///
/// The subscription is owned by this function; returning or being cancelled
/// drops it, which deregisters the observer.
async fn handle_socket(socket: WebSocket, state: AppState, user: UserRef) {
    let source = Uuid::new_v4().to_string();
    let mut subscription = state.hub.subscribe(&user.id);
    info!(
        "WebSocket observer opened: user={} source={} observer={}",
        user.id,
        source,
        subscription.id()
    );

    let (mut ws_sender, mut ws_receiver) = socket.split();

    if send_event(&mut ws_sender, &ChangeEvent::initial(source.clone()))
        .await
        .is_ok()
    {
        pump(&mut subscription, &mut ws_sender, &mut ws_receiver).await;
    }

    info!(
        "WebSocket observer closed: user={} source={}",
        user.id, source
    );
}

async fn pump(
    subscription: &mut Subscription,
    ws_sender: &mut SplitSink<WebSocket, Message>,
    ws_receiver: &mut SplitStream<WebSocket>,
) {
    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                if send_event(ws_sender, &event).await.is_err() {
                    break;
                }
            }
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => {
                    debug!("Client closed observer socket");
                    break;
                }
                Some(Ok(_)) => {
                    // Observers are push-only; pings are answered by axum
                }
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    break;
                }
            },
        }
    }
}

/// Send `{"event": <kind>, "data": <payload>}`
async fn send_event(
    ws_sender: &mut SplitSink<WebSocket, Message>,
    event: &ChangeEvent,
) -> Result<(), axum::Error> {
    match serde_json::to_string(&event.envelope()) {
        Ok(json) => ws_sender.send(Message::Text(json)).await,
        Err(e) => {
            // Not a transport failure; skip the event and keep the socket
            error!("Failed to serialize message: {}", e);
            Ok(())
        }
    }
}
