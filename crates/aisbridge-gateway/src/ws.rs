//! WebSocket endpoint: one registry entry per connection, an outbox pump
//! toward the socket, and the session protocol over inbound messages.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use aisbridge_relay::{SessionReply, WsChannel};

use crate::state::AppState;

/// Upgrade handler for `/ws`.
pub async fn ws_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut inbound) = socket.split();
    let (client, mut outbox) = state.registry.register();
    info!(client, "websocket client connected");

    // Everything addressed to this client funnels through its outbox; the
    // pump is the only writer on the socket.
    let mut pump = tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            if sink.send(Message::Text(message)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(message) = inbound.next().await {
        let raw = match message {
            Ok(Message::Text(raw)) => raw,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        match state.session.handle(client, &raw) {
            SessionReply::ToClient(response) => {
                send_to(&state, client, &response);
            }
            SessionReply::Command { action, notice } => {
                if let Ok(wire) = serde_json::to_string(&notice) {
                    state.registry.broadcast(WsChannel::Alert, true, &wire);
                }
                // The actual reboot/reset hook belongs to the host system.
                info!(client, action = %action, "privileged command acknowledged");
            }
            SessionReply::Close(response) => {
                send_to(&state, client, &response);
                break;
            }
            SessionReply::None => {}
        }
    }

    // Dropping the registry entry closes the outbox; the pump drains what
    // is already queued (a parting alert included) before exiting.
    state.registry.deregister(client);
    if tokio::time::timeout(Duration::from_secs(5), &mut pump).await.is_err() {
        pump.abort();
    }
    debug!(client, "websocket client disconnected");
}

fn send_to(state: &AppState, client: u64, response: &aisbridge_relay::WsResponse) {
    match serde_json::to_string(response) {
        Ok(wire) => {
            state.registry.send_to(client, &wire);
        }
        Err(err) => warn!(client, error = %err, "unserializable session reply"),
    }
}
