//! Per-connection request protocol.
//!
//! Connected clients send small JSON control messages: heartbeats,
//! subscription toggles for opt-in streams, and privileged commands. This
//! module turns one inbound message into the action the socket handler must
//! take; it owns no I/O so the protocol is testable without sockets.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::message::{action, request_channel, WsChannel, WsRequest, WsResponse};
use crate::registry::{ClientId, ClientRegistry};

/// What the socket handler must do with one inbound client message.
#[derive(Debug)]
pub enum SessionReply {
    /// Send this to the requesting client only.
    ToClient(WsResponse),
    /// Broadcast the notice, then run the named privileged command.
    Command {
        /// Action name, e.g. `reboot`.
        action: String,
        /// Notice to broadcast before executing.
        notice: WsResponse,
    },
    /// Send this to the client, then close the connection.
    Close(WsResponse),
    /// Nothing to send.
    None,
}

/// Stateless dispatcher for the client request protocol.
pub struct SessionHandler {
    registry: Arc<ClientRegistry>,
}

impl SessionHandler {
    /// A handler toggling subscriptions on `registry`.
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    /// Dispatch one raw inbound message from `client`.
    pub fn handle(&self, client: ClientId, raw: &str) -> SessionReply {
        let request: WsRequest = match serde_json::from_str(raw) {
            Ok(request) => request,
            Err(err) => {
                warn!(client, error = %err, "unparsable client message");
                return SessionReply::ToClient(WsResponse::alert("malformed request", "500"));
            }
        };

        match request.channel.as_str() {
            request_channel::PING => self.handle_ping(&request),
            request_channel::CMD => self.handle_cmd(client, &request),
            request_channel::AIS_START => {
                info!(client, "ais push enabled");
                self.registry.subscribe(client, WsChannel::Ais);
                SessionReply::None
            }
            request_channel::AIS_STOP => {
                info!(client, "ais push disabled");
                self.registry.unsubscribe(client, WsChannel::Ais);
                SessionReply::None
            }
            other => {
                warn!(client, channel = %other, "unknown client channel");
                SessionReply::ToClient(WsResponse::alert("unknown channel", "404"))
            }
        }
    }

    /// Heartbeat: the client proves liveness and presents its session
    /// token. Full credential validation lives with the auth collaborator;
    /// here an absent token is enough to drop the connection.
    fn handle_ping(&self, request: &WsRequest) -> SessionReply {
        let token = request
            .payload
            .as_ref()
            .and_then(|payload| payload.get("token"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if token.is_empty() {
            return SessionReply::Close(WsResponse::alert("session expired", "401"));
        }
        SessionReply::ToClient(WsResponse::new(WsChannel::Pong, json!({"message": "ok"})))
    }

    fn handle_cmd(&self, client: ClientId, request: &WsRequest) -> SessionReply {
        match request.action.as_deref() {
            Some(name @ (action::REBOOT | action::RESET)) => {
                info!(client, action = %name, "privileged command requested");
                let notice =
                    WsResponse::alert("terminal restarting", "").with_action(name);
                SessionReply::Command {
                    action: name.to_string(),
                    notice,
                }
            }
            other => {
                warn!(client, action = ?other, "unknown command action");
                SessionReply::ToClient(WsResponse::alert("unknown action", "404"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Outbox = tokio::sync::mpsc::UnboundedReceiver<String>;

    fn handler() -> (SessionHandler, Arc<ClientRegistry>, ClientId, Outbox) {
        let registry = Arc::new(ClientRegistry::new());
        let (id, rx) = registry.register();
        (SessionHandler::new(registry.clone()), registry, id, rx)
    }

    #[test]
    fn ping_with_token_pongs() {
        let (handler, _registry, id, _rx) = handler();
        let reply = handler.handle(id, r#"{"channel":"ping","payload":{"token":"t0k3n"}}"#);
        match reply {
            SessionReply::ToClient(response) => {
                assert_eq!(response.channel, WsChannel::Pong);
                assert_eq!(response.payload["message"], "ok");
            }
            other => panic!("expected pong, got {other:?}"),
        }
    }

    #[test]
    fn ping_without_token_closes_the_connection() {
        let (handler, _registry, id, _rx) = handler();
        let reply = handler.handle(id, r#"{"channel":"ping"}"#);
        match reply {
            SessionReply::Close(response) => assert_eq!(response.error, "401"),
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[test]
    fn ais_start_subscribes_the_client() {
        let (handler, registry, id, _rx) = handler();
        assert!(!registry.is_subscribed(id, WsChannel::Ais));
        let reply = handler.handle(id, r#"{"channel":"ais_start"}"#);
        assert!(matches!(reply, SessionReply::None));
        assert!(registry.is_subscribed(id, WsChannel::Ais));
    }

    #[test]
    fn ais_stop_unsubscribes_the_client() {
        let (handler, registry, id, _rx) = handler();
        handler.handle(id, r#"{"channel":"ais_start"}"#);
        handler.handle(id, r#"{"channel":"ais_stop"}"#);
        assert!(!registry.is_subscribed(id, WsChannel::Ais));
    }

    #[test]
    fn reboot_command_broadcasts_a_notice() {
        let (handler, _registry, id, _rx) = handler();
        let reply = handler.handle(id, r#"{"channel":"cmd","action":"reboot"}"#);
        match reply {
            SessionReply::Command { action, notice } => {
                assert_eq!(action, "reboot");
                assert_eq!(notice.action.as_deref(), Some("reboot"));
                assert_eq!(notice.channel, WsChannel::Alert);
            }
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn unknown_command_action_is_rejected() {
        let (handler, _registry, id, _rx) = handler();
        let reply = handler.handle(id, r#"{"channel":"cmd","action":"selfdestruct"}"#);
        match reply {
            SessionReply::ToClient(response) => assert_eq!(response.error, "404"),
            other => panic!("expected alert, got {other:?}"),
        }
    }

    #[test]
    fn unknown_channel_gets_a_404_alert() {
        let (handler, _registry, id, _rx) = handler();
        let reply = handler.handle(id, r#"{"channel":"nonsense"}"#);
        match reply {
            SessionReply::ToClient(response) => assert_eq!(response.error, "404"),
            other => panic!("expected alert, got {other:?}"),
        }
    }

    #[test]
    fn malformed_json_gets_a_500_alert() {
        let (handler, _registry, id, _rx) = handler();
        let reply = handler.handle(id, "{not json");
        match reply {
            SessionReply::ToClient(response) => assert_eq!(response.error, "500"),
            other => panic!("expected alert, got {other:?}"),
        }
    }
}
