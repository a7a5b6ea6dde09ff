/// WebSocket relay for live sessions
///
/// Each connection becomes one session in the hub. Outbound traffic always
/// goes through the session's hub queue, so `changed` events and replies to
/// this session's own requests arrive in the order they were produced.
/// Inbound messages are handled one at a time: a session's intents reach the
/// engine in the order it sent them.

use crate::api::workflows::AppState;
use crate::session::{ClientMessage, ServerMessage};
use crate::sync::ChangeIntent;
use crate::workflow::is_valid_workflow_id;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};

pub fn create_relay_routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let session = state.hub.connect().await;
    let session_id = session.id.clone();
    let mut outbound = session.receiver;

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("❌ Failed to encode session message: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    state
        .hub
        .notify(
            &session_id,
            ServerMessage::Connected {
                session_id: session_id.clone(),
            },
        )
        .await;

    while let Some(received) = stream.next().await {
        match received {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(message) => {
                    if let Some(reply) = handle_client_message(&state, &session_id, message).await {
                        state.hub.notify(&session_id, reply).await;
                    }
                }
                Err(e) => {
                    tracing::warn!("⚠️ Session {} sent an unreadable message: {}", session_id, e);
                    let reply = ServerMessage::Error {
                        message: format!("invalid message: {}", e),
                    };
                    state.hub.notify(&session_id, reply).await;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("🔌 Session {} transport error: {}", session_id, e);
                break;
            }
        }
    }

    state.hub.disconnect(&session_id).await;
    writer.abort();
}

/// React to one message from a session; the return value is the direct reply
pub async fn handle_client_message(
    state: &AppState,
    session_id: &str,
    message: ClientMessage,
) -> Option<ServerMessage> {
    if let Some(workflow_id) = message.workflow_id() {
        if !is_valid_workflow_id(workflow_id) {
            tracing::warn!("⚠️ Session {} used invalid workflow id {:?}", session_id, workflow_id);
            return Some(ServerMessage::Error {
                message: format!("invalid workflow id {:?}", workflow_id),
            });
        }
    }

    match message {
        ClientMessage::Subscribe { workflow_id } => {
            state.hub.subscribe(session_id, &workflow_id).await;
            Some(ServerMessage::Subscribed { workflow_id })
        }

        ClientMessage::Unsubscribe { workflow_id } => {
            state.hub.unsubscribe(session_id, &workflow_id).await;
            Some(ServerMessage::Unsubscribed { workflow_id })
        }

        ClientMessage::ChangeIntent {
            workflow_id,
            workflow,
            auto_sync,
        } => {
            let intent = ChangeIntent::from_session(workflow_id.clone(), session_id, workflow, auto_sync);
            match state.engine.propagate(intent).await {
                Ok(_) if auto_sync => Some(ServerMessage::sync_ok(workflow_id)),
                Ok(_) => None,
                Err(e) if e.is_divergence() => Some(ServerMessage::sync_failed(workflow_id, e)),
                Err(e) => Some(ServerMessage::Error { message: e.to_string() }),
            }
        }

        ClientMessage::SyncRequest { workflow_id } => match state.engine.push(&workflow_id).await {
            Ok(_) => Some(ServerMessage::sync_ok(workflow_id)),
            Err(e) => Some(ServerMessage::sync_failed(workflow_id, e)),
        },

        ClientMessage::Ping { timestamp } => Some(ServerMessage::Pong { timestamp }),
    }
}
