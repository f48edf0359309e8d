use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::problem::Problem;
use crate::gateway::events::{ClientEvent, ServerEvent};
use crate::gateway::OUTBOUND_BUFFER;
use crate::middleware::authorization::decode_token;
use crate::models::Participant;
use crate::AppState;

#[derive(Deserialize, Debug)]
pub struct ConnectQuery {
    token: Option<String>,
}

/// Authenticates the connection with the same credential as the request
/// surface, before the upgrade: a socket that cannot present a valid token
/// never reaches a room join.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, Problem> {
    let token = query
        .token
        .ok_or(Problem::Unauthorized("Missing token".to_string()))?;
    let claims = decode_token(&token, &state.token_secret)?;
    let participant = state
        .participant_repository
        .find_by_sub(&claims.sub)
        .await?
        .ok_or(Problem::Unauthorized("Unknown participant".to_string()))?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, participant)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, participant: Participant) {
    let (mut sink, mut stream) = socket.split();
    let session_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(OUTBOUND_BUFFER);
    state.registry.register(session_id, participant.id, tx);

    // Writer task drains the session's outbound queue; the inbound loop
    // below runs each event to completion between awaits.
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        let WsMessage::Text(text) = message else {
            continue;
        };
        let event = match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!("session {session_id}: unparseable event: {err}");
                continue;
            }
        };
        handle_client_event(&state, session_id, &participant, event).await;
    }

    // Abrupt or clean, a disconnect discards presence state immediately;
    // rooms are re-joined by the client on reconnect.
    for chat_room_id in state.registry.unregister(&session_id) {
        state
            .registry
            .broadcast_to_room(
                chat_room_id,
                None,
                ServerEvent::UserStoppedTyping {
                    chat_room_id: chat_room_id.to_string(),
                    participant_id: participant.id.to_string(),
                },
            )
            .await;
    }
    send_task.abort();
    tracing::info!("session {session_id} disconnected");
}

/// Transient events have no error channel: anything malformed or
/// unauthorized is logged and dropped.
async fn handle_client_event(
    state: &AppState,
    session_id: Uuid,
    participant: &Participant,
    event: ClientEvent,
) {
    match event {
        ClientEvent::JoinChat { chat_room_id } => {
            let Some(chat_room_id) = parse_room_id(&chat_room_id, session_id) else {
                return;
            };
            match state.chat_repository.find_room_by_id(chat_room_id).await {
                Ok(Some(room)) if room.is_member(participant.id) => {
                    state.registry.join_room(session_id, chat_room_id);
                }
                Ok(_) => {
                    tracing::warn!(
                        "session {session_id}: join refused for room {chat_room_id}"
                    );
                }
                Err(err) => {
                    tracing::error!("session {session_id}: join failed: {err}");
                }
            }
        }
        ClientEvent::LeaveChat { chat_room_id } => {
            let Some(chat_room_id) = parse_room_id(&chat_room_id, session_id) else {
                return;
            };
            let was_typing = state.registry.leave_room(&session_id, chat_room_id);
            if was_typing {
                broadcast_stopped_typing(state, session_id, participant.id, chat_room_id).await;
            }
        }
        ClientEvent::TypingStart { chat_room_id } => {
            let Some(chat_room_id) = parse_room_id(&chat_room_id, session_id) else {
                return;
            };
            if !state.registry.is_member(&session_id, chat_room_id) {
                return;
            }
            if state.registry.typing_start(session_id, chat_room_id) {
                state
                    .registry
                    .broadcast_to_room(
                        chat_room_id,
                        Some(&session_id),
                        ServerEvent::UserTyping {
                            chat_room_id: chat_room_id.to_string(),
                            participant_id: participant.id.to_string(),
                        },
                    )
                    .await;
            }
        }
        ClientEvent::TypingStop { chat_room_id } => {
            let Some(chat_room_id) = parse_room_id(&chat_room_id, session_id) else {
                return;
            };
            if state.registry.typing_stop(&session_id, chat_room_id) {
                broadcast_stopped_typing(state, session_id, participant.id, chat_room_id).await;
            }
        }
    }
}

async fn broadcast_stopped_typing(
    state: &AppState,
    session_id: Uuid,
    participant_id: i64,
    chat_room_id: i64,
) {
    state
        .registry
        .broadcast_to_room(
            chat_room_id,
            Some(&session_id),
            ServerEvent::UserStoppedTyping {
                chat_room_id: chat_room_id.to_string(),
                participant_id: participant_id.to_string(),
            },
        )
        .await;
}

fn parse_room_id(raw: &str, session_id: Uuid) -> Option<i64> {
    match raw.parse::<i64>() {
        Ok(chat_room_id) => Some(chat_room_id),
        Err(_) => {
            tracing::warn!("session {session_id}: invalid chat room id: {raw}");
            None
        }
    }
}
