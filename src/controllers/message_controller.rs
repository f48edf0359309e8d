use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;

use crate::dtos::{
    ChatRoomResponseDto, MessagePageResponseDto, MessageRequestDto, MessageResponseDto,
    PageQueryDto, PaginationDto, UpdatedCountResponseDto,
};
use crate::errors::problem::Problem;
use crate::gateway::events::ServerEvent;
use crate::middleware::authorization::AuthParticipant;
use crate::models::{ChatRoom, Message, NotificationKind};
use crate::AppState;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 100;

pub async fn create_message(
    State(state): State<Arc<AppState>>,
    Extension(AuthParticipant(auth_participant)): Extension<AuthParticipant>,
    Json(body): Json<MessageRequestDto>,
) -> Result<(StatusCode, Json<MessageResponseDto>), Problem> {
    let has_text = body
        .text
        .as_deref()
        .is_some_and(|text| !text.trim().is_empty());
    if !has_text && body.attachment.is_none() {
        return Err(Problem::BadRequest(
            "Message requires text or an attachment".to_string(),
        ));
    }

    let room = resolve_room(&state, auth_participant.id, &body).await?;

    let message = state
        .chat_repository
        .save_message(Message {
            id: state.next_id(),
            created_at: Utc::now().naive_utc(),
            chat_room_id: room.id,
            sender_id: auth_participant.id,
            text: body.text.clone(),
            attachment: body.attachment.clone(),
            correlation_id: body.correlation_id.clone(),
            is_read: false,
        })
        .await?;

    let message_response = MessageResponseDto::from(message);

    // Fan out to whoever has the room open (the sender's own sessions
    // included; clients reconcile via the echoed correlation id), nudge the
    // recipient's room list, and store a notification they can fetch later.
    let recipient_id = room.counterpart_of(auth_participant.id);
    state
        .registry
        .broadcast_to_room(
            room.id,
            None,
            ServerEvent::NewMessage {
                message: message_response.clone(),
            },
        )
        .await;
    state
        .registry
        .send_to_participant(recipient_id, ServerEvent::ChatUpdated)
        .await;
    state
        .dispatcher
        .notify(
            recipient_id,
            NotificationKind::NewMessage,
            format!("New message from {}", auth_participant.name()),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(message_response)))
}

/// A message addresses either an existing room or a recipient; both paths
/// require a live accepted relationship between the two parties.
async fn resolve_room(
    state: &AppState,
    sender_id: i64,
    body: &MessageRequestDto,
) -> Result<ChatRoom, Problem> {
    match (&body.chat_room_id, &body.recipient_id) {
        (Some(chat_room_id), _) => {
            let chat_room_id: i64 = chat_room_id
                .parse()
                .map_err(|_| Problem::BadRequest("Invalid chatRoomId".to_string()))?;

            let room = state
                .chat_repository
                .find_room_by_id(chat_room_id)
                .await?
                .filter(|room| room.is_member(sender_id))
                .ok_or(Problem::NotFound("Chat room not found".to_string()))?;

            state
                .relationship_repository
                .find_accepted_between(sender_id, room.counterpart_of(sender_id))
                .await?
                .ok_or(Problem::Forbidden(
                    "No accepted relationship for this chat".to_string(),
                ))?;

            Ok(room)
        }
        (None, Some(recipient_id)) => {
            let recipient_id: i64 = recipient_id
                .parse()
                .map_err(|_| Problem::BadRequest("Invalid recipientId".to_string()))?;

            let relationship = state
                .relationship_repository
                .find_accepted_between(sender_id, recipient_id)
                .await?
                .ok_or(Problem::Forbidden(
                    "No accepted relationship with recipient".to_string(),
                ))?;

            state
                .chat_repository
                .find_or_create_room(
                    state.next_id(),
                    relationship.trainee_id,
                    relationship.coach_id,
                    Utc::now().naive_utc(),
                )
                .await
        }
        (None, None) => Err(Problem::BadRequest(
            "chatRoomId or recipientId is required".to_string(),
        )),
    }
}

pub async fn get_chats(
    State(state): State<Arc<AppState>>,
    Extension(AuthParticipant(auth_participant)): Extension<AuthParticipant>,
) -> Result<Json<Vec<ChatRoomResponseDto>>, Problem> {
    let rooms = state
        .chat_repository
        .find_rooms_for_participant(auth_participant.id)
        .await?;

    Ok(Json(rooms.into_iter().map(ChatRoomResponseDto::from).collect()))
}

pub async fn get_chat_messages(
    State(state): State<Arc<AppState>>,
    Extension(AuthParticipant(auth_participant)): Extension<AuthParticipant>,
    Path(chat_room_id): Path<String>,
    Query(query): Query<PageQueryDto>,
) -> Result<Json<MessagePageResponseDto>, Problem> {
    let room = member_room(&state, &chat_room_id, auth_participant.id).await?;

    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let (messages, total) = state
        .chat_repository
        .find_page_by_room(room.id, page, limit)
        .await?;

    Ok(Json(MessagePageResponseDto {
        messages: messages.into_iter().map(MessageResponseDto::from).collect(),
        pagination: PaginationDto::new(page, limit, total),
    }))
}

pub async fn mark_chat_read(
    State(state): State<Arc<AppState>>,
    Extension(AuthParticipant(auth_participant)): Extension<AuthParticipant>,
    Path(chat_room_id): Path<String>,
) -> Result<Json<UpdatedCountResponseDto>, Problem> {
    let room = member_room(&state, &chat_room_id, auth_participant.id).await?;

    let updated = state
        .chat_repository
        .mark_read(room.id, auth_participant.id)
        .await?;

    Ok(Json(UpdatedCountResponseDto { updated }))
}

async fn member_room(
    state: &AppState,
    raw_room_id: &str,
    participant_id: i64,
) -> Result<ChatRoom, Problem> {
    let chat_room_id: i64 = raw_room_id
        .parse()
        .map_err(|_| Problem::BadRequest("Invalid chat room id".to_string()))?;

    state
        .chat_repository
        .find_room_by_id(chat_room_id)
        .await?
        .filter(|room| room.is_member(participant_id))
        .ok_or(Problem::NotFound("Chat room not found".to_string()))
}
