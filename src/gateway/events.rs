use serde::{Deserialize, Serialize};

use crate::dtos::{MessageResponseDto, NotificationResponseDto};

/// Events a connected client may send over its socket.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinChat { chat_room_id: String },
    #[serde(rename_all = "camelCase")]
    LeaveChat { chat_room_id: String },
    #[serde(rename_all = "camelCase")]
    TypingStart { chat_room_id: String },
    #[serde(rename_all = "camelCase")]
    TypingStop { chat_room_id: String },
}

/// Events pushed to connected clients. Durable events (messages,
/// notifications) are persisted before they are pushed; typing events are
/// transient and best-effort.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    NewMessage {
        message: MessageResponseDto,
    },
    #[serde(rename_all = "camelCase")]
    UserTyping {
        chat_room_id: String,
        participant_id: String,
    },
    #[serde(rename_all = "camelCase")]
    UserStoppedTyping {
        chat_room_id: String,
        participant_id: String,
    },
    ChatUpdated,
    Notification {
        notification: NotificationResponseDto,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_wire_format() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"join_chat","chatRoomId":"42"}"#).unwrap();
        assert!(matches!(event, ClientEvent::JoinChat { chat_room_id } if chat_room_id == "42"));

        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"typing_start","chatRoomId":"42"}"#).unwrap();
        assert!(matches!(event, ClientEvent::TypingStart { .. }));
    }

    #[test]
    fn test_server_event_wire_format() {
        let event = ServerEvent::UserTyping {
            chat_room_id: "42".to_string(),
            participant_id: "7".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user_typing");
        assert_eq!(json["chatRoomId"], "42");
        assert_eq!(json["participantId"], "7");

        let json = serde_json::to_value(&ServerEvent::ChatUpdated).unwrap();
        assert_eq!(json["type"], "chat_updated");
    }
}
