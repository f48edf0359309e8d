use serde::{Deserialize, Serialize};

use crate::models::{
    ChatRoomWithActivity, Message, Notification, Participant, Relationship,
    RelationshipWithParticipants,
};

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResponseDto {
    pub id: String,
    pub created_at: chrono::NaiveDateTime,
    pub role: String,
    pub name: Option<String>,
}

impl From<Participant> for ParticipantResponseDto {
    fn from(participant: Participant) -> Self {
        ParticipantResponseDto {
            id: participant.id.to_string(),
            created_at: participant.created_at,
            role: participant.role,
            name: participant.display_name,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipRequestDto {
    pub coach_id: String,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipResponseDto {
    pub id: String,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
    pub trainee: ParticipantResponseDto,
    pub coach: ParticipantResponseDto,
    pub status: String,
    pub accepted_at: Option<chrono::NaiveDateTime>,
}

impl From<RelationshipWithParticipants> for RelationshipResponseDto {
    fn from(relationship: RelationshipWithParticipants) -> Self {
        RelationshipResponseDto {
            id: relationship.relationship.id.to_string(),
            created_at: relationship.relationship.created_at,
            updated_at: relationship.relationship.updated_at,
            trainee: ParticipantResponseDto::from(relationship.trainee),
            coach: ParticipantResponseDto::from(relationship.coach),
            status: relationship.relationship.status,
            accepted_at: relationship.relationship.accepted_at,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipSummaryDto {
    pub id: String,
    pub created_at: chrono::NaiveDateTime,
    pub trainee_id: String,
    pub coach_id: String,
    pub status: String,
    pub accepted_at: Option<chrono::NaiveDateTime>,
}

impl From<Relationship> for RelationshipSummaryDto {
    fn from(relationship: Relationship) -> Self {
        RelationshipSummaryDto {
            id: relationship.id.to_string(),
            created_at: relationship.created_at,
            trainee_id: relationship.trainee_id.to_string(),
            coach_id: relationship.coach_id.to_string(),
            status: relationship.status,
            accepted_at: relationship.accepted_at,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequestDto {
    pub chat_room_id: Option<String>,
    pub recipient_id: Option<String>,
    pub text: Option<String>,
    pub attachment: Option<String>,
    pub correlation_id: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponseDto {
    pub id: String,
    pub created_at: chrono::NaiveDateTime,
    pub chat_room_id: String,
    pub sender_id: String,
    pub text: Option<String>,
    pub attachment: Option<String>,
    pub correlation_id: Option<String>,
    pub is_read: bool,
}

impl From<Message> for MessageResponseDto {
    fn from(message: Message) -> Self {
        MessageResponseDto {
            id: message.id.to_string(),
            created_at: message.created_at,
            chat_room_id: message.chat_room_id.to_string(),
            sender_id: message.sender_id.to_string(),
            text: message.text,
            attachment: message.attachment,
            correlation_id: message.correlation_id,
            is_read: message.is_read,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoomResponseDto {
    pub id: String,
    pub created_at: chrono::NaiveDateTime,
    pub trainee_id: String,
    pub coach_id: String,
    pub last_message_at: Option<chrono::NaiveDateTime>,
}

impl From<ChatRoomWithActivity> for ChatRoomResponseDto {
    fn from(room: ChatRoomWithActivity) -> Self {
        ChatRoomResponseDto {
            id: room.id.to_string(),
            created_at: room.created_at,
            trainee_id: room.trainee_id.to_string(),
            coach_id: room.coach_id.to_string(),
            last_message_at: room.last_message_at,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponseDto {
    pub id: String,
    pub created_at: chrono::NaiveDateTime,
    pub kind: String,
    pub message: String,
    pub is_read: bool,
}

impl From<Notification> for NotificationResponseDto {
    fn from(notification: Notification) -> Self {
        NotificationResponseDto {
            id: notification.id.to_string(),
            created_at: notification.created_at,
            kind: notification.kind,
            message: notification.message,
            is_read: notification.is_read,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub struct PageQueryDto {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub is_read: Option<bool>,
}

#[derive(Serialize, Debug, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub struct PaginationDto {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl PaginationDto {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        PaginationDto {
            page,
            limit,
            total,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MessagePageResponseDto {
    pub messages: Vec<MessageResponseDto>,
    pub pagination: PaginationDto,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPageResponseDto {
    pub notifications: Vec<NotificationResponseDto>,
    pub unread_count: i64,
    pub pagination: PaginationDto,
}

#[derive(Serialize, Debug, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedCountResponseDto {
    pub updated: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_rounds_up() {
        let pagination = PaginationDto::new(1, 20, 41);
        assert_eq!(pagination.total_pages, 3);

        let pagination = PaginationDto::new(2, 20, 40);
        assert_eq!(pagination.total_pages, 2);

        let pagination = PaginationDto::new(1, 20, 0);
        assert_eq!(pagination.total_pages, 0);
    }
}
