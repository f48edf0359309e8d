use std::fmt::{Display, Formatter};
use std::str::FromStr;

use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Coach,
    Trainee,
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Coach => write!(f, "COACH"),
            Role::Trainee => write!(f, "TRAINEE"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "COACH" => Ok(Role::Coach),
            "TRAINEE" => Ok(Role::Trainee),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(FromRow, Debug, Clone)]
pub struct Participant {
    pub id: i64,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
    pub sub: String,
    pub role: String,
    pub display_name: Option<String>,
}

impl Participant {
    pub fn role(&self) -> Option<Role> {
        self.role.parse().ok()
    }

    pub fn name(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| format!("Participant {}", self.id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipStatus {
    Pending,
    Accepted,
    Rejected,
    Ended,
}

impl Display for RelationshipStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RelationshipStatus::Pending => write!(f, "PENDING"),
            RelationshipStatus::Accepted => write!(f, "ACCEPTED"),
            RelationshipStatus::Rejected => write!(f, "REJECTED"),
            RelationshipStatus::Ended => write!(f, "ENDED"),
        }
    }
}

impl FromStr for RelationshipStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PENDING" => Ok(RelationshipStatus::Pending),
            "ACCEPTED" => Ok(RelationshipStatus::Accepted),
            "REJECTED" => Ok(RelationshipStatus::Rejected),
            "ENDED" => Ok(RelationshipStatus::Ended),
            other => Err(format!("unknown relationship status: {other}")),
        }
    }
}

#[derive(FromRow, Debug, Clone)]
pub struct Relationship {
    pub id: i64,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
    pub trainee_id: i64,
    pub coach_id: i64,
    pub status: String,
    pub accepted_at: Option<chrono::NaiveDateTime>,
}

impl Relationship {
    pub fn status(&self) -> Option<RelationshipStatus> {
        self.status.parse().ok()
    }

    pub fn is_party(&self, participant_id: i64) -> bool {
        self.trainee_id == participant_id || self.coach_id == participant_id
    }

    pub fn counterpart_of(&self, participant_id: i64) -> i64 {
        if self.trainee_id == participant_id {
            self.coach_id
        } else {
            self.trainee_id
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelationshipWithParticipants {
    pub relationship: Relationship,
    pub trainee: Participant,
    pub coach: Participant,
}

#[derive(FromRow, Debug, Clone)]
pub struct ChatRoom {
    pub id: i64,
    pub created_at: chrono::NaiveDateTime,
    pub trainee_id: i64,
    pub coach_id: i64,
}

impl ChatRoom {
    pub fn is_member(&self, participant_id: i64) -> bool {
        self.trainee_id == participant_id || self.coach_id == participant_id
    }

    pub fn counterpart_of(&self, participant_id: i64) -> i64 {
        if self.trainee_id == participant_id {
            self.coach_id
        } else {
            self.trainee_id
        }
    }
}

#[derive(FromRow, Debug, Clone)]
pub struct ChatRoomWithActivity {
    pub id: i64,
    pub created_at: chrono::NaiveDateTime,
    pub trainee_id: i64,
    pub coach_id: i64,
    pub last_message_at: Option<chrono::NaiveDateTime>,
}

#[derive(FromRow, Debug, Clone, PartialEq)]
pub struct Message {
    pub id: i64,
    pub created_at: chrono::NaiveDateTime,
    pub chat_room_id: i64,
    pub sender_id: i64,
    pub text: Option<String>,
    pub attachment: Option<String>,
    pub correlation_id: Option<String>,
    pub is_read: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    RelationshipChanged,
    NewMessage,
    NewComment,
    NewPlan,
}

impl Display for NotificationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::RelationshipChanged => write!(f, "RELATIONSHIP_CHANGED"),
            NotificationKind::NewMessage => write!(f, "NEW_MESSAGE"),
            NotificationKind::NewComment => write!(f, "NEW_COMMENT"),
            NotificationKind::NewPlan => write!(f, "NEW_PLAN"),
        }
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "RELATIONSHIP_CHANGED" => Ok(NotificationKind::RelationshipChanged),
            "NEW_MESSAGE" => Ok(NotificationKind::NewMessage),
            "NEW_COMMENT" => Ok(NotificationKind::NewComment),
            "NEW_PLAN" => Ok(NotificationKind::NewPlan),
            other => Err(format!("unknown notification kind: {other}")),
        }
    }
}

#[derive(FromRow, Debug, Clone)]
pub struct Notification {
    pub id: i64,
    pub created_at: chrono::NaiveDateTime,
    pub user_id: i64,
    pub kind: String,
    pub message: String,
    pub is_read: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            RelationshipStatus::Pending,
            RelationshipStatus::Accepted,
            RelationshipStatus::Rejected,
            RelationshipStatus::Ended,
        ] {
            assert_eq!(status.to_string().parse::<RelationshipStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_room_counterpart() {
        let room = ChatRoom {
            id: 1,
            created_at: chrono::Utc::now().naive_utc(),
            trainee_id: 10,
            coach_id: 20,
        };
        assert_eq!(room.counterpart_of(10), 20);
        assert_eq!(room.counterpart_of(20), 10);
        assert!(room.is_member(10));
        assert!(!room.is_member(30));
    }
}
