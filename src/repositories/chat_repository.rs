use derive_new::new;

use crate::db::{internal, DbPool};
use crate::errors::problem::Problem;
use crate::models::{ChatRoom, ChatRoomWithActivity, Message};

#[derive(new, Debug, Clone)]
pub struct ChatRepository {
    pool: DbPool,
}

impl ChatRepository {
    pub async fn find_room_by_id(&self, chat_room_id: i64) -> Result<Option<ChatRoom>, Problem> {
        sqlx::query_as::<_, ChatRoom>("SELECT * FROM chat_rooms WHERE id = ?")
            .bind(chat_room_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(internal)
    }

    /// Room per accepted pairing, lazily created on first send. The UNIQUE
    /// (trainee_id, coach_id) constraint makes concurrent first sends
    /// converge on one row.
    pub async fn find_or_create_room(
        &self,
        room_id: i64,
        trainee_id: i64,
        coach_id: i64,
        created_at: chrono::NaiveDateTime,
    ) -> Result<ChatRoom, Problem> {
        sqlx::query(
            r#"
            INSERT INTO chat_rooms (id, created_at, trainee_id, coach_id)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (trainee_id, coach_id) DO NOTHING
            "#,
        )
        .bind(room_id)
        .bind(created_at)
        .bind(trainee_id)
        .bind(coach_id)
        .execute(&self.pool.writer)
        .await
        .map_err(internal)?;

        sqlx::query_as::<_, ChatRoom>(
            "SELECT * FROM chat_rooms WHERE trainee_id = ? AND coach_id = ?",
        )
        .bind(trainee_id)
        .bind(coach_id)
        .fetch_one(&self.pool.writer)
        .await
        .map_err(internal)
    }

    pub async fn find_rooms_for_participant(
        &self,
        participant_id: i64,
    ) -> Result<Vec<ChatRoomWithActivity>, Problem> {
        sqlx::query_as::<_, ChatRoomWithActivity>(
            r#"
            SELECT cr.id, cr.created_at, cr.trainee_id, cr.coach_id,
                   (SELECT MAX(m.created_at) FROM messages m WHERE m.chat_room_id = cr.id) AS last_message_at
            FROM chat_rooms cr
            WHERE cr.trainee_id = ? OR cr.coach_id = ?
            ORDER BY last_message_at DESC
            "#,
        )
        .bind(participant_id)
        .bind(participant_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(internal)
    }

    pub async fn save_message(&self, message: Message) -> Result<Message, Problem> {
        sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (id, created_at, chat_room_id, sender_id, text, attachment, correlation_id, is_read)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(message.id)
        .bind(message.created_at)
        .bind(message.chat_room_id)
        .bind(message.sender_id)
        .bind(&message.text)
        .bind(&message.attachment)
        .bind(&message.correlation_id)
        .bind(message.is_read)
        .fetch_one(&self.pool.writer)
        .await
        .map_err(internal)
    }

    /// One page of a room's log, ascending by the (created_at, id) ordering
    /// key, with the total for the pagination envelope.
    pub async fn find_page_by_room(
        &self,
        chat_room_id: i64,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<Message>, i64), Problem> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE chat_room_id = ?
            ORDER BY created_at ASC, id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(chat_room_id)
        .bind(limit)
        .bind((page - 1) * limit)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(internal)?;

        let total =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages WHERE chat_room_id = ?")
                .bind(chat_room_id)
                .fetch_one(&self.pool.reader)
                .await
                .map_err(internal)?;

        Ok((messages, total))
    }

    /// Flip the read flag on everything in the room addressed to the reader.
    /// Safe to call any number of times.
    pub async fn mark_read(&self, chat_room_id: i64, reader_id: i64) -> Result<u64, Problem> {
        let result = sqlx::query(
            "UPDATE messages SET is_read = 1 WHERE chat_room_id = ? AND sender_id != ? AND is_read = 0",
        )
        .bind(chat_room_id)
        .bind(reader_id)
        .execute(&self.pool.writer)
        .await
        .map_err(internal)?;

        Ok(result.rows_affected())
    }
}
