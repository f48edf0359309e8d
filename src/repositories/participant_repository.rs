use derive_new::new;

use crate::db::{internal, DbPool};
use crate::errors::problem::Problem;
use crate::models::Participant;

#[derive(new, Debug, Clone)]
pub struct ParticipantRepository {
    pool: DbPool,
}

impl ParticipantRepository {
    pub async fn find_by_id(&self, participant_id: i64) -> Result<Option<Participant>, Problem> {
        sqlx::query_as::<_, Participant>("SELECT * FROM participants WHERE id = ?")
            .bind(participant_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(internal)
    }

    pub async fn find_by_sub(&self, sub: &str) -> Result<Option<Participant>, Problem> {
        sqlx::query_as::<_, Participant>("SELECT * FROM participants WHERE sub = ?")
            .bind(sub)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(internal)
    }

    /// Upsert keyed on the external identity subject; the identity system
    /// stays authoritative for role and display name.
    pub async fn save(&self, participant: Participant) -> Result<Participant, Problem> {
        sqlx::query_as::<_, Participant>(
            r#"
            INSERT INTO participants (id, created_at, updated_at, sub, role, display_name)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (sub) DO UPDATE SET
                updated_at = excluded.updated_at,
                role = excluded.role,
                display_name = excluded.display_name
            RETURNING *
            "#,
        )
        .bind(participant.id)
        .bind(participant.created_at)
        .bind(participant.updated_at)
        .bind(&participant.sub)
        .bind(&participant.role)
        .bind(&participant.display_name)
        .fetch_one(&self.pool.writer)
        .await
        .map_err(internal)
    }
}
