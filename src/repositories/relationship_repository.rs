use derive_new::new;

use crate::db::{internal, DbPool};
use crate::errors::problem::Problem;
use crate::models::{Relationship, RelationshipStatus, RelationshipWithParticipants};

#[derive(new, Debug, Clone)]
pub struct RelationshipRepository {
    pool: DbPool,
}

impl RelationshipRepository {
    pub async fn find_by_id(&self, relationship_id: i64) -> Result<Option<Relationship>, Problem> {
        sqlx::query_as::<_, Relationship>("SELECT * FROM relationships WHERE id = ?")
            .bind(relationship_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(internal)
    }

    pub async fn find_with_participants(
        &self,
        relationship: Relationship,
    ) -> Result<RelationshipWithParticipants, Problem> {
        let trainee = sqlx::query_as("SELECT * FROM participants WHERE id = ?")
            .bind(relationship.trainee_id)
            .fetch_one(&self.pool.reader)
            .await
            .map_err(internal)?;
        let coach = sqlx::query_as("SELECT * FROM participants WHERE id = ?")
            .bind(relationship.coach_id)
            .fetch_one(&self.pool.reader)
            .await
            .map_err(internal)?;

        Ok(RelationshipWithParticipants {
            relationship,
            trainee,
            coach,
        })
    }

    pub async fn find_for_participant(
        &self,
        participant_id: i64,
    ) -> Result<Vec<Relationship>, Problem> {
        sqlx::query_as::<_, Relationship>(
            "SELECT * FROM relationships WHERE trainee_id = ? OR coach_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(participant_id)
        .bind(participant_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(internal)
    }

    pub async fn exists_pending(&self, trainee_id: i64, coach_id: i64) -> Result<bool, Problem> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM relationships WHERE trainee_id = ? AND coach_id = ? AND status = 'PENDING')",
        )
        .bind(trainee_id)
        .bind(coach_id)
        .fetch_one(&self.pool.reader)
        .await
        .map_err(internal)
    }

    pub async fn find_accepted_between(
        &self,
        participant_a: i64,
        participant_b: i64,
    ) -> Result<Option<Relationship>, Problem> {
        sqlx::query_as::<_, Relationship>(
            r#"
            SELECT * FROM relationships
            WHERE status = 'ACCEPTED'
              AND ((trainee_id = ?1 AND coach_id = ?2) OR (trainee_id = ?2 AND coach_id = ?1))
            "#,
        )
        .bind(participant_a)
        .bind(participant_b)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(internal)
    }

    pub async fn accepted_count_for_trainee(&self, trainee_id: i64) -> Result<i64, Problem> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM relationships WHERE trainee_id = ? AND status = 'ACCEPTED'",
        )
        .bind(trainee_id)
        .fetch_one(&self.pool.reader)
        .await
        .map_err(internal)
    }

    pub async fn save(&self, relationship: Relationship) -> Result<Relationship, Problem> {
        sqlx::query_as::<_, Relationship>(
            r#"
            INSERT INTO relationships (id, created_at, updated_at, trainee_id, coach_id, status, accepted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                updated_at = excluded.updated_at,
                status = excluded.status,
                accepted_at = excluded.accepted_at
            RETURNING *
            "#,
        )
        .bind(relationship.id)
        .bind(relationship.created_at)
        .bind(relationship.updated_at)
        .bind(relationship.trainee_id)
        .bind(relationship.coach_id)
        .bind(&relationship.status)
        .bind(relationship.accepted_at)
        .fetch_one(&self.pool.writer)
        .await
        .map_err(internal)
    }

    /// Accept a pending invite and cascade-reject the trainee's other pending
    /// invites, all in one writer transaction.
    ///
    /// The first statement is the guarded UPDATE: it takes the write lock up
    /// front and the no-other-accepted-pairing check executes inside the
    /// write itself, never as a prior read. Zero rows affected is
    /// disambiguated afterwards, still inside the transaction.
    pub async fn accept(
        &self,
        relationship_id: i64,
        coach_id: i64,
        accepted_at: chrono::NaiveDateTime,
    ) -> Result<Relationship, Problem> {
        let mut tx = self.pool.writer.begin().await.map_err(internal)?;

        let updated = sqlx::query(
            r#"
            UPDATE relationships
            SET status = 'ACCEPTED', accepted_at = ?, updated_at = ?
            WHERE id = ? AND coach_id = ? AND status = 'PENDING'
              AND NOT EXISTS (
                  SELECT 1 FROM relationships other
                  WHERE other.trainee_id = relationships.trainee_id
                    AND other.status = 'ACCEPTED'
              )
            "#,
        )
        .bind(accepted_at)
        .bind(accepted_at)
        .bind(relationship_id)
        .bind(coach_id)
        .execute(&mut *tx)
        .await
        .map_err(internal)?
        .rows_affected();

        if updated == 0 {
            let relationship =
                sqlx::query_as::<_, Relationship>("SELECT * FROM relationships WHERE id = ?")
                    .bind(relationship_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(internal)?
                    .ok_or(Problem::NotFound("Relationship not found".to_string()))?;

            if relationship.coach_id != coach_id {
                return Err(Problem::Forbidden(
                    "Relationship belongs to another coach".to_string(),
                ));
            }

            return Err(match relationship.status() {
                Some(RelationshipStatus::Pending) => Problem::Conflict(
                    "Trainee already has an accepted relationship".to_string(),
                ),
                _ => Problem::InvalidState("Relationship is not pending".to_string()),
            });
        }

        sqlx::query(
            r#"
            UPDATE relationships
            SET status = 'REJECTED', updated_at = ?
            WHERE trainee_id = (SELECT trainee_id FROM relationships WHERE id = ?)
              AND status = 'PENDING' AND id != ?
            "#,
        )
        .bind(accepted_at)
        .bind(relationship_id)
        .bind(relationship_id)
        .execute(&mut *tx)
        .await
        .map_err(internal)?;

        let relationship =
            sqlx::query_as::<_, Relationship>("SELECT * FROM relationships WHERE id = ?")
                .bind(relationship_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(internal)?;

        tx.commit().await.map_err(internal)?;

        Ok(relationship)
    }

    pub async fn reject(
        &self,
        relationship_id: i64,
        coach_id: i64,
        rejected_at: chrono::NaiveDateTime,
    ) -> Result<Relationship, Problem> {
        let mut tx = self.pool.writer.begin().await.map_err(internal)?;

        let updated = sqlx::query(
            "UPDATE relationships SET status = 'REJECTED', updated_at = ? WHERE id = ? AND coach_id = ? AND status = 'PENDING'",
        )
        .bind(rejected_at)
        .bind(relationship_id)
        .bind(coach_id)
        .execute(&mut *tx)
        .await
        .map_err(internal)?
        .rows_affected();

        if updated == 0 {
            let relationship =
                sqlx::query_as::<_, Relationship>("SELECT * FROM relationships WHERE id = ?")
                    .bind(relationship_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(internal)?
                    .ok_or(Problem::NotFound("Relationship not found".to_string()))?;

            if relationship.coach_id != coach_id {
                return Err(Problem::Forbidden(
                    "Relationship belongs to another coach".to_string(),
                ));
            }

            return Err(Problem::InvalidState(
                "Relationship is not pending".to_string(),
            ));
        }

        let relationship =
            sqlx::query_as::<_, Relationship>("SELECT * FROM relationships WHERE id = ?")
                .bind(relationship_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(internal)?;

        tx.commit().await.map_err(internal)?;

        Ok(relationship)
    }

    /// End an accepted pairing. Either party may unpair; the record is kept
    /// as history and only the active-pairing view is cleared.
    pub async fn unpair(
        &self,
        relationship_id: i64,
        participant_id: i64,
        ended_at: chrono::NaiveDateTime,
    ) -> Result<Relationship, Problem> {
        let mut tx = self.pool.writer.begin().await.map_err(internal)?;

        let updated = sqlx::query(
            r#"
            UPDATE relationships
            SET status = 'ENDED', updated_at = ?
            WHERE id = ? AND status = 'ACCEPTED' AND (trainee_id = ? OR coach_id = ?)
            "#,
        )
        .bind(ended_at)
        .bind(relationship_id)
        .bind(participant_id)
        .bind(participant_id)
        .execute(&mut *tx)
        .await
        .map_err(internal)?
        .rows_affected();

        if updated == 0 {
            let relationship =
                sqlx::query_as::<_, Relationship>("SELECT * FROM relationships WHERE id = ?")
                    .bind(relationship_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(internal)?
                    .ok_or(Problem::NotFound("Relationship not found".to_string()))?;

            if !relationship.is_party(participant_id) {
                return Err(Problem::Forbidden(
                    "Relationship belongs to other participants".to_string(),
                ));
            }

            return Err(Problem::InvalidState(
                "Relationship is not accepted".to_string(),
            ));
        }

        let relationship =
            sqlx::query_as::<_, Relationship>("SELECT * FROM relationships WHERE id = ?")
                .bind(relationship_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(internal)?;

        tx.commit().await.map_err(internal)?;

        Ok(relationship)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::test_support::test_pool;
    use crate::models::{Participant, Role};
    use crate::repositories::participant_repository::ParticipantRepository;

    async fn seed_participant(pool: &DbPool, id: i64, role: Role) {
        let now = chrono::Utc::now().naive_utc();
        ParticipantRepository::new(pool.clone())
            .save(Participant {
                id,
                created_at: now,
                updated_at: now,
                sub: format!("sub-{id}"),
                role: role.to_string(),
                display_name: None,
            })
            .await
            .unwrap();
    }

    fn make_pending(id: i64, trainee_id: i64, coach_id: i64) -> Relationship {
        let now = chrono::Utc::now().naive_utc();
        Relationship {
            id,
            created_at: now,
            updated_at: now,
            trainee_id,
            coach_id,
            status: RelationshipStatus::Pending.to_string(),
            accepted_at: None,
        }
    }

    async fn setup() -> (DbPool, RelationshipRepository) {
        let pool = test_pool().await;
        seed_participant(&pool, 1, Role::Trainee).await;
        seed_participant(&pool, 2, Role::Coach).await;
        seed_participant(&pool, 3, Role::Coach).await;
        seed_participant(&pool, 4, Role::Coach).await;
        let repo = RelationshipRepository::new(pool.clone());
        (pool, repo)
    }

    fn now() -> chrono::NaiveDateTime {
        chrono::Utc::now().naive_utc()
    }

    #[tokio::test]
    async fn test_accept_cascades_other_pending_invites() {
        let (_pool, repo) = setup().await;
        repo.save(make_pending(10, 1, 2)).await.unwrap();
        repo.save(make_pending(11, 1, 3)).await.unwrap();

        let accepted = repo.accept(10, 2, now()).await.unwrap();
        assert_eq!(accepted.status(), Some(RelationshipStatus::Accepted));
        assert!(accepted.accepted_at.is_some());

        // The losing invite was flipped by the cascade, not left pending.
        let other = repo.find_by_id(11).await.unwrap().unwrap();
        assert_eq!(other.status(), Some(RelationshipStatus::Rejected));

        // The losing coach's accept now fails as already-handled.
        let err = repo.accept(11, 3, now()).await.unwrap_err();
        assert!(matches!(err, Problem::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_accept_conflicts_when_trainee_already_paired() {
        let (_pool, repo) = setup().await;
        repo.save(make_pending(10, 1, 2)).await.unwrap();
        repo.accept(10, 2, now()).await.unwrap();

        // A later invite is still possible, but accepting it must fail
        // without touching the existing pairing.
        repo.save(make_pending(12, 1, 4)).await.unwrap();
        let err = repo.accept(12, 4, now()).await.unwrap_err();
        assert!(matches!(err, Problem::Conflict(_)));

        let original = repo.find_by_id(10).await.unwrap().unwrap();
        assert_eq!(original.status(), Some(RelationshipStatus::Accepted));
        let loser = repo.find_by_id(12).await.unwrap().unwrap();
        assert_eq!(loser.status(), Some(RelationshipStatus::Pending));
    }

    #[tokio::test]
    async fn test_concurrent_accepts_admit_exactly_one() {
        let (_pool, repo) = setup().await;
        repo.save(make_pending(10, 1, 2)).await.unwrap();
        repo.save(make_pending(11, 1, 3)).await.unwrap();

        let repo = Arc::new(repo);
        let first = {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move { repo.accept(10, 2, now()).await })
        };
        let second = {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move { repo.accept(11, 3, now()).await })
        };

        let outcomes = [first.await.unwrap(), second.await.unwrap()];
        let winners = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        assert_eq!(winners, 1);

        assert_eq!(repo.accepted_count_for_trainee(1).await.unwrap(), 1);

        // The loser is never left accepted: it is either still pending
        // (conflict path) or rejected by the winner's cascade.
        for id in [10, 11] {
            let relationship = repo.find_by_id(id).await.unwrap().unwrap();
            if relationship.status() == Some(RelationshipStatus::Accepted) {
                continue;
            }
            assert!(matches!(
                relationship.status(),
                Some(RelationshipStatus::Pending) | Some(RelationshipStatus::Rejected)
            ));
        }
    }

    #[tokio::test]
    async fn test_accept_checks_ownership_and_existence() {
        let (_pool, repo) = setup().await;
        repo.save(make_pending(10, 1, 2)).await.unwrap();

        let err = repo.accept(10, 3, now()).await.unwrap_err();
        assert!(matches!(err, Problem::Forbidden(_)));

        let err = repo.accept(999, 2, now()).await.unwrap_err();
        assert!(matches!(err, Problem::NotFound(_)));

        // Nothing moved.
        let relationship = repo.find_by_id(10).await.unwrap().unwrap();
        assert_eq!(relationship.status(), Some(RelationshipStatus::Pending));
    }

    #[tokio::test]
    async fn test_reject_is_terminal() {
        let (_pool, repo) = setup().await;
        repo.save(make_pending(10, 1, 2)).await.unwrap();

        let rejected = repo.reject(10, 2, now()).await.unwrap();
        assert_eq!(rejected.status(), Some(RelationshipStatus::Rejected));

        let err = repo.accept(10, 2, now()).await.unwrap_err();
        assert!(matches!(err, Problem::InvalidState(_)));

        let err = repo.reject(10, 2, now()).await.unwrap_err();
        assert!(matches!(err, Problem::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_unpair_clears_active_pairing_and_keeps_history() {
        let (_pool, repo) = setup().await;
        repo.save(make_pending(10, 1, 2)).await.unwrap();
        repo.accept(10, 2, now()).await.unwrap();

        // Either party may unpair; here the trainee does.
        let ended = repo.unpair(10, 1, now()).await.unwrap();
        assert_eq!(ended.status(), Some(RelationshipStatus::Ended));
        assert_eq!(repo.accepted_count_for_trainee(1).await.unwrap(), 0);

        // The trainee can pair again afterwards.
        repo.save(make_pending(20, 1, 3)).await.unwrap();
        let accepted = repo.accept(20, 3, now()).await.unwrap();
        assert_eq!(accepted.status(), Some(RelationshipStatus::Accepted));

        // History survives.
        let history = repo.find_for_participant(1).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_unpair_requires_party_and_accepted_state() {
        let (_pool, repo) = setup().await;
        repo.save(make_pending(10, 1, 2)).await.unwrap();

        let err = repo.unpair(10, 1, now()).await.unwrap_err();
        assert!(matches!(err, Problem::InvalidState(_)));

        repo.accept(10, 2, now()).await.unwrap();
        let err = repo.unpair(10, 3, now()).await.unwrap_err();
        assert!(matches!(err, Problem::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_exists_pending_and_accepted_between() {
        let (_pool, repo) = setup().await;
        repo.save(make_pending(10, 1, 2)).await.unwrap();

        assert!(repo.exists_pending(1, 2).await.unwrap());
        assert!(!repo.exists_pending(1, 3).await.unwrap());
        assert!(repo.find_accepted_between(1, 2).await.unwrap().is_none());

        repo.accept(10, 2, now()).await.unwrap();
        assert!(!repo.exists_pending(1, 2).await.unwrap());
        // Symmetric lookup.
        assert!(repo.find_accepted_between(2, 1).await.unwrap().is_some());
    }
}
