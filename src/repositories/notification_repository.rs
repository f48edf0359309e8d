use derive_new::new;

use crate::db::{internal, DbPool};
use crate::errors::problem::Problem;
use crate::models::Notification;

#[derive(new, Debug, Clone)]
pub struct NotificationRepository {
    pool: DbPool,
}

impl NotificationRepository {
    pub async fn save(&self, notification: Notification) -> Result<Notification, Problem> {
        sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (id, created_at, user_id, kind, message, is_read)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(notification.id)
        .bind(notification.created_at)
        .bind(notification.user_id)
        .bind(&notification.kind)
        .bind(&notification.message)
        .bind(notification.is_read)
        .fetch_one(&self.pool.writer)
        .await
        .map_err(internal)
    }

    pub async fn find_page_by_user(
        &self,
        user_id: i64,
        page: i64,
        limit: i64,
        is_read: Option<bool>,
    ) -> Result<(Vec<Notification>, i64), Problem> {
        let (notifications, total) = match is_read {
            Some(is_read) => {
                let notifications = sqlx::query_as::<_, Notification>(
                    r#"
                    SELECT * FROM notifications
                    WHERE user_id = ? AND is_read = ?
                    ORDER BY created_at DESC, id DESC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(user_id)
                .bind(is_read)
                .bind(limit)
                .bind((page - 1) * limit)
                .fetch_all(&self.pool.reader)
                .await
                .map_err(internal)?;

                let total = sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = ?",
                )
                .bind(user_id)
                .bind(is_read)
                .fetch_one(&self.pool.reader)
                .await
                .map_err(internal)?;

                (notifications, total)
            }
            None => {
                let notifications = sqlx::query_as::<_, Notification>(
                    r#"
                    SELECT * FROM notifications
                    WHERE user_id = ?
                    ORDER BY created_at DESC, id DESC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(user_id)
                .bind(limit)
                .bind((page - 1) * limit)
                .fetch_all(&self.pool.reader)
                .await
                .map_err(internal)?;

                let total = sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM notifications WHERE user_id = ?",
                )
                .bind(user_id)
                .fetch_one(&self.pool.reader)
                .await
                .map_err(internal)?;

                (notifications, total)
            }
        };

        Ok((notifications, total))
    }

    /// Live count, never a maintained counter. Pushed counts are hints that
    /// clients reconcile against this query.
    pub async fn unread_count(&self, user_id: i64) -> Result<i64, Problem> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0",
        )
        .bind(user_id)
        .fetch_one(&self.pool.reader)
        .await
        .map_err(internal)
    }

    /// Ownership-checked and idempotent: marking an already-read
    /// notification succeeds without further effect.
    pub async fn mark_read(
        &self,
        notification_id: i64,
        user_id: i64,
    ) -> Result<Notification, Problem> {
        sqlx::query_as::<_, Notification>(
            "UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ? RETURNING *",
        )
        .bind(notification_id)
        .bind(user_id)
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(internal)?
        .ok_or(Problem::NotFound("Notification not found".to_string()))
    }

    pub async fn mark_all_read(&self, user_id: i64) -> Result<u64, Problem> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0")
                .bind(user_id)
                .execute(&self.pool.writer)
                .await
                .map_err(internal)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_pool;
    use crate::models::{NotificationKind, Participant, Role};
    use crate::repositories::participant_repository::ParticipantRepository;

    async fn setup() -> NotificationRepository {
        let pool = test_pool().await;
        let participants = ParticipantRepository::new(pool.clone());
        let now = chrono::Utc::now().naive_utc();
        for id in [1, 2] {
            participants
                .save(Participant {
                    id,
                    created_at: now,
                    updated_at: now,
                    sub: format!("sub-{id}"),
                    role: Role::Trainee.to_string(),
                    display_name: None,
                })
                .await
                .unwrap();
        }
        NotificationRepository::new(pool)
    }

    fn make_notification(id: i64, user_id: i64, kind: NotificationKind) -> Notification {
        Notification {
            id,
            created_at: chrono::Utc::now().naive_utc(),
            user_id,
            kind: kind.to_string(),
            message: format!("notification {id}"),
            is_read: false,
        }
    }

    #[tokio::test]
    async fn test_unread_count_matches_live_state() {
        let repo = setup().await;

        for id in 10..15 {
            repo.save(make_notification(id, 1, NotificationKind::NewMessage))
                .await
                .unwrap();
        }
        repo.save(make_notification(20, 2, NotificationKind::NewPlan))
            .await
            .unwrap();

        assert_eq!(repo.unread_count(1).await.unwrap(), 5);

        repo.mark_read(10, 1).await.unwrap();
        repo.mark_read(11, 1).await.unwrap();
        assert_eq!(repo.unread_count(1).await.unwrap(), 3);

        let (unread, total) = repo.find_page_by_user(1, 1, 20, Some(false)).await.unwrap();
        assert_eq!(unread.len(), 3);
        assert_eq!(total, 3);
        assert_eq!(total, repo.unread_count(1).await.unwrap());

        // Bulk transition settles the count to zero; the other user's
        // records are untouched.
        let updated = repo.mark_all_read(1).await.unwrap();
        assert_eq!(updated, 3);
        assert_eq!(repo.unread_count(1).await.unwrap(), 0);
        assert_eq!(repo.unread_count(2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mark_read_is_idempotent() {
        let repo = setup().await;
        repo.save(make_notification(10, 1, NotificationKind::RelationshipChanged))
            .await
            .unwrap();

        let first = repo.mark_read(10, 1).await.unwrap();
        assert!(first.is_read);

        let second = repo.mark_read(10, 1).await.unwrap();
        assert!(second.is_read);
        assert_eq!(repo.unread_count(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_read_is_ownership_checked() {
        let repo = setup().await;
        repo.save(make_notification(10, 1, NotificationKind::NewComment))
            .await
            .unwrap();

        let err = repo.mark_read(10, 2).await.unwrap_err();
        assert!(matches!(err, Problem::NotFound(_)));
        assert_eq!(repo.unread_count(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mark_all_read_is_idempotent() {
        let repo = setup().await;
        repo.save(make_notification(10, 1, NotificationKind::NewMessage))
            .await
            .unwrap();

        assert_eq!(repo.mark_all_read(1).await.unwrap(), 1);
        assert_eq!(repo.mark_all_read(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_page_filter_by_read_state() {
        let repo = setup().await;
        for id in 10..14 {
            repo.save(make_notification(id, 1, NotificationKind::NewMessage))
                .await
                .unwrap();
        }
        repo.mark_read(10, 1).await.unwrap();

        let (read, read_total) = repo.find_page_by_user(1, 1, 20, Some(true)).await.unwrap();
        assert_eq!(read_total, 1);
        assert_eq!(read[0].id, 10);

        let (all, all_total) = repo.find_page_by_user(1, 1, 20, None).await.unwrap();
        assert_eq!(all_total, 4);
        assert_eq!(all.len(), 4);
    }
}
