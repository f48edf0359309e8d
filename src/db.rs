use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::errors::problem::Problem;

/// Split read/write pool for SQLite in WAL mode.
///
/// SQLite allows one writer at a time; the writer side is a single-connection
/// pool so every write (including the multi-statement accept transaction) is
/// serialized at the store, while reads fan out over the reader pool.
#[derive(Debug, Clone)]
pub struct DbPool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

impl DbPool {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await?;

        run_migrations(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        Ok(Self { reader, writer })
    }
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS participants (
            id INTEGER PRIMARY KEY,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            sub TEXT UNIQUE NOT NULL,
            role TEXT NOT NULL,
            display_name TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS relationships (
            id INTEGER PRIMARY KEY,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            trainee_id INTEGER NOT NULL REFERENCES participants(id),
            coach_id INTEGER NOT NULL REFERENCES participants(id),
            status TEXT NOT NULL DEFAULT 'PENDING',
            accepted_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_rooms (
            id INTEGER PRIMARY KEY,
            created_at TEXT NOT NULL,
            trainee_id INTEGER NOT NULL REFERENCES participants(id),
            coach_id INTEGER NOT NULL REFERENCES participants(id),
            UNIQUE (trainee_id, coach_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY,
            created_at TEXT NOT NULL,
            chat_room_id INTEGER NOT NULL REFERENCES chat_rooms(id),
            sender_id INTEGER NOT NULL REFERENCES participants(id),
            text TEXT,
            attachment TEXT,
            correlation_id TEXT,
            is_read INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id INTEGER PRIMARY KEY,
            created_at TEXT NOT NULL,
            user_id INTEGER NOT NULL REFERENCES participants(id),
            kind TEXT NOT NULL,
            message TEXT NOT NULL,
            is_read INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_relationships_trainee ON relationships (trainee_id, status)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_messages_room ON messages (chat_room_id, created_at, id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications (user_id, is_read)",
    )
    .execute(pool)
    .await?;

    tracing::info!("database migrations completed");
    Ok(())
}

pub(crate) fn internal(err: sqlx::Error) -> Problem {
    tracing::error!("database error: {err}");
    Problem::InternalServerError("failed to query database".to_string())
}


#[cfg(test)]
mod tests {
    use super::test_support::test_pool;

    #[tokio::test]
    async fn test_migrations_create_tables() {
        let pool = test_pool().await;

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool.reader)
        .await
        .unwrap();

        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert!(names.contains(&"participants"));
        assert!(names.contains(&"relationships"));
        assert!(names.contains(&"chat_rooms"));
        assert!(names.contains(&"messages"));
        assert!(names.contains(&"notifications"));
    }

    #[tokio::test]
    async fn test_wal_mode() {
        let pool = test_pool().await;

        let mode: (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool.writer)
            .await
            .unwrap();

        assert_eq!(mode.0.to_lowercase(), "wal");
    }
}
