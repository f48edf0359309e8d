use std::sync::{Arc, Mutex};

use snowflake::SnowflakeIdGenerator;

use crate::dtos::NotificationResponseDto;
use crate::errors::problem::Problem;
use crate::gateway::events::ServerEvent;
use crate::gateway::ConnectionRegistry;
use crate::models::{Notification, NotificationKind};
use crate::repositories::notification_repository::NotificationRepository;

/// Turns durable events into notification records and pushes them to any
/// connected session of the addressee.
#[derive(Clone)]
pub struct NotificationDispatcher {
    id_generator: Arc<Mutex<SnowflakeIdGenerator>>,
    notification_repository: NotificationRepository,
    registry: Arc<ConnectionRegistry>,
}

impl NotificationDispatcher {
    pub fn new(
        id_generator: Arc<Mutex<SnowflakeIdGenerator>>,
        notification_repository: NotificationRepository,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            id_generator,
            notification_repository,
            registry,
        }
    }

    /// Persist first, push after. Persistence is authoritative: a failed or
    /// skipped push leaves the stored record to be picked up by the next
    /// notifications fetch.
    pub async fn notify(
        &self,
        user_id: i64,
        kind: NotificationKind,
        message: impl Into<String>,
    ) -> Result<Notification, Problem> {
        let id = self.id_generator.lock().unwrap().generate();
        let notification = self
            .notification_repository
            .save(Notification {
                id,
                created_at: chrono::Utc::now().naive_utc(),
                user_id,
                kind: kind.to_string(),
                message: message.into(),
                is_read: false,
            })
            .await?;

        let delivered = self
            .registry
            .send_to_participant(
                user_id,
                ServerEvent::Notification {
                    notification: NotificationResponseDto::from(notification.clone()),
                },
            )
            .await;

        if delivered == 0 {
            tracing::debug!(
                "participant {user_id} has no connected session; notification {} awaits fetch",
                notification.id
            );
        }

        Ok(notification)
    }
}
