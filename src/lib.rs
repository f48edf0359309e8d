use std::sync::{Arc, Mutex};

use snowflake::SnowflakeIdGenerator;

use crate::db::DbPool;
use crate::dispatcher::NotificationDispatcher;
use crate::gateway::ConnectionRegistry;
use crate::repositories::chat_repository::ChatRepository;
use crate::repositories::notification_repository::NotificationRepository;
use crate::repositories::participant_repository::ParticipantRepository;
use crate::repositories::relationship_repository::RelationshipRepository;

pub mod controllers;
pub mod db;
pub mod dispatcher;
pub mod dtos;
pub mod errors;
pub mod gateway;
pub mod middleware;
pub mod models;
pub mod repositories;

pub struct AppState {
    pub token_secret: String,

    pub id_generator: Arc<Mutex<SnowflakeIdGenerator>>,

    pub participant_repository: ParticipantRepository,
    pub relationship_repository: RelationshipRepository,
    pub chat_repository: ChatRepository,
    pub notification_repository: NotificationRepository,

    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: NotificationDispatcher,
}

impl AppState {
    pub fn new(pool: DbPool, token_secret: String) -> Self {
        let id_generator = Arc::new(Mutex::new(SnowflakeIdGenerator::new(1, 1)));
        let registry = Arc::new(ConnectionRegistry::new());
        let notification_repository = NotificationRepository::new(pool.clone());
        let dispatcher = NotificationDispatcher::new(
            Arc::clone(&id_generator),
            notification_repository.clone(),
            Arc::clone(&registry),
        );

        AppState {
            token_secret,
            id_generator,
            participant_repository: ParticipantRepository::new(pool.clone()),
            relationship_repository: RelationshipRepository::new(pool.clone()),
            chat_repository: ChatRepository::new(pool),
            notification_repository,
            registry,
            dispatcher,
        }
    }

    pub fn next_id(&self) -> i64 {
        self.id_generator.lock().unwrap().generate()
    }
}
