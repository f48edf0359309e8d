pub mod chat_repository;
pub mod notification_repository;
pub mod participant_repository;
pub mod relationship_repository;
