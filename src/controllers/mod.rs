pub mod debug_controller;
pub mod message_controller;
pub mod notification_controller;
pub mod relationship_controller;
