use std::env;
use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, patch, post};
use axum::Router;
use coachlink_api::controllers::{
    debug_controller, message_controller, notification_controller, relationship_controller,
};
use coachlink_api::db::DbPool;
use coachlink_api::gateway::{self, ws};
use coachlink_api::middleware::authorization;
use coachlink_api::AppState;
use dotenvy::dotenv;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coachlink_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let token_secret = env::var("AUTH_TOKEN_SECRET").expect("AUTH_TOKEN_SECRET must be set");

    let pool = DbPool::connect(&database_url)
        .await
        .expect("failed to connect to database");

    let state = Arc::new(AppState::new(pool, token_secret));

    tokio::spawn(gateway::run_typing_sweeper(Arc::clone(&state.registry)));

    let api = Router::new()
        .route(
            "/relationships",
            post(relationship_controller::create_relationship)
                .get(relationship_controller::get_relationships),
        )
        .route(
            "/relationships/:relationship_id",
            get(relationship_controller::get_relationship),
        )
        .route(
            "/relationships/:relationship_id/accept",
            post(relationship_controller::accept_relationship),
        )
        .route(
            "/relationships/:relationship_id/reject",
            post(relationship_controller::reject_relationship),
        )
        .route(
            "/relationships/:relationship_id/unpair",
            post(relationship_controller::unpair_relationship),
        )
        .route("/messages", post(message_controller::create_message))
        .route("/chats", get(message_controller::get_chats))
        .route(
            "/chats/:chat_room_id/messages",
            get(message_controller::get_chat_messages),
        )
        .route(
            "/chats/:chat_room_id/read",
            patch(message_controller::mark_chat_read),
        )
        .route(
            "/notifications",
            get(notification_controller::get_notifications),
        )
        .route(
            "/notifications/:notification_id/read",
            patch(notification_controller::mark_notification_read),
        )
        .route(
            "/notifications/mark-all-read",
            patch(notification_controller::mark_all_notifications_read),
        )
        .layer(from_fn_with_state(
            Arc::clone(&state),
            authorization::authorize,
        ));

    let app = Router::new()
        .route("/health", get(debug_controller::health))
        .nest("/v1", api)
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let host = env::var("SERVER_HOST").unwrap_or("127.0.0.1".to_string());
    let port = env::var("SERVER_PORT").unwrap_or("8080".to_string());
    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}"))
        .await
        .expect("failed to bind server address");
    tracing::info!(
        "listening on {}",
        listener.local_addr().expect("failed to read local addr")
    );

    axum::serve(listener, app).await.expect("server error");
}
