use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};

use crate::dtos::{
    NotificationPageResponseDto, NotificationResponseDto, PageQueryDto, PaginationDto,
    UpdatedCountResponseDto,
};
use crate::errors::problem::Problem;
use crate::middleware::authorization::AuthParticipant;
use crate::AppState;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

pub async fn get_notifications(
    State(state): State<Arc<AppState>>,
    Extension(AuthParticipant(auth_participant)): Extension<AuthParticipant>,
    Query(query): Query<PageQueryDto>,
) -> Result<Json<NotificationPageResponseDto>, Problem> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let (notifications, total) = state
        .notification_repository
        .find_page_by_user(auth_participant.id, page, limit, query.is_read)
        .await?;

    // Always the live count, regardless of the page filter; pushed counts
    // are reconciled against this on fetch.
    let unread_count = state
        .notification_repository
        .unread_count(auth_participant.id)
        .await?;

    Ok(Json(NotificationPageResponseDto {
        notifications: notifications
            .into_iter()
            .map(NotificationResponseDto::from)
            .collect(),
        unread_count,
        pagination: PaginationDto::new(page, limit, total),
    }))
}

pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    Extension(AuthParticipant(auth_participant)): Extension<AuthParticipant>,
    Path(notification_id): Path<String>,
) -> Result<Json<NotificationResponseDto>, Problem> {
    let notification_id: i64 = notification_id
        .parse()
        .map_err(|_| Problem::BadRequest("Invalid notification id".to_string()))?;

    let notification = state
        .notification_repository
        .mark_read(notification_id, auth_participant.id)
        .await?;

    Ok(Json(NotificationResponseDto::from(notification)))
}

pub async fn mark_all_notifications_read(
    State(state): State<Arc<AppState>>,
    Extension(AuthParticipant(auth_participant)): Extension<AuthParticipant>,
) -> Result<Json<UpdatedCountResponseDto>, Problem> {
    let updated = state
        .notification_repository
        .mark_all_read(auth_participant.id)
        .await?;

    Ok(Json(UpdatedCountResponseDto { updated }))
}
