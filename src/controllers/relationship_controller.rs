use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;

use crate::dtos::{RelationshipRequestDto, RelationshipResponseDto, RelationshipSummaryDto};
use crate::errors::problem::Problem;
use crate::middleware::authorization::AuthParticipant;
use crate::models::{NotificationKind, Relationship, RelationshipStatus, Role};
use crate::AppState;

pub async fn create_relationship(
    State(state): State<Arc<AppState>>,
    Extension(AuthParticipant(auth_participant)): Extension<AuthParticipant>,
    Json(body): Json<RelationshipRequestDto>,
) -> Result<(StatusCode, Json<RelationshipResponseDto>), Problem> {
    if auth_participant.role() != Some(Role::Trainee) {
        return Err(Problem::Forbidden(
            "Only trainees may request a pairing".to_string(),
        ));
    }

    let coach_id: i64 = body
        .coach_id
        .parse()
        .map_err(|_| Problem::BadRequest("Invalid coachId".to_string()))?;

    let coach = state
        .participant_repository
        .find_by_id(coach_id)
        .await?
        .ok_or(Problem::NotFound("Coach not found".to_string()))?;
    if coach.role() != Some(Role::Coach) {
        return Err(Problem::BadRequest(
            "Requested participant is not a coach".to_string(),
        ));
    }

    if state
        .relationship_repository
        .exists_pending(auth_participant.id, coach_id)
        .await?
    {
        return Err(Problem::Conflict(
            "Pairing request already pending".to_string(),
        ));
    }

    let now = Utc::now().naive_utc();
    let relationship = state
        .relationship_repository
        .save(Relationship {
            id: state.next_id(),
            created_at: now,
            updated_at: now,
            trainee_id: auth_participant.id,
            coach_id,
            status: RelationshipStatus::Pending.to_string(),
            accepted_at: None,
        })
        .await?;

    state
        .dispatcher
        .notify(
            coach_id,
            NotificationKind::RelationshipChanged,
            format!("{} requested to pair with you", auth_participant.name()),
        )
        .await?;

    let relationship = state
        .relationship_repository
        .find_with_participants(relationship)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RelationshipResponseDto::from(relationship)),
    ))
}

pub async fn get_relationships(
    State(state): State<Arc<AppState>>,
    Extension(AuthParticipant(auth_participant)): Extension<AuthParticipant>,
) -> Result<Json<Vec<RelationshipSummaryDto>>, Problem> {
    let relationships = state
        .relationship_repository
        .find_for_participant(auth_participant.id)
        .await?;

    Ok(Json(
        relationships
            .into_iter()
            .map(RelationshipSummaryDto::from)
            .collect(),
    ))
}

pub async fn get_relationship(
    State(state): State<Arc<AppState>>,
    Extension(AuthParticipant(auth_participant)): Extension<AuthParticipant>,
    Path(relationship_id): Path<String>,
) -> Result<Json<RelationshipResponseDto>, Problem> {
    let relationship_id = parse_id(&relationship_id)?;

    let relationship = state
        .relationship_repository
        .find_by_id(relationship_id)
        .await?
        .filter(|relationship| relationship.is_party(auth_participant.id))
        .ok_or(Problem::NotFound("Relationship not found".to_string()))?;

    let relationship = state
        .relationship_repository
        .find_with_participants(relationship)
        .await?;

    Ok(Json(RelationshipResponseDto::from(relationship)))
}

pub async fn accept_relationship(
    State(state): State<Arc<AppState>>,
    Extension(AuthParticipant(auth_participant)): Extension<AuthParticipant>,
    Path(relationship_id): Path<String>,
) -> Result<Json<RelationshipResponseDto>, Problem> {
    let relationship_id = parse_id(&relationship_id)?;

    if auth_participant.role() != Some(Role::Coach) {
        return Err(Problem::Forbidden(
            "Only coaches may accept a pairing request".to_string(),
        ));
    }

    let relationship = state
        .relationship_repository
        .accept(relationship_id, auth_participant.id, Utc::now().naive_utc())
        .await?;

    state
        .dispatcher
        .notify(
            relationship.trainee_id,
            NotificationKind::RelationshipChanged,
            format!("{} accepted your pairing request", auth_participant.name()),
        )
        .await?;

    let relationship = state
        .relationship_repository
        .find_with_participants(relationship)
        .await?;

    Ok(Json(RelationshipResponseDto::from(relationship)))
}

pub async fn reject_relationship(
    State(state): State<Arc<AppState>>,
    Extension(AuthParticipant(auth_participant)): Extension<AuthParticipant>,
    Path(relationship_id): Path<String>,
) -> Result<Json<RelationshipResponseDto>, Problem> {
    let relationship_id = parse_id(&relationship_id)?;

    if auth_participant.role() != Some(Role::Coach) {
        return Err(Problem::Forbidden(
            "Only coaches may reject a pairing request".to_string(),
        ));
    }

    let relationship = state
        .relationship_repository
        .reject(relationship_id, auth_participant.id, Utc::now().naive_utc())
        .await?;

    state
        .dispatcher
        .notify(
            relationship.trainee_id,
            NotificationKind::RelationshipChanged,
            format!("{} declined your pairing request", auth_participant.name()),
        )
        .await?;

    let relationship = state
        .relationship_repository
        .find_with_participants(relationship)
        .await?;

    Ok(Json(RelationshipResponseDto::from(relationship)))
}

pub async fn unpair_relationship(
    State(state): State<Arc<AppState>>,
    Extension(AuthParticipant(auth_participant)): Extension<AuthParticipant>,
    Path(relationship_id): Path<String>,
) -> Result<Json<RelationshipResponseDto>, Problem> {
    let relationship_id = parse_id(&relationship_id)?;

    let relationship = state
        .relationship_repository
        .unpair(relationship_id, auth_participant.id, Utc::now().naive_utc())
        .await?;

    state
        .dispatcher
        .notify(
            relationship.counterpart_of(auth_participant.id),
            NotificationKind::RelationshipChanged,
            format!("{} ended your pairing", auth_participant.name()),
        )
        .await?;

    let relationship = state
        .relationship_repository
        .find_with_participants(relationship)
        .await?;

    Ok(Json(RelationshipResponseDto::from(relationship)))
}

fn parse_id(raw: &str) -> Result<i64, Problem> {
    raw.parse()
        .map_err(|_| Problem::BadRequest("Invalid relationship id".to_string()))
}
