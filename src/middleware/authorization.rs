use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::errors::problem::Problem;
use crate::models::{Participant, Role};
use crate::AppState;

/// Claims minted by the external identity system. The core never issues
/// tokens; it only consumes the identity and role carried here.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub name: Option<String>,
    pub exp: usize,
}

/// The authenticated participant, inserted as a request extension by
/// `authorize` and extracted by every handler under `/v1`.
#[derive(Debug, Clone)]
pub struct AuthParticipant(pub Participant);

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, Problem> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|err| {
        tracing::warn!("invalid token: {err}");
        Problem::Unauthorized("Invalid token".to_string())
    })
}

pub async fn authorize(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, Problem> {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(Problem::Unauthorized(
            "Missing authorization header".to_string(),
        ))?;

    let bearer_token = authorization.to_str().map_err(|_| {
        Problem::Unauthorized("Invalid authorization header".to_string())
    })?;

    let token = bearer_token
        .strip_prefix("Bearer ")
        .ok_or(Problem::Unauthorized("Invalid bearer token".to_string()))?;

    let claims = decode_token(token, &state.token_secret)?;
    claims
        .role
        .parse::<Role>()
        .map_err(|_| Problem::Unauthorized("Invalid role claim".to_string()))?;

    let participant = sync_participant(&state, &claims).await?;
    request.extensions_mut().insert(AuthParticipant(participant));

    Ok(next.run(request).await)
}

/// Mirror the token's identity into the participants table. The identity
/// system is authoritative; a row is created on first contact and refreshed
/// when the claims drift from what is stored.
pub async fn sync_participant(state: &AppState, claims: &Claims) -> Result<Participant, Problem> {
    if let Some(existing) = state.participant_repository.find_by_sub(&claims.sub).await? {
        if existing.role == claims.role && existing.display_name == claims.name {
            return Ok(existing);
        }
    }

    let now = Utc::now().naive_utc();
    state
        .participant_repository
        .save(Participant {
            id: state.next_id(),
            created_at: now,
            updated_at: now,
            sub: claims.sub.clone(),
            role: claims.role.clone(),
            display_name: claims.name.clone(),
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    pub fn make_token(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn make_claims(exp_offset_secs: i64) -> Claims {
        Claims {
            sub: "participant-1".to_string(),
            role: Role::Trainee.to_string(),
            name: Some("Alex".to_string()),
            exp: (Utc::now().timestamp() + exp_offset_secs) as usize,
        }
    }

    #[test]
    fn test_decode_round_trip() {
        let claims = make_claims(3600);
        let token = make_token(&claims, "secret");

        let decoded = decode_token(&token, "secret").unwrap();
        assert_eq!(decoded.sub, "participant-1");
        assert_eq!(decoded.role, "TRAINEE");
    }

    #[test]
    fn test_decode_rejects_wrong_secret_and_expiry() {
        let claims = make_claims(3600);
        let token = make_token(&claims, "secret");
        let err = decode_token(&token, "other-secret").unwrap_err();
        assert!(matches!(err, Problem::Unauthorized(_)));

        let expired = make_token(&make_claims(-3600), "secret");
        let err = decode_token(&expired, "secret").unwrap_err();
        assert!(matches!(err, Problem::Unauthorized(_)));
    }
}
