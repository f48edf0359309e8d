use std::fmt::{Display, Formatter};

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{self, Deserialize, Serialize};
use serde_json::json;

const CONTENT_TYPE: &str = "application/problem+json";
const TYPE_URL: &str = "https://api.coachlink.dev/problems";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Problem {
    BadRequest(String),
    Conflict(String),
    Forbidden(String),
    InternalServerError(String),
    InvalidState(String),
    NotFound(String),
    Unauthorized(String),
}

impl Problem {
    fn status(&self) -> StatusCode {
        match self {
            Problem::BadRequest(_) => StatusCode::BAD_REQUEST,
            Problem::Conflict(_) => StatusCode::CONFLICT,
            Problem::Forbidden(_) => StatusCode::FORBIDDEN,
            Problem::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // InvalidState keeps its own problem type so clients can tell
            // "this invite was already handled" apart from a 409 exclusivity
            // conflict, but maps to the same 400 as malformed input.
            Problem::InvalidState(_) => StatusCode::BAD_REQUEST,
            Problem::NotFound(_) => StatusCode::NOT_FOUND,
            Problem::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    fn slug(&self) -> &'static str {
        match self {
            Problem::BadRequest(_) => "bad-request",
            Problem::Conflict(_) => "conflict",
            Problem::Forbidden(_) => "forbidden",
            Problem::InternalServerError(_) => "internal-server-error",
            Problem::InvalidState(_) => "invalid-state",
            Problem::NotFound(_) => "not-found",
            Problem::Unauthorized(_) => "unauthorized",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Problem::BadRequest(_) => "Bad Request",
            Problem::Conflict(_) => "Conflict",
            Problem::Forbidden(_) => "Forbidden",
            Problem::InternalServerError(_) => "Internal Server Error",
            Problem::InvalidState(_) => "Invalid State",
            Problem::NotFound(_) => "Not Found",
            Problem::Unauthorized(_) => "Unauthorized",
        }
    }

    fn detail(&self) -> &str {
        match self {
            Problem::BadRequest(detail)
            | Problem::Conflict(detail)
            | Problem::Forbidden(detail)
            | Problem::InternalServerError(detail)
            | Problem::InvalidState(detail)
            | Problem::NotFound(detail)
            | Problem::Unauthorized(detail) => detail,
        }
    }
}

impl Display for Problem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.title(), self.detail())
    }
}

impl std::error::Error for Problem {}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "type": format!("{}/{}", TYPE_URL, self.slug()),
            "title": self.title(),
            "status": status.as_u16(),
            "detail": self.detail(),
        }));

        (status, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response()
    }
}
