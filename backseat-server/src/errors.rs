use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use backseat_core::StreamingError;
use serde_json::Value;
use thiserror::Error;

use crate::schemas::ErrorBody;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Missing access token")]
    MissingToken,
    #[error("Authorization must be Bearer")]
    MalformedAuthorization,
    #[error("{0}")]
    BadRequest(String),
    /// The streaming service refused, its status is handed on
    #[error("Spotify error")]
    Upstream { status: u16, details: String },
    /// The token endpoint refused the code, its body is handed on
    #[error("Token exchange failed")]
    TokenExchange { body: String },
    #[error("{0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::MissingToken => StatusCode::UNAUTHORIZED,
            Self::MalformedAuthorization => StatusCode::BAD_REQUEST,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { status, details: _ } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.as_status_code();

        match self {
            Self::TokenExchange { body } => match serde_json::from_str::<Value>(&body) {
                Ok(json) => (status, Json(json)).into_response(),
                Err(_) => (status, body).into_response(),
            },
            Self::Upstream { status: _, details } => (
                status,
                Json(ErrorBody {
                    error: "Spotify error".to_string(),
                    details: Some(details),
                }),
            )
                .into_response(),
            e => (
                status,
                Json(ErrorBody {
                    error: e.to_string(),
                    details: None,
                }),
            )
                .into_response(),
        }
    }
}

impl From<StreamingError> for ServerError {
    fn from(value: StreamingError) -> Self {
        match value {
            StreamingError::Upstream { status, body } => Self::Upstream {
                status,
                details: body,
            },
            StreamingError::Unauthorized => Self::Upstream {
                status: 401,
                details: value.to_string(),
            },
            e => Self::Unknown(e.to_string()),
        }
    }
}
