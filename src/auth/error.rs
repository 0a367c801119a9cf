use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::auth::{dto::MessageResponse, repo::StoreError};

pub type AuthResult<T> = Result<T, AuthError>;

/// Outcome of a failed auth request. Anything not classified below ends up
/// as `Unexpected` through `?`.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    BadRequest(String),

    #[error("User already exists")]
    Conflict,

    /// Covers both unknown email and wrong password.
    #[error("Invalid credentials")]
    Unauthorized,

    #[error("Internal server error")]
    Unexpected(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::Conflict => StatusCode::CONFLICT,
            AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => AuthError::Conflict,
            StoreError::Database(e) => AuthError::Unexpected(e.into()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::Unexpected(e) = &self {
            error!(error = ?e, "request failed");
        }
        let status = self.status_code();
        let body = MessageResponse {
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
