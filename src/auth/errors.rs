//! Failure kinds surfaced by the session operations and their HTTP mapping.
//!
//! Messages are safe to show to clients. `InvalidCredentials` deliberately
//! covers both an unknown email and a wrong password.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("email already registered")]
    DuplicateEmail,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is inactive")]
    InactiveAccount,

    #[error("invalid refresh token")]
    InvalidRefreshToken,

    #[error("refresh token expired, please log in again")]
    ExpiredRefreshToken,

    #[error("invalid or expired access token")]
    InvalidAccessToken,

    #[error("{0}")]
    Validation(String),

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AuthError::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::DuplicateEmail | AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials
            | AuthError::InactiveAccount
            | AuthError::InvalidRefreshToken
            | AuthError::ExpiredRefreshToken
            | AuthError::InvalidAccessToken => StatusCode::UNAUTHORIZED,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::Internal(e) = &self {
            error!(error = ?e, "unhandled error");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
