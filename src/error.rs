//! API error type and its JSON rendering.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Auth failures the client gets a friendlier message for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorCode {
    ExpiredActionCode,
    InvalidActionCode,
    WeakPassword,
    UserNotFound,
    WrongPassword,
    EmailAlreadyInUse,
    UsernameTaken,
    InvalidEmail,
}

impl AuthErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthErrorCode::ExpiredActionCode => "expired-action-code",
            AuthErrorCode::InvalidActionCode => "invalid-action-code",
            AuthErrorCode::WeakPassword => "weak-password",
            AuthErrorCode::UserNotFound => "user-not-found",
            AuthErrorCode::WrongPassword => "wrong-password",
            AuthErrorCode::EmailAlreadyInUse => "email-already-in-use",
            AuthErrorCode::UsernameTaken => "username-taken",
            AuthErrorCode::InvalidEmail => "invalid-email",
        }
    }

    pub fn friendly_message(&self) -> &'static str {
        match self {
            AuthErrorCode::ExpiredActionCode => "This link has expired. Please request a new one.",
            AuthErrorCode::InvalidActionCode => {
                "This link is invalid or has already been used. Please request a new one."
            }
            AuthErrorCode::WeakPassword => {
                "Password must be at least 8 characters and include an uppercase letter, a number and a special character."
            }
            AuthErrorCode::UserNotFound | AuthErrorCode::WrongPassword => {
                "Authentication failed. Check your email and password."
            }
            AuthErrorCode::EmailAlreadyInUse => "An account with this email already exists.",
            AuthErrorCode::UsernameTaken => "That username is already taken.",
            AuthErrorCode::InvalidEmail => "Please enter a valid email address.",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AuthErrorCode::UserNotFound | AuthErrorCode::WrongPassword => StatusCode::UNAUTHORIZED,
            AuthErrorCode::EmailAlreadyInUse | AuthErrorCode::UsernameTaken => StatusCode::CONFLICT,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("{}", .0.friendly_message())]
    Auth(AuthErrorCode),

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Auth(code) => code.as_str(),
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(code) => code.status_code(),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Backend failures are logged in full but shown generically.
        let message = match &self {
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, code = %error_code, "Server error occurred");
                "Something went wrong, please try again.".to_string()
            }
            other => {
                tracing::debug!(error = %other, code = %error_code, "Client error occurred");
                other.to_string()
            }
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code: error_code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", err))
    }
}

impl From<bcrypt::BcryptError> for ApiError {
    fn from(err: bcrypt::BcryptError) -> Self {
        ApiError::Internal(format!("Password hashing failed: {}", err))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_codes_map_to_friendly_copy() {
        let err = ApiError::Auth(AuthErrorCode::ExpiredActionCode);
        assert_eq!(err.error_code(), "expired-action-code");
        assert!(err.to_string().contains("expired"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn wrong_password_and_unknown_user_look_the_same() {
        let wrong = ApiError::Auth(AuthErrorCode::WrongPassword);
        let missing = ApiError::Auth(AuthErrorCode::UserNotFound);
        assert_eq!(wrong.to_string(), missing.to_string());
        assert_eq!(wrong.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            ApiError::NotFound("x".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Validation("x".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Auth(AuthErrorCode::UsernameTaken).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Internal("x".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
