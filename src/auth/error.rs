// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::{ApiError, FieldError};
use crate::storage::DbError;

use super::password::PasswordError;
use super::token::TokenError;

/// Failure of a login, token or permission check.
///
/// Every variant maps to a stable numeric code so clients can branch on it
/// without parsing messages.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Input failed shape validation.
    #[error("Invalid request")]
    Validation(Vec<FieldError>),
    /// Token is well-formed but past its expiry; the client should refresh.
    #[error("Session has expired, please refresh your token")]
    SessionExpired,
    /// No account for the given phone number.
    #[error("Account does not exist")]
    NotFound,
    #[error("Incorrect phone number or password")]
    InvalidCredential,
    #[error("Account has been disabled")]
    AccountDisabled,
    #[error("Account is not allowed to sign in to the admin console")]
    NotStaff,
    /// Access token presented where a refresh token is required, or the reverse.
    #[error("Token is not valid for this operation")]
    WrongTokenKind,
    /// Missing, malformed or unusable credentials.
    #[error("Authentication required, please log in")]
    Unauthenticated,
    #[error("You do not have permission to perform this operation")]
    Forbidden,
    #[error("Internal authentication error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Shorthand for a single-field validation error.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        AuthError::Validation(vec![FieldError::new(field, message)])
    }

    /// Stable numeric code.
    pub fn code(&self) -> u16 {
        match self {
            AuthError::Validation(_) => 4000,
            AuthError::SessionExpired => 4010,
            AuthError::NotFound => 4011,
            AuthError::InvalidCredential => 4012,
            AuthError::AccountDisabled => 4013,
            AuthError::NotStaff => 4014,
            AuthError::WrongTokenKind => 4015,
            AuthError::Unauthenticated => 4030,
            AuthError::Forbidden => 4031,
            AuthError::Internal(_) => 5000,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "validation_error",
            AuthError::SessionExpired => "session_expired",
            AuthError::NotFound => "account_not_found",
            AuthError::InvalidCredential => "invalid_credential",
            AuthError::AccountDisabled => "account_disabled",
            AuthError::NotStaff => "not_staff",
            AuthError::WrongTokenKind => "wrong_token_kind",
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::Forbidden => "forbidden",
            AuthError::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::SessionExpired
            | AuthError::NotFound
            | AuthError::InvalidCredential
            | AuthError::AccountDisabled
            | AuthError::NotStaff
            | AuthError::WrongTokenKind => StatusCode::UNAUTHORIZED,
            AuthError::Unauthenticated | AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to clients. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<DbError> for AuthError {
    fn from(err: DbError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthError::SessionExpired,
            TokenError::WrongKind => AuthError::WrongTokenKind,
            TokenError::Malformed(_) => AuthError::Unauthenticated,
            TokenError::Encode(msg) => AuthError::Internal(msg),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
