// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use super::extract::{ApiJson, ClientIp};
use crate::{
    audit::LoginAttempt,
    auth::{authenticate, is_valid_phone, run_blocking, AuthError, OpenAuth, TokenError, TokenKind},
    error::{ApiError, ErrorBody},
    models::{LoginMethod, LoginRequest, RefreshRequest, TokenPair},
    state::AppState,
};

/// Authenticate with phone and password.
///
/// Every attempt, successful or not, is written to the login audit log.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    tag = "Auth",
    responses(
        (status = 200, description = "Token pair issued", body = TokenPair),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "Login rejected", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let attempt = LoginAttempt::new(&body, &headers, ip.clone());
    let outcome = perform_login(&state, body, ip).await;

    let summary = match &outcome {
        Ok((user_id, _)) => json!({ "code": 200, "message": "Login succeeded", "user_id": user_id }),
        Err(err) => json!({ "code": err.code(), "message": err.public_message() }),
    };
    state.auditor.dispatch(attempt.clone(), outcome.is_ok(), summary).await;

    match outcome {
        Ok((user_id, pair)) => {
            tracing::info!(user_id, phone = %attempt.phone, platform = attempt.platform.as_str(), "Login succeeded");
            Ok(Json(pair))
        }
        Err(err) => {
            tracing::info!(phone = %attempt.phone, error_code = err.error_code(), "Login rejected");
            Err(err.into())
        }
    }
}

async fn perform_login(
    state: &AppState,
    body: LoginRequest,
    ip: Option<String>,
) -> Result<(u64, TokenPair), AuthError> {
    if body.method != LoginMethod::Password {
        return Err(AuthError::invalid_field("method", "SMS login is not enabled"));
    }
    if !is_valid_phone(&body.phone) {
        return Err(AuthError::invalid_field("phone", "Invalid phone number"));
    }
    if body.password.is_empty() {
        return Err(AuthError::invalid_field("password", "Password must not be empty"));
    }

    let db = state.db.clone();
    let hasher = state.hasher.clone();
    let now = state.clock.now();
    let require_staff = body.platform.requires_staff();
    let user = run_blocking(move || {
        let user = authenticate(&db, hasher.as_ref(), &body.phone, &body.password, require_staff)?;
        db.update_login_info(user.id, ip.as_deref(), now)?;
        Ok(user)
    })
    .await?;

    let pair = state.tokens.issue_pair(user.id)?;
    Ok((user.id, pair))
}

/// Exchange a refresh token for a new token pair.
#[utoipa::path(
    post,
    path = "/token/refresh",
    request_body = RefreshRequest,
    tag = "Auth",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Expired or wrong kind of token", body = ErrorBody),
        (status = 403, description = "Invalid token", body = ErrorBody)
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RefreshRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let claims = state
        .tokens
        .decode_kind(&body.refresh_token, TokenKind::Refresh)
        .map_err(refresh_error)?;
    let user_id = claims.user_id().map_err(refresh_error)?;

    // Disabled or deleted accounts can't keep extending their session
    let db = state.db.clone();
    let user = run_blocking(move || Ok(db.get_user(user_id)?)).await?;
    if !user.is_some_and(|u| u.is_active) {
        return Err(AuthError::Unauthenticated.into());
    }

    let pair = state.tokens.issue_pair(user_id).map_err(AuthError::from)?;
    tracing::debug!(user_id, "Token pair refreshed");
    Ok(Json(pair))
}

fn refresh_error(err: TokenError) -> AuthError {
    match err {
        TokenError::Malformed(_) => AuthError::Unauthenticated,
        other => AuthError::from(other),
    }
}

/// Whether the caller is signed in.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionStatus {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Report the current session without requiring one.
#[utoipa::path(
    get,
    path = "/auth/session",
    tag = "Auth",
    responses((status = 200, body = SessionStatus))
)]
pub async fn session_status(OpenAuth(session): OpenAuth) -> Json<SessionStatus> {
    Json(match session {
        Some(session) => SessionStatus {
            authenticated: true,
            user_id: Some(session.identity.user_id),
            name: Some(session.identity.name),
        },
        None => SessionStatus {
            authenticated: false,
            user_id: None,
            name: None,
        },
    })
}
