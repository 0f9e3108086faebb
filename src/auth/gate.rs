// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The per-request authentication gate.
//!
//! [`authenticate_request`] is the pipeline stage; the extractors below are
//! thin wrappers choosing its options.
//!
//! | Extractor | Token | Graph loaded | Permission check |
//! |-----------|-------|--------------|------------------|
//! | [`OpenAuth`] | optional, failures ignored | no | no |
//! | [`Auth`] | required | no | no |
//! | [`Authorized<P>`] | required | yes | `P::PERMS`, any-of |
//!
//! # Example
//!
//! ```rust,ignore
//! struct DeleteDocs;
//! impl RequiredPermissions for DeleteDocs {
//!     const PERMS: &'static [&'static str] = &["doc.delete"];
//! }
//!
//! async fn delete_doc(Authorized(session, ..): Authorized<DeleteDocs>) -> impl IntoResponse {
//!     // only reached when the caller holds doc.delete (or is an admin)
//! }
//! ```

use std::marker::PhantomData;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use serde::Serialize;
use utoipa::ToSchema;

use super::permissions::PermissionSet;
use super::scope::RequestScope;
use super::token::{Claims, TokenError, TokenKind};
use super::{run_blocking, AuthError};
use crate::models::{EntityId, User};
use crate::state::AppState;
use crate::storage::UserGraph;

// =============================================================================
// Identity
// =============================================================================

/// Who is making the request, as exposed to handlers and logs.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct Identity {
    pub user_id: EntityId,
    pub name: String,
    pub phone: String,
    /// Role names, empty unless the role graph was loaded.
    pub roles: Vec<String>,
}

/// A successfully authenticated request.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: User,
    pub identity: Identity,
    pub claims: Claims,
    /// Present when the gate loaded roles and menus.
    pub graph: Option<UserGraph>,
    /// Present when the gate resolved permissions.
    pub permissions: Option<PermissionSet>,
    /// The access token is close to expiry.
    pub needs_refresh: bool,
}

/// How much work the gate does beyond verifying the token.
#[derive(Debug, Clone, Copy, Default)]
pub struct GateOptions {
    pub load_graph: bool,
    /// Any one of these is enough. Empty means no check.
    pub required: &'static [&'static str],
}

// =============================================================================
// Pipeline
// =============================================================================

/// The bearer token, if the `Authorization` header carries one.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Authenticate a request and enforce `options.required`.
pub async fn authenticate_request(
    state: &AppState,
    parts: &Parts,
    options: GateOptions,
) -> Result<AuthSession, AuthError> {
    let token = bearer_token(&parts.headers).ok_or(AuthError::Unauthenticated)?;

    let claims = state
        .tokens
        .decode_kind(token, TokenKind::Access)
        .map_err(|err| match err {
            TokenError::Expired => AuthError::SessionExpired,
            _ => AuthError::Unauthenticated,
        })?;
    let user_id = claims.user_id().map_err(|_| AuthError::Unauthenticated)?;

    let needs_refresh = state.tokens.needs_refresh(&claims);

    let load_graph = options.load_graph || !options.required.is_empty();
    let db = state.db.clone();
    let (user, graph) = run_blocking(move || {
        if load_graph {
            Ok(db.load_user_graph(user_id)?.map(|g| (g.user.clone(), Some(g))))
        } else {
            Ok(db.get_user(user_id)?.map(|u| (u, None)))
        }
    })
    .await?
    .ok_or(AuthError::Unauthenticated)?;

    if !user.is_active {
        return Err(AuthError::Unauthenticated);
    }

    let permissions = graph.as_ref().map(|g| state.resolver.permissions(g));
    if !options.required.is_empty() {
        let granted = permissions.as_ref().is_some_and(|p| p.satisfies(options.required));
        if !granted {
            tracing::warn!(
                user_id,
                required = ?options.required,
                "Permission denied"
            );
            return Err(AuthError::Forbidden);
        }
    }

    let identity = Identity {
        user_id: user.id,
        name: user.name.clone(),
        phone: user.phone.clone(),
        roles: graph.as_ref().map(UserGraph::role_names).unwrap_or_default(),
    };
    if let Some(scope) = parts.extensions.get::<RequestScope>() {
        if needs_refresh {
            scope.flag_refresh();
        }
        scope.set_identity(identity.clone());
    }

    Ok(AuthSession {
        user,
        identity,
        claims,
        graph,
        permissions,
        needs_refresh,
    })
}

// =============================================================================
// Extractors
// =============================================================================

/// Requires a valid access token for an active user.
pub struct Auth(pub AuthSession);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        authenticate_request(state, parts, GateOptions::default())
            .await
            .map(Auth)
    }
}

/// A set of permissions a route declares.
pub trait RequiredPermissions: Send + Sync + 'static {
    const PERMS: &'static [&'static str];
}

/// Any authenticated user; loads roles and menus.
pub struct SignedIn;

impl RequiredPermissions for SignedIn {
    const PERMS: &'static [&'static str] = &[];
}

/// Requires one of `P::PERMS` (admins always pass). Loads the role graph.
pub struct Authorized<P: RequiredPermissions = SignedIn>(pub AuthSession, pub PhantomData<P>);

impl<P: RequiredPermissions> Authorized<P> {
    pub fn session(&self) -> &AuthSession {
        &self.0
    }
}

impl<P: RequiredPermissions> FromRequestParts<AppState> for Authorized<P> {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let options = GateOptions {
            load_graph: true,
            required: P::PERMS,
        };
        let session = authenticate_request(state, parts, options).await?;
        Ok(Authorized(session, PhantomData))
    }
}

/// Identity if one can be established; never rejects.
///
/// Anonymous when auth is globally disabled, no token is sent, or the token
/// fails validation for any reason.
pub struct OpenAuth(pub Option<AuthSession>);

impl FromRequestParts<AppState> for OpenAuth {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if !state.config.auth.oauth_enabled || bearer_token(&parts.headers).is_none() {
            return Ok(OpenAuth(None));
        }
        match authenticate_request(state, parts, GateOptions::default()).await {
            Ok(session) => Ok(OpenAuth(Some(session))),
            Err(err) => {
                tracing::debug!(error_code = err.error_code(), "Open route treated as anonymous");
                Ok(OpenAuth(None))
            }
        }
    }
}
